//! Bootstrap components for application initialization.
//!
//! # Modules
//!
//! - **`resources`**: Infrastructure setup (database, payment gateway, mailer)
//! - **`application`**: Service wiring, outbox worker and HTTP listeners
//!
//! # Example
//!
//! ```rust,ignore
//! // Step 1: Initialize resources (database with migrations, gateway client)
//! let resources = ResourceManager::from_config(&config).await?;
//!
//! // Step 2: Wire services, then serve until SIGTERM
//! Application::new(resources)?.run().await?;
//! ```

pub mod application;
pub mod resources;

pub use application::Application;
pub use resources::ResourceManager;
