//! External invoice id generation.
//!
//! Format: `{prefix}-{YYYYMMDD}-{suffix}-{sequence:04}` where the date is the
//! WIB calendar day, the suffix is random and the sequence counts purchases
//! created earlier the same day, starting at 1. For example
//! `TIX-20250601-K7QM2D-0042`.

use crate::environment::{wib, wib_date};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

/// Build an external id.
#[must_use]
pub fn external_id(prefix: &str, now: DateTime<Utc>, suffix: &str, sequence: u64) -> String {
    format!(
        "{prefix}-{}-{suffix}-{sequence:04}",
        wib_date(now).format("%Y%m%d")
    )
}

/// The UTC instants bounding the WIB day that contains `now`, as `[start, end)`.
///
/// Used to count purchases created "today" for the sequence number.
#[must_use]
pub fn wib_day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = wib_date(now);
    let start = start_of_wib_day(day).unwrap_or(now);
    let end = day
        .succ_opt()
        .and_then(start_of_wib_day)
        .unwrap_or(now);
    (start, end)
}

fn start_of_wib_day(day: NaiveDate) -> Option<DateTime<Utc>> {
    wib()
        .from_local_datetime(&day.and_time(NaiveTime::MIN))
        .single()
        .map(|local| local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
            .single()
            .unwrap_or_default()
    }

    #[test]
    fn uses_wib_date_and_pads_the_sequence() {
        // 18:30 UTC on 31 May is already 1 June in Jakarta
        let id = external_id("TIX", at(2025, 5, 31, 18, 30), "K7QM2D", 42);
        assert_eq!(id, "TIX-20250601-K7QM2D-0042");
    }

    #[test]
    fn day_bounds_span_24_hours_from_wib_midnight() {
        let (start, end) = wib_day_bounds(at(2025, 6, 1, 3, 0));
        assert_eq!(start, at(2025, 5, 31, 17, 0));
        assert_eq!(end, at(2025, 6, 1, 17, 0));
    }
}
