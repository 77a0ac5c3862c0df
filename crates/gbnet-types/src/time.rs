//! Calendar arithmetic on Unix timestamps.
//!
//! Retention and lock periods are expressed in calendar months, so they are
//! added with chrono rather than as a fixed number of seconds. A date that
//! does not exist in the target month clamps to the last day of that month
//! (Jan 31 + 1 month = Feb 28/29).

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};

use crate::Timestamp;

/// Seconds in one day.
pub const DAY_SECS: u64 = 24 * 60 * 60;

/// Add `months` calendar months to a timestamp.
///
/// Returns `None` if the timestamp or the result is out of chrono's range.
pub fn add_months(ts: Timestamp, months: u32) -> Option<Timestamp> {
    let start = DateTime::<Utc>::from_timestamp(i64::try_from(ts).ok()?, 0)?;
    let end = start.checked_add_months(Months::new(months))?;
    u64::try_from(end.timestamp()).ok()
}

/// Current wall-clock time in Unix seconds.
pub fn now() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Salary period key (`YYYY-MM`) for the month containing `ts`.
pub fn period_key(ts: Timestamp) -> String {
    let dt = i64::try_from(ts)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_default();
    format!("{:04}-{:02}", dt.year(), dt.month())
}

/// Start of the calendar month containing `ts` and start of the next one.
pub fn month_range(ts: Timestamp) -> Option<(Timestamp, Timestamp)> {
    let dt = DateTime::<Utc>::from_timestamp(i64::try_from(ts).ok()?, 0)?;
    let first = NaiveDate::from_ymd_opt(dt.year(), dt.month(), 1)?
        .and_hms_opt(0, 0, 0)?
        .and_utc();
    let start = u64::try_from(first.timestamp()).ok()?;
    Some((start, add_months(start, 1)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2024-01-15T00:00:00Z
    const JAN_15_2024: u64 = 1_705_276_800;

    #[test]
    fn test_add_months_simple() {
        let later = add_months(JAN_15_2024, 6).expect("in range");
        // 2024-07-15T00:00:00Z
        assert_eq!(later, 1_721_001_600);
    }

    #[test]
    fn test_add_fifteen_months() {
        let later = add_months(JAN_15_2024, 15).expect("in range");
        // 2025-04-15T00:00:00Z
        assert_eq!(later, 1_744_675_200);
    }

    #[test]
    fn test_add_months_clamps_to_month_end() {
        // 2024-01-31T00:00:00Z + 1 month = 2024-02-29T00:00:00Z
        let later = add_months(1_706_659_200, 1).expect("in range");
        assert_eq!(later, 1_709_164_800);
    }

    #[test]
    fn test_period_key() {
        assert_eq!(period_key(JAN_15_2024), "2024-01");
        assert_eq!(period_key(1_744_675_200), "2025-04");
    }

    #[test]
    fn test_month_range() {
        let (start, end) = month_range(JAN_15_2024).expect("in range");
        // 2024-01-01T00:00:00Z .. 2024-02-01T00:00:00Z
        assert_eq!(start, 1_704_067_200);
        assert_eq!(end, 1_706_745_600);
        assert_eq!(month_range(start).expect("in range").0, start);
    }

    #[test]
    fn test_now_is_recent() {
        assert!(now() > JAN_15_2024);
    }
}
