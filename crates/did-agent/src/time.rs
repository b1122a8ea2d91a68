//! Timestamps: Unix epoch microseconds in records, RFC 3339 for display.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time in microseconds since the Unix epoch.
pub fn now_micros() -> u64 {
    u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default()
}

/// Render a record timestamp as RFC 3339 with second precision.
pub fn micros_to_rfc3339(micros: u64) -> String {
    i64::try_from(micros)
        .ok()
        .and_then(DateTime::from_timestamp_micros)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_after_2024() {
        assert!(now_micros() > 1_704_067_200_000_000);
    }

    #[test]
    fn test_rfc3339() {
        assert_eq!(micros_to_rfc3339(0), "1970-01-01T00:00:00Z");
        assert_eq!(
            micros_to_rfc3339(1_700_000_000_123_456),
            "2023-11-14T22:13:20Z"
        );
        assert_eq!(micros_to_rfc3339(u64::MAX), "1970-01-01T00:00:00Z");
    }
}
