//! Timestamp utilities
//!
//! Timestamps are stored as fixed-width RFC 3339 text (nanoseconds, `Z`
//! suffix) in SQLite, so lexical order in `ORDER BY` matches time order.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp for a TEXT column
pub fn to_storage(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a timestamp read back from a TEXT column
pub fn from_storage(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01 00:00:00 UTC
    }

    #[test]
    fn test_storage_roundtrip_preserves_instant() {
        let original = now();
        let parsed = from_storage(&to_storage(&original)).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_storage_format_sorts_chronologically() {
        let earlier = from_storage("2024-05-01T10:00:00Z").unwrap();
        let later = from_storage("2024-05-01T10:00:00.5Z").unwrap();
        assert!(to_storage(&earlier) < to_storage(&later));
        assert_eq!(to_storage(&earlier), "2024-05-01T10:00:00.000000000Z");
    }

    #[test]
    fn test_from_storage_rejects_garbage() {
        let err = from_storage("yesterday").unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
