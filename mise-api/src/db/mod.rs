//! Database access for accounts and recipes
//!
//! Timestamps are stored as fixed-width RFC 3339 text (microseconds, `Z`) so
//! that ordering by the column matches chronological order. Nested documents
//! are stored as JSON text.

pub mod recipes;
pub mod static_recipes;
pub mod users;

use chrono::{DateTime, SecondsFormat, Utc};
use mise_common::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};

pub(crate) fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Bad timestamp '{}': {}", text, e)))
}

pub(crate) fn encode_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Internal(format!("JSON encode failed: {}", e)))
}

pub(crate) fn decode_json<T: DeserializeOwned>(column: &str, text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| Error::Internal(format!("Stored {} is not valid JSON: {}", column, e)))
}

pub(crate) fn decode_uuid(text: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(text)
        .map_err(|e| Error::Internal(format!("Bad stored id '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_text_sorts_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let later = earlier + chrono::Duration::microseconds(1);

        let a = encode_time(&earlier);
        let b = encode_time(&later);
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(decode_time(&b).unwrap(), later);
    }
}
