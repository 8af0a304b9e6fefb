use crate::error::{Result, SessionError};
use chrono::{DateTime, SecondsFormat, Utc};

pub fn to_db_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn from_db_time(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| SessionError::DatabaseError(format!("Invalid timestamp in {column}: {e}")))
}
