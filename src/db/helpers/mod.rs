use std::convert::TryFrom;

use chrono::NaiveDateTime;

use crate::db::error::{StorageError, StorageResult};

/// Timestamp layout of the `last_updated` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn to_i64(value: u64, field: &'static str) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| StorageError::OutOfRange {
        field,
        value: value.to_string(),
    })
}

pub fn to_u64(value: i64, field: &'static str) -> StorageResult<u64> {
    u64::try_from(value).map_err(|_| StorageError::OutOfRange {
        field,
        value: value.to_string(),
    })
}

pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str, field: &'static str) -> StorageResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|_| {
        StorageError::InvalidTimestamp {
            field,
            value: value.to_string(),
        }
    })
}
