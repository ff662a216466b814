use std::convert::TryFrom;

use anyhow::{anyhow, Result};
use rusqlite::Row;

use crate::db::models::Reading;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

/// `?, ?, ?` for an `IN (...)` clause with `count` parameters.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub const READING_COLUMNS: &str =
    "id, local_id, timestamp, sensor_name, data, has_file, file_path, file_mime, synced";

pub fn row_to_reading(row: &Row) -> rusqlite::Result<Reading> {
    Ok(Reading {
        id: row.get("id")?,
        local_id: row.get("local_id")?,
        timestamp: row.get("timestamp")?,
        sensor_name: row.get("sensor_name")?,
        payload: row.get("data")?,
        has_file: row.get("has_file")?,
        file_path: row.get("file_path")?,
        file_mime: row.get("file_mime")?,
        synced: row.get("synced")?,
    })
}
