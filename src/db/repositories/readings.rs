use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::db::{
    helpers::{placeholders, row_to_reading, to_i64, to_u64, READING_COLUMNS},
    models::{NewReading, Reading},
    Database,
};

/// Driver-to-store bridge. `insert` must return without waiting on disk I/O and may be
/// called from any thread; the store serializes the writes itself.
pub trait ReadingSink: Send + Sync {
    fn insert(&self, reading: NewReading) -> Result<()>;
}

fn insert_row(conn: &Connection, reading: &NewReading) -> Result<i64> {
    conn.execute(
        "INSERT INTO readings (
            local_id,
            timestamp,
            sensor_name,
            data,
            has_file,
            file_path,
            file_mime,
            synced
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
        params![
            reading.local_id,
            reading.timestamp,
            reading.sensor_name,
            reading.payload,
            reading.has_file(),
            reading.file_path,
            reading.file_mime,
        ],
    )
    .with_context(|| format!("failed to insert reading from {}", reading.sensor_name))?;
    Ok(conn.last_insert_rowid())
}

fn count(conn: &Connection, sql: &str, cutoff_ms: Option<i64>) -> Result<u64> {
    let total: i64 = match cutoff_ms {
        Some(cutoff) => conn.query_row(sql, params![cutoff], |row| row.get(0))?,
        None => conn.query_row(sql, [], |row| row.get(0))?,
    };
    to_u64(total, "count")
}

impl ReadingSink for Database {
    fn insert(&self, reading: NewReading) -> Result<()> {
        self.enqueue("reading insert", move |conn| {
            insert_row(conn, &reading).map(|_| ())
        })
    }
}

impl Database {
    /// Inserts `reading` and returns its row id once the write is committed.
    pub async fn insert_reading(&self, reading: NewReading) -> Result<i64> {
        self.execute(move |conn| insert_row(conn, &reading)).await
    }

    /// Oldest unsynced readings with `timestamp <= cutoff_ms`, at most `limit` of them,
    /// in timestamp order.
    pub async fn next_unsynced_before(&self, cutoff_ms: i64, limit: usize) -> Result<Vec<Reading>> {
        let limit = to_i64(limit as u64)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS}
                 FROM readings
                 WHERE synced = 0 AND timestamp <= ?1
                 ORDER BY timestamp ASC, id ASC
                 LIMIT ?2"
            ))?;

            let rows = stmt.query_map(params![cutoff_ms, limit], row_to_reading)?;
            let mut readings = Vec::new();
            for row in rows {
                readings.push(row?);
            }
            Ok(readings)
        })
        .await
    }

    pub async fn unsynced_count_before(&self, cutoff_ms: i64) -> Result<u64> {
        self.execute(move |conn| {
            count(
                conn,
                "SELECT COUNT(*) FROM readings WHERE synced = 0 AND timestamp <= ?1",
                Some(cutoff_ms),
            )
        })
        .await
    }

    pub async fn unsynced_count(&self) -> Result<u64> {
        self.execute(|conn| count(conn, "SELECT COUNT(*) FROM readings WHERE synced = 0", None))
            .await
    }

    /// Marks the given rows as accepted by the backend. Already-synced rows are left
    /// alone, so repeating the call is harmless. Returns the number of rows changed.
    pub async fn mark_synced(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let ids = ids.to_vec();
        self.execute(move |conn| {
            let sql = format!(
                "UPDATE readings SET synced = 1 WHERE synced = 0 AND id IN ({})",
                placeholders(ids.len())
            );
            let changed = conn
                .execute(&sql, params_from_iter(ids.iter()))
                .context("failed to mark readings synced")?;
            Ok(changed)
        })
        .await
    }

    /// Most recent reading by timestamp; ties resolve to the latest insert.
    pub async fn last_reading(&self) -> Result<Option<Reading>> {
        self.execute(|conn| {
            let reading = conn
                .query_row(
                    &format!(
                        "SELECT {READING_COLUMNS} FROM readings
                         ORDER BY timestamp DESC, id DESC
                         LIMIT 1"
                    ),
                    [],
                    row_to_reading,
                )
                .optional()?;
            Ok(reading)
        })
        .await
    }

    pub async fn get_reading_by_local_id(&self, local_id: &str) -> Result<Option<Reading>> {
        let local_id = local_id.to_string();
        self.execute(move |conn| {
            let reading = conn
                .query_row(
                    &format!("SELECT {READING_COLUMNS} FROM readings WHERE local_id = ?1"),
                    params![local_id],
                    row_to_reading,
                )
                .optional()?;
            Ok(reading)
        })
        .await
    }

    pub async fn all_readings(&self) -> Result<Vec<Reading>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS} FROM readings ORDER BY id ASC"
            ))?;
            let rows = stmt.query_map([], row_to_reading)?;
            let mut readings = Vec::new();
            for row in rows {
                readings.push(row?);
            }
            Ok(readings)
        })
        .await
    }

    pub async fn delete_all_readings(&self) -> Result<usize> {
        self.execute(|conn| {
            let deleted = conn
                .execute("DELETE FROM readings", [])
                .context("failed to delete readings")?;
            Ok(deleted)
        })
        .await
    }
}
