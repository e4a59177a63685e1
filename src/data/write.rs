use chrono::NaiveDateTime;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::data::format_timestamp;
use crate::error::StorageError;
use crate::model::{TagInfo, TagKind};

pub fn insert_reading(
    conn: &r2d2::PooledConnection<SqliteConnectionManager>,
    tag_name: &str,
    value: f64,
    kind: TagKind,
    timestamp: NaiveDateTime,
) -> Result<i64, StorageError> {
    let query = "INSERT INTO plc_readings (tag_name, value, timestamp, kind) VALUES (?, ?, ?, ?)";

    conn.execute(
        query,
        params![tag_name, value, format_timestamp(timestamp), kind.as_str()],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Inserts every record or refreshes the existing one, keeping its `created_at`.
pub fn upsert_metadata(
    conn: &mut r2d2::PooledConnection<SqliteConnectionManager>,
    records: &[TagInfo],
    now: NaiveDateTime,
) -> Result<(), StorageError> {
    let now = format_timestamp(now);
    let tx = conn.transaction()?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO tag_metadata (
                tag_name, description, units, min_value, max_value, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(tag_name) DO UPDATE SET
                description = excluded.description,
                units = excluded.units,
                min_value = excluded.min_value,
                max_value = excluded.max_value,
                updated_at = excluded.updated_at",
        )?;

        for record in records {
            stmt.execute(params![
                record.tag_name,
                record.description,
                record.units,
                record.min_value,
                record.max_value,
                now
            ])?;
        }
    }

    tx.commit()?;
    Ok(())
}
