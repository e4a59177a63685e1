use chrono::NaiveDateTime;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};

use crate::data::{format_timestamp, parse_timestamp, ReadingSummary};
use crate::error::StorageError;
use crate::model::{HistoricalPoint, TagInfo, TagKind, TagMetadata, TagReading};

pub fn get_readings_between(
    conn: &r2d2::PooledConnection<SqliteConnectionManager>,
    tag_name: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Vec<HistoricalPoint>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, value
         FROM plc_readings
         WHERE tag_name = ?
           AND timestamp BETWEEN ? AND ?
         ORDER BY timestamp, id",
    )?;

    let mut rows = stmt.query(params![
        tag_name,
        format_timestamp(start),
        format_timestamp(end)
    ])?;

    let mut result = vec![];

    while let Some(row) = rows.next()? {
        let timestamp: String = row.get(0)?;
        let value: f64 = row.get(1)?;

        result.push(HistoricalPoint {
            timestamp: parse_timestamp(&timestamp)?,
            value,
        });
    }

    Ok(result)
}

pub fn get_latest_reading(
    conn: &r2d2::PooledConnection<SqliteConnectionManager>,
    tag_name: &str,
) -> Result<Option<TagReading>, StorageError> {
    let raw = conn
        .query_row(
            "SELECT id, tag_name, value, timestamp, kind
             FROM plc_readings
             WHERE tag_name = ?
             ORDER BY timestamp DESC, id DESC
             LIMIT 1;",
            [tag_name],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((id, tag_name, value, timestamp, kind)) = raw else {
        return Ok(None);
    };

    let kind = TagKind::from_db(&kind).ok_or(StorageError::Kind(kind))?;

    Ok(Some(TagReading {
        id,
        tag_name,
        value,
        timestamp: parse_timestamp(&timestamp)?,
        kind,
    }))
}

pub fn get_reading_summary(
    conn: &r2d2::PooledConnection<SqliteConnectionManager>,
    tag_name: Option<&str>,
) -> Result<ReadingSummary, StorageError> {
    let (count, first, last): (i64, Option<String>, Option<String>) = conn.query_row(
        "SELECT COUNT(*), MIN(timestamp), MAX(timestamp)
         FROM plc_readings
         WHERE ?1 IS NULL OR tag_name = ?1",
        params![tag_name],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    Ok(ReadingSummary {
        count: count.max(0) as u64,
        first: first.as_deref().map(parse_timestamp).transpose()?,
        last: last.as_deref().map(parse_timestamp).transpose()?,
    })
}

type RawMetadata = (
    String,
    String,
    Option<String>,
    Option<f64>,
    Option<f64>,
    String,
    String,
);

fn raw_metadata(row: &Row<'_>) -> rusqlite::Result<RawMetadata> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn build_metadata(raw: RawMetadata) -> Result<TagMetadata, StorageError> {
    let (tag_name, description, units, min_value, max_value, created_at, updated_at) = raw;

    Ok(TagMetadata {
        info: TagInfo {
            tag_name,
            description,
            units,
            min_value,
            max_value,
        },
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

pub fn get_metadata(
    conn: &r2d2::PooledConnection<SqliteConnectionManager>,
    tag_name: &str,
) -> Result<Option<TagMetadata>, StorageError> {
    let raw = conn
        .query_row(
            "SELECT tag_name, description, units, min_value, max_value, created_at, updated_at
             FROM tag_metadata
             WHERE tag_name = ?",
            [tag_name],
            raw_metadata,
        )
        .optional()?;

    raw.map(build_metadata).transpose()
}

pub fn get_all_metadata(
    conn: &r2d2::PooledConnection<SqliteConnectionManager>,
) -> Result<Vec<TagMetadata>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT tag_name, description, units, min_value, max_value, created_at, updated_at
         FROM tag_metadata
         ORDER BY tag_name",
    )?;

    let rows = stmt.query_map([], raw_metadata)?;

    let mut result = vec![];
    for raw in rows {
        result.push(build_metadata(raw?)?);
    }

    Ok(result)
}
