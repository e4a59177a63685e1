use chrono::NaiveDateTime;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::StorageError;
use crate::model::{HistoricalPoint, TagInfo, TagKind, TagMetadata, TagReading};

pub mod read;
mod tables;
pub mod write;

/// Fixed width so that text order matches time order inside sqlite.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, StorageError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|_| StorageError::Timestamp(raw.to_string()))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReadingSummary {
    pub count: u64,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
}

/// Handle to the reading store. Every operation checks out its own pooled
/// connection, so clones can be handed to the poller and the API freely.
#[derive(Clone)]
pub struct Storage {
    path: std::path::PathBuf,
    db: Arc<Pool<SqliteConnectionManager>>,
}

impl Storage {
    #[instrument]
    pub fn open(path: std::path::PathBuf) -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::file(&path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
        });

        let db = Arc::new(Pool::new(manager)?);
        debug!("Opened db pool");

        Ok(Storage { path, db })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Creates tables and indexes when missing, safe to run on every start.
    pub fn init(&self) -> Result<(), StorageError> {
        let conn = self.db.get()?;

        conn.execute(tables::READINGS_TABLE, [])?;
        debug!("Built readings table");

        conn.execute(tables::METADATA_TABLE, [])?;
        debug!("Built metadata table");

        conn.execute(tables::TAG_NAME_INDEX, [])?;
        conn.execute(tables::TIMESTAMP_INDEX, [])?;
        debug!("Built reading indexes");

        Ok(())
    }

    pub fn save_reading(
        &self,
        tag_name: &str,
        value: f64,
        kind: TagKind,
        timestamp: NaiveDateTime,
    ) -> Result<i64, StorageError> {
        let conn = self.db.get()?;
        write::insert_reading(&conn, tag_name, value, kind, timestamp)
    }

    pub fn get_historical_data(
        &self,
        tag_name: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<HistoricalPoint>, StorageError> {
        let conn = self.db.get()?;
        read::get_readings_between(&conn, tag_name, start, end)
    }

    pub fn get_latest_reading(&self, tag_name: &str) -> Result<Option<TagReading>, StorageError> {
        let conn = self.db.get()?;
        read::get_latest_reading(&conn, tag_name)
    }

    /// Row count and time span, for one tag or for the whole table.
    pub fn reading_summary(&self, tag_name: Option<&str>) -> Result<ReadingSummary, StorageError> {
        let conn = self.db.get()?;
        read::get_reading_summary(&conn, tag_name)
    }

    pub fn upsert_tag_metadata(&self, records: &[TagInfo]) -> Result<(), StorageError> {
        let mut conn = self.db.get()?;
        write::upsert_metadata(&mut conn, records, chrono::Local::now().naive_local())?;
        debug!("Upserted {} metadata records", records.len());
        Ok(())
    }

    pub fn get_tag_metadata(&self, tag_name: &str) -> Result<Option<TagMetadata>, StorageError> {
        let conn = self.db.get()?;
        read::get_metadata(&conn, tag_name)
    }

    pub fn get_all_tag_metadata(&self) -> Result<Vec<TagMetadata>, StorageError> {
        let conn = self.db.get()?;
        read::get_all_metadata(&conn)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.path).finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};

    pub(crate) fn temp_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("readings.db3")).unwrap();
        storage.init().unwrap();
        (dir, storage)
    }

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 14)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn info(name: &str, description: &str) -> TagInfo {
        TagInfo {
            tag_name: name.to_string(),
            description: description.to_string(),
            units: Some("bar".to_string()),
            min_value: Some(0.0),
            max_value: None,
        }
    }

    #[test]
    fn init_is_idempotent() {
        let (_dir, storage) = temp_storage();
        storage.save_reading("A", 1.0, TagKind::Analog, t0()).unwrap();

        storage.init().unwrap();

        assert_eq!(storage.reading_summary(None).unwrap().count, 1);
    }

    #[test]
    fn range_is_inclusive_and_ascending() {
        let (_dir, storage) = temp_storage();
        let hour = TimeDelta::hours(1);

        storage.save_reading("A", 3.0, TagKind::Analog, t0() + hour).unwrap();
        storage.save_reading("A", 1.0, TagKind::Analog, t0() - hour).unwrap();
        storage.save_reading("A", 2.0, TagKind::Analog, t0()).unwrap();
        storage.save_reading("B", 9.0, TagKind::Analog, t0()).unwrap();

        let points = storage.get_historical_data("A", t0() - hour, t0() + hour).unwrap();
        let values: Vec<f64> = points.iter().map(|point| point.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(points[0].timestamp, t0() - hour);

        let single = storage.get_historical_data("A", t0(), t0()).unwrap();
        assert_eq!(single, vec![HistoricalPoint { timestamp: t0(), value: 2.0 }]);

        let empty = storage
            .get_historical_data("A", t0() + TimeDelta::hours(5), t0() + TimeDelta::hours(6))
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn sub_second_timestamps_keep_their_order() {
        let (_dir, storage) = temp_storage();
        let later = t0() + TimeDelta::milliseconds(500);

        storage.save_reading("A", 2.0, TagKind::Analog, later).unwrap();
        storage.save_reading("A", 1.0, TagKind::Analog, t0()).unwrap();

        let points = storage.get_historical_data("A", t0(), later).unwrap();
        assert_eq!(points[0].value, 1.0);
        assert_eq!(points[1].timestamp, later);

        let clipped = storage.get_historical_data("A", t0(), t0() + TimeDelta::milliseconds(499)).unwrap();
        assert_eq!(clipped.len(), 1);
    }

    #[test]
    fn latest_reading_and_summary() {
        let (_dir, storage) = temp_storage();
        assert_eq!(storage.get_latest_reading("P101.RUN").unwrap(), None);

        storage.save_reading("P101.RUN", 0.0, TagKind::Boolean, t0()).unwrap();
        storage
            .save_reading("P101.RUN", 1.0, TagKind::Boolean, t0() + TimeDelta::seconds(3))
            .unwrap();

        let latest = storage.get_latest_reading("P101.RUN").unwrap().unwrap();
        assert_eq!(latest.value, 1.0);
        assert_eq!(latest.kind, TagKind::Boolean);

        let summary = storage.reading_summary(Some("P101.RUN")).unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.first, Some(t0()));
        assert_eq!(summary.last, Some(t0() + TimeDelta::seconds(3)));

        let none = storage.reading_summary(Some("other")).unwrap();
        assert_eq!(none, ReadingSummary { count: 0, first: None, last: None });
    }

    #[test]
    fn upsert_keeps_created_at() {
        let (_dir, storage) = temp_storage();
        let seeds = vec![info("A", "Pressure"), info("B", "Flow")];

        storage.upsert_tag_metadata(&seeds).unwrap();
        let first = storage.get_tag_metadata("A").unwrap().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        let mut changed = seeds.clone();
        changed[0].description = "Pressure setpoint".to_string();
        storage.upsert_tag_metadata(&changed).unwrap();
        storage.upsert_tag_metadata(&changed).unwrap();

        let all = storage.get_all_tag_metadata().unwrap();
        assert_eq!(all.len(), 2);

        let second = storage.get_tag_metadata("A").unwrap().unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.info.description, "Pressure setpoint");
        assert_eq!(second.info.units.as_deref(), Some("bar"));
    }

    #[test]
    fn missing_metadata_is_not_an_error() {
        let (_dir, storage) = temp_storage();

        assert_eq!(storage.get_tag_metadata("nope").unwrap(), None);
        assert!(storage.get_all_tag_metadata().unwrap().is_empty());
    }
}
