//! Raw landing layer: one append-only parquet table of intraday samples.
//!
//! Layout: `{dir}/raw_data.parquet`, OHLCV stored as the strings received.
//! Appends are serialized by `{dir}/raw_data.lock`; duplicates on
//! `(timestamp, currency)` keep the most recently appended row.

use chrono::{NaiveDateTime, Utc};
use polars::prelude::*;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::parquet_io::{
    datetime_column, map_polars, read_datetimes, read_opt_strings, read_parquet, require_columns,
    write_parquet_atomic,
};
use super::provider::DataError;
use crate::domain::{FieldValue, ObservationRecord, OhlcvField};

pub const RAW_TABLE: &str = "raw_data";

const COLUMNS: [&str; 7] = ["timestamp", "currency", "open", "high", "low", "close", "volume"];

/// Outcome of one append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReport {
    pub received: usize,
    pub duplicates_replaced: usize,
    pub total_rows: usize,
}

/// Locks older than this are left over from a killed writer.
pub const DEFAULT_STALE_LOCK_AGE: Duration = Duration::from_secs(60 * 60);

/// Exclusive writer lock, released on drop.
///
/// The file records the owner's pid and creation time. A lock older than the
/// store's stale age is taken over.
#[derive(Debug)]
pub struct RawWriteLock {
    path: PathBuf,
}

impl RawWriteLock {
    fn acquire(path: PathBuf, stale_after: Duration) -> Result<Self, DataError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| lock_failure(format!("failed to create dir: {e}")))?;
        }
        match Self::create(&path) {
            Err(DataError::StoreLocked { .. }) if lock_age(&path).is_some_and(|age| age > stale_after) => {
                warn!(path = %path.display(), "removing stale raw lock");
                fs::remove_file(&path).map_err(|e| lock_failure(format!("remove stale lock: {e}")))?;
                Self::create(&path)
            }
            other => other,
        }
    }

    fn create(path: &Path) -> Result<Self, DataError> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(DataError::StoreLocked {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(lock_failure(format!("lock file: {e}"))),
        };
        let lock = Self {
            path: path.to_path_buf(),
        };
        writeln!(
            file,
            "pid={}\ncreated={}",
            std::process::id(),
            Utc::now().timestamp()
        )
        .map_err(|e| lock_failure(format!("lock file: {e}")))?;
        Ok(lock)
    }
}

fn lock_failure(reason: String) -> DataError {
    DataError::UploadFailure {
        table: RAW_TABLE.into(),
        reason,
    }
}

/// Age of an existing lock, from its `created=` line or else its mtime.
fn lock_age(path: &Path) -> Option<Duration> {
    let content = fs::read_to_string(path).ok()?;
    let created = content
        .lines()
        .find_map(|line| line.strip_prefix("created="))
        .and_then(|secs| secs.trim().parse::<i64>().ok());

    match created {
        Some(secs) => {
            let age = Utc::now().timestamp().saturating_sub(secs);
            Some(Duration::from_secs(u64::try_from(age).unwrap_or(0)))
        }
        None => fs::metadata(path).ok()?.modified().ok()?.elapsed().ok(),
    }
}

impl Drop for RawWriteLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

pub struct RawStore {
    dir: PathBuf,
    stale_lock_age: Duration,
}

impl RawStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stale_lock_age: DEFAULT_STALE_LOCK_AGE,
        }
    }

    /// Override how old a lock must be before it is treated as abandoned.
    pub fn with_stale_lock_age(mut self, age: Duration) -> Self {
        self.stale_lock_age = age;
        self
    }

    pub fn data_path(&self) -> PathBuf {
        self.dir.join(format!("{RAW_TABLE}.parquet"))
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{RAW_TABLE}.lock"))
    }

    /// Take the writer lock. Fails with `StoreLocked` while another writer
    /// holds a lock younger than the stale age.
    pub fn lock(&self) -> Result<RawWriteLock, DataError> {
        RawWriteLock::acquire(self.lock_path(), self.stale_lock_age)
    }

    /// Append records and deduplicate the whole table.
    pub fn append(&self, records: &[ObservationRecord]) -> Result<AppendReport, DataError> {
        let _lock = self.lock()?;

        let mut combined = if self.data_path().exists() {
            self.load()?
        } else {
            Vec::new()
        };
        combined.extend_from_slice(records);

        let before = combined.len();
        let deduped = dedup_keep_last(combined);
        let total_rows = deduped.len();

        let mut df = records_to_dataframe(&deduped)?;
        write_parquet_atomic(&mut df, &self.data_path(), RAW_TABLE)?;

        let report = AppendReport {
            received: records.len(),
            duplicates_replaced: before - total_rows,
            total_rows,
        };
        debug!(?report, "raw append");
        Ok(report)
    }

    /// Every stored row, in table order.
    pub fn load(&self) -> Result<Vec<ObservationRecord>, DataError> {
        let df = read_parquet(&self.data_path(), RAW_TABLE, "raw")?;
        require_columns(&df, &COLUMNS)?;
        let records = dataframe_to_records(&df)?;
        info!(rows = records.len(), "loaded raw layer");
        Ok(records)
    }

    /// Stored row count, `None` before the first append.
    pub fn row_count(&self) -> Result<Option<usize>, DataError> {
        let path = self.data_path();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(read_parquet(&path, RAW_TABLE, "raw")?.height()))
    }
}

/// Keep the last row per `(timestamp, currency)`.
///
/// A replaced row keeps the position of its first occurrence, so the order in
/// which currencies first appear never changes across appends.
pub fn dedup_keep_last(records: Vec<ObservationRecord>) -> Vec<ObservationRecord> {
    let mut positions: HashMap<(NaiveDateTime, String), usize> = HashMap::new();
    let mut kept: Vec<ObservationRecord> = Vec::with_capacity(records.len());

    for record in records {
        let key = (record.timestamp, record.symbol.clone());
        match positions.get(&key) {
            Some(&i) => kept[i] = record,
            None => {
                positions.insert(key, kept.len());
                kept.push(record);
            }
        }
    }
    kept
}

fn records_to_dataframe(records: &[ObservationRecord]) -> Result<DataFrame, DataError> {
    let text = |field: OhlcvField| -> Vec<Option<String>> {
        records
            .iter()
            .map(|r| r.field(field).map(FieldValue::to_raw_string))
            .collect()
    };
    let currencies: Vec<String> = records.iter().map(|r| r.symbol.clone()).collect();

    let mut columns = vec![
        datetime_column("timestamp", records.iter().map(|r| r.timestamp))?,
        Column::new("currency".into(), currencies),
    ];
    for field in OhlcvField::ALL {
        columns.push(Column::new(field.as_str().into(), text(field)));
    }

    DataFrame::new(columns).map_err(map_polars("dataframe creation"))
}

fn dataframe_to_records(df: &DataFrame) -> Result<Vec<ObservationRecord>, DataError> {
    let timestamps = read_datetimes(df, "timestamp")?;
    let currencies = read_opt_strings(df, "currency")?;
    let mut fields = Vec::with_capacity(OhlcvField::ALL.len());
    for field in OhlcvField::ALL {
        fields.push(read_opt_strings(df, field.as_str())?);
    }

    let mut records = Vec::with_capacity(df.height());
    for (i, (timestamp, currency)) in timestamps.into_iter().zip(currencies).enumerate() {
        let symbol =
            currency.ok_or_else(|| DataError::ParquetError(format!("null currency at row {i}")))?;
        let mut value = |f: usize| fields[f][i].take().map(FieldValue::Text);
        records.push(ObservationRecord {
            timestamp,
            symbol,
            open: value(0),
            high: value(1),
            low: value(2),
            close: value(3),
            volume: value(4),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(symbol: &str, minute: u32, close: &str) -> ObservationRecord {
        ObservationRecord {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(9, minute, 0)
                .unwrap(),
            symbol: symbol.into(),
            open: Some("1.0".into()),
            high: Some("1.1".into()),
            low: Some("0.9".into()),
            close: Some(close.into()),
            volume: Some("100".into()),
        }
    }

    #[test]
    fn load_before_append_is_no_stored_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::new(dir.path());
        assert!(matches!(store.load(), Err(DataError::NoStoredData { .. })));
        assert_eq!(store.row_count().unwrap(), None);
    }

    #[test]
    fn append_keeps_strings_as_received() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::new(dir.path());
        let mut rec = record("EUR", 0, "1.0825");
        rec.volume = None;
        store.append(&[rec.clone()]).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, vec![rec]);
    }

    #[test]
    fn reappend_replaces_with_latest_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::new(dir.path());

        store
            .append(&[record("EUR", 0, "1.00"), record("EUR", 15, "1.01")])
            .unwrap();
        let report = store
            .append(&[record("EUR", 15, "1.02"), record("USD", 0, "1.00")])
            .unwrap();

        assert_eq!(report.received, 2);
        assert_eq!(report.duplicates_replaced, 1);
        assert_eq!(report.total_rows, 3);

        let loaded = store.load().unwrap();
        let eur_915: Vec<_> = loaded
            .iter()
            .filter(|r| r.symbol == "EUR" && r.timestamp.format("%H:%M").to_string() == "09:15")
            .collect();
        assert_eq!(eur_915.len(), 1);
        assert_eq!(eur_915[0].close, Some(FieldValue::from("1.02")));
    }

    #[test]
    fn dedup_keeps_first_position_and_last_values() {
        let rows = vec![
            record("USD", 0, "1.00"),
            record("EUR", 0, "2.00"),
            record("USD", 0, "1.50"),
        ];
        let kept = dedup_keep_last(rows);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].symbol, "USD");
        assert_eq!(kept[0].close, Some(FieldValue::from("1.50")));
        assert_eq!(kept[1].symbol, "EUR");
    }

    #[test]
    fn held_lock_rejects_second_writer() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::new(dir.path());

        let guard = store.lock().unwrap();
        let err = store.append(&[record("EUR", 0, "1.0")]).unwrap_err();
        assert!(matches!(err, DataError::StoreLocked { .. }));

        drop(guard);
        assert!(store.append(&[record("EUR", 0, "1.0")]).is_ok());
    }

    #[test]
    fn abandoned_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::new(dir.path());
        fs::write(store.lock_path(), "pid=1\ncreated=0\n").unwrap();

        let guard = store.lock().unwrap();
        let content = fs::read_to_string(store.lock_path()).unwrap();
        assert!(content.contains(&format!("pid={}", std::process::id())));

        drop(guard);
        assert!(!store.lock_path().exists());
    }

    #[test]
    fn fresh_foreign_lock_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let store = RawStore::new(dir.path());
        let created = Utc::now().timestamp();
        fs::write(store.lock_path(), format!("pid=1\ncreated={created}\n")).unwrap();

        let err = store.lock().unwrap_err();
        assert!(matches!(err, DataError::StoreLocked { .. }));
        assert!(err.to_string().contains("delete"));
        assert!(store.lock_path().exists());
    }

    #[test]
    fn lock_without_timestamp_falls_back_to_mtime() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("raw_data.lock"), "").unwrap();

        assert!(RawStore::new(dir.path()).lock().is_err());
        let store = RawStore::new(dir.path()).with_stale_lock_age(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(20));
        assert!(store.lock().is_ok());
    }
}
