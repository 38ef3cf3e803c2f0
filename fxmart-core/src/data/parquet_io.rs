//! Parquet I/O helpers shared by the raw, core and mart stores.
//!
//! Writes are atomic: the frame goes to `<file>.tmp` first and is renamed
//! into place, so a failed write leaves the previous table untouched.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::provider::DataError;

fn upload_failure(table: &str, reason: String) -> DataError {
    DataError::UploadFailure {
        table: table.to_string(),
        reason,
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// A frame written next to its destination, waiting to be renamed in.
#[derive(Debug)]
pub struct StagedFile {
    tmp_path: PathBuf,
    path: PathBuf,
    table: String,
}

impl StagedFile {
    /// Rename into place, replacing the previous table.
    pub fn commit(self) -> Result<(), DataError> {
        fs::rename(&self.tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&self.tmp_path);
            upload_failure(&self.table, format!("atomic rename failed: {e}"))
        })
    }

    /// Drop the temporary file and leave the previous table as it was.
    pub fn discard(self) {
        let _ = fs::remove_file(&self.tmp_path);
    }
}

/// Write a frame to `<path>.tmp` without touching `path`.
pub fn stage_parquet(df: &mut DataFrame, path: &Path, table: &str) -> Result<StagedFile, DataError> {
    let tmp_path = tmp_path_for(path);
    write_tmp(&tmp_path, path, table, |file| {
        ParquetWriter::new(file)
            .finish(df)
            .map(|_| ())
            .map_err(|e| format!("write parquet: {e}"))
    })?;
    Ok(StagedFile {
        tmp_path,
        path: path.to_path_buf(),
        table: table.to_string(),
    })
}

/// Write a frame to `path` through a temporary file.
pub fn write_parquet_atomic(df: &mut DataFrame, path: &Path, table: &str) -> Result<(), DataError> {
    stage_parquet(df, path, table)?.commit()
}

/// Write raw bytes to `path` through a temporary file.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8], table: &str) -> Result<(), DataError> {
    let tmp_path = tmp_path_for(path);
    write_tmp(&tmp_path, path, table, |mut file| {
        file.write_all(bytes).map_err(|e| format!("write: {e}"))
    })?;
    StagedFile {
        tmp_path,
        path: path.to_path_buf(),
        table: table.to_string(),
    }
    .commit()
}

fn write_tmp(
    tmp_path: &Path,
    path: &Path,
    table: &str,
    write: impl FnOnce(fs::File) -> Result<(), String>,
) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| upload_failure(table, format!("failed to create dir: {e}")))?;
    }

    let file = fs::File::create(tmp_path).map_err(|e| upload_failure(table, format!("create file: {e}")))?;
    write(file).map_err(|reason| {
        let _ = fs::remove_file(tmp_path);
        upload_failure(table, reason)
    })
}

/// Read a whole parquet file. A missing file is `NoStoredData`.
pub fn read_parquet(path: &Path, table: &str, stage: &str) -> Result<DataFrame, DataError> {
    if !path.exists() {
        return Err(DataError::NoStoredData {
            table: table.to_string(),
            stage: stage.to_string(),
        });
    }
    let file = fs::File::open(path).map_err(|e| DataError::ParquetError(format!("open: {e}")))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read {}: {e}", path.display())))
}

/// Fail with `ParquetError` if any expected column is missing.
pub fn require_columns(df: &DataFrame, columns: &[&str]) -> Result<(), DataError> {
    for name in columns {
        if df.column(name).is_err() {
            return Err(DataError::ParquetError(format!("missing column '{name}'")));
        }
    }
    Ok(())
}

pub fn map_polars(context: &str) -> impl Fn(PolarsError) -> DataError + '_ {
    move |e| DataError::ParquetError(format!("{context}: {e}"))
}

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

pub fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

pub fn date_from_days(days: i32) -> NaiveDate {
    epoch() + chrono::Duration::days(days as i64)
}

pub fn datetime_to_millis(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

pub fn datetime_from_millis(millis: i64) -> Result<NaiveDateTime, DataError> {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| DataError::ParquetError(format!("timestamp out of range: {millis}")))
}

/// `Date` column from calendar dates.
pub fn date_column(name: &str, dates: impl Iterator<Item = NaiveDate>) -> Result<Column, DataError> {
    let days: Vec<i32> = dates.map(days_since_epoch).collect();
    Column::new(name.into(), days)
        .cast(&DataType::Date)
        .map_err(map_polars("date cast"))
}

/// Millisecond `Datetime` column from naive timestamps.
pub fn datetime_column(
    name: &str,
    timestamps: impl Iterator<Item = NaiveDateTime>,
) -> Result<Column, DataError> {
    let millis: Vec<i64> = timestamps.map(datetime_to_millis).collect();
    Column::new(name.into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .map_err(map_polars("datetime cast"))
}

/// Read a `Datetime` column back as naive timestamps. Nulls are an error.
pub fn read_datetimes(df: &DataFrame, name: &str) -> Result<Vec<NaiveDateTime>, DataError> {
    let column = df
        .column(name)
        .map_err(map_polars("column read"))?
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .and_then(|c| c.cast(&DataType::Int64))
        .map_err(map_polars("timestamp cast"))?;
    let ca = column.i64().map_err(map_polars("timestamp column type"))?;

    ca.into_iter()
        .enumerate()
        .map(|(i, millis)| {
            let millis =
                millis.ok_or_else(|| DataError::ParquetError(format!("null {name} at row {i}")))?;
            datetime_from_millis(millis)
        })
        .collect()
}

/// Read a `Date` column back as calendar dates. Nulls are an error.
pub fn read_dates(df: &DataFrame, name: &str) -> Result<Vec<NaiveDate>, DataError> {
    let column = df
        .column(name)
        .map_err(map_polars("column read"))?
        .cast(&DataType::Int32)
        .map_err(map_polars("date cast"))?;
    let ca = column.i32().map_err(map_polars("date column type"))?;

    ca.into_iter()
        .enumerate()
        .map(|(i, days)| {
            days.map(date_from_days)
                .ok_or_else(|| DataError::ParquetError(format!("null {name} at row {i}")))
        })
        .collect()
}

/// Nullable string column.
pub fn read_opt_strings(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, DataError> {
    let ca = df
        .column(name)
        .map_err(map_polars("column read"))?
        .str()
        .map_err(map_polars("string column type"))?;
    Ok(ca.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Non-null string column.
pub fn read_strings(df: &DataFrame, name: &str) -> Result<Vec<String>, DataError> {
    read_opt_strings(df, name)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or_else(|| DataError::ParquetError(format!("null {name} at row {i}"))))
        .collect()
}

/// Nullable float column.
pub fn read_opt_f64s(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, DataError> {
    let ca = df
        .column(name)
        .map_err(map_polars("column read"))?
        .f64()
        .map_err(map_polars("float column type"))?;
    Ok(ca.into_iter().collect())
}

/// Non-null float column.
pub fn read_f64s(df: &DataFrame, name: &str) -> Result<Vec<f64>, DataError> {
    read_opt_f64s(df, name)?
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or_else(|| DataError::ParquetError(format!("null {name} at row {i}"))))
        .collect()
}

/// Non-null `u32` column.
pub fn read_u32s(df: &DataFrame, name: &str) -> Result<Vec<u32>, DataError> {
    let ca = df
        .column(name)
        .map_err(map_polars("column read"))?
        .u32()
        .map_err(map_polars("u32 column type"))?;
    ca.into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or_else(|| DataError::ParquetError(format!("null {name} at row {i}"))))
        .collect()
}
