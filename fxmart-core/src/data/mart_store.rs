//! Mart persistence: full and delta tables with metadata sidecars.
//!
//! Layout: `{dir}/mart_full.parquet`, `{dir}/mart_delta.parquet`, each with a
//! `*.meta.json` sidecar. Tables are replaced wholesale on every write.

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use super::parquet_io::{
    date_column, map_polars, read_dates, read_f64s, read_parquet, read_strings, require_columns,
    write_bytes_atomic, write_parquet_atomic,
};
use super::provider::DataError;
use crate::domain::{DailySummary, DeltaSummary, TimeWindow};
use crate::mart::RowOrder;

pub const FULL_TABLE: &str = "mart_full";
pub const DELTA_TABLE: &str = "mart_delta";

const FULL_COLUMNS: [&str; 9] = [
    "date",
    "currency_symbol",
    "total_volume",
    "open_price",
    "close_price",
    "percent_change",
    "peak_volume_window",
    "peak_price_window",
    "trough_price_window",
];

const DELTA_COLUMNS: [&str; 8] = [
    "date_range_label",
    "currency_symbol",
    "from_date",
    "to_date",
    "volume_delta",
    "open_price_delta",
    "close_price_delta",
    "percent_change_delta",
];

/// Metadata sidecar for a mart table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MartMeta {
    pub table: String,
    pub row_count: usize,
    /// BLAKE3 of the rows serialized as JSON.
    pub content_hash: String,
    pub row_order: RowOrder,
    pub generated_at: NaiveDateTime,
}

pub struct MartStore {
    dir: PathBuf,
}

impl MartStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.parquet"))
    }

    fn meta_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.meta.json"))
    }

    /// Replace the full mart.
    pub fn write_full(&self, rows: &[DailySummary], order: RowOrder) -> Result<MartMeta, DataError> {
        let mut df = full_to_dataframe(rows)?;
        write_parquet_atomic(&mut df, &self.table_path(FULL_TABLE), FULL_TABLE)?;
        self.write_meta(FULL_TABLE, rows, order)
    }

    /// Replace the delta mart.
    pub fn write_delta(&self, rows: &[DeltaSummary], order: RowOrder) -> Result<MartMeta, DataError> {
        let mut df = delta_to_dataframe(rows)?;
        write_parquet_atomic(&mut df, &self.table_path(DELTA_TABLE), DELTA_TABLE)?;
        self.write_meta(DELTA_TABLE, rows, order)
    }

    pub fn load_full(&self) -> Result<Vec<DailySummary>, DataError> {
        let df = read_parquet(&self.table_path(FULL_TABLE), FULL_TABLE, "mart")?;
        require_columns(&df, &FULL_COLUMNS)?;
        dataframe_to_full(&df)
    }

    pub fn load_delta(&self) -> Result<Vec<DeltaSummary>, DataError> {
        let df = read_parquet(&self.table_path(DELTA_TABLE), DELTA_TABLE, "mart")?;
        require_columns(&df, &DELTA_COLUMNS)?;
        dataframe_to_delta(&df)
    }

    /// Sidecar of a table, if it has been written.
    pub fn meta(&self, table: &str) -> Option<MartMeta> {
        let content = fs::read_to_string(self.meta_path(table)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write_meta<T: Serialize>(
        &self,
        table: &str,
        rows: &[T],
        order: RowOrder,
    ) -> Result<MartMeta, DataError> {
        let upload_failure = |reason: String| DataError::UploadFailure {
            table: table.to_string(),
            reason,
        };

        let meta = MartMeta {
            table: table.to_string(),
            row_count: rows.len(),
            content_hash: blake3::hash(
                &serde_json::to_vec(rows)
                    .map_err(|e| upload_failure(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            row_order: order,
            generated_at: chrono::Local::now().naive_local(),
        };
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| upload_failure(format!("meta serialization: {e}")))?;
        write_bytes_atomic(&self.meta_path(table), json.as_bytes(), table)?;

        info!(table, rows = meta.row_count, hash = %&meta.content_hash[..12], "mart table written");
        Ok(meta)
    }
}

fn full_to_dataframe(rows: &[DailySummary]) -> Result<DataFrame, DataError> {
    let floats = |f: fn(&DailySummary) -> f64| rows.iter().map(f).collect::<Vec<f64>>();
    let texts = |f: fn(&DailySummary) -> String| rows.iter().map(f).collect::<Vec<String>>();

    DataFrame::new(vec![
        date_column("date", rows.iter().map(|r| r.date))?,
        Column::new("currency_symbol".into(), texts(|r| r.currency_symbol.clone())),
        Column::new("total_volume".into(), floats(|r| r.total_volume)),
        Column::new("open_price".into(), floats(|r| r.open_price)),
        Column::new("close_price".into(), floats(|r| r.close_price)),
        Column::new("percent_change".into(), floats(|r| r.percent_change)),
        Column::new("peak_volume_window".into(), texts(|r| r.peak_volume_window.to_string())),
        Column::new("peak_price_window".into(), texts(|r| r.peak_price_window.to_string())),
        Column::new("trough_price_window".into(), texts(|r| r.trough_price_window.to_string())),
    ])
    .map_err(map_polars("dataframe creation"))
}

fn delta_to_dataframe(rows: &[DeltaSummary]) -> Result<DataFrame, DataError> {
    let floats = |f: fn(&DeltaSummary) -> f64| rows.iter().map(f).collect::<Vec<f64>>();

    DataFrame::new(vec![
        Column::new(
            "date_range_label".into(),
            rows.iter().map(|r| r.date_range_label.clone()).collect::<Vec<String>>(),
        ),
        Column::new(
            "currency_symbol".into(),
            rows.iter().map(|r| r.currency_symbol.clone()).collect::<Vec<String>>(),
        ),
        date_column("from_date", rows.iter().map(|r| r.from_date))?,
        date_column("to_date", rows.iter().map(|r| r.to_date))?,
        Column::new("volume_delta".into(), floats(|r| r.volume_delta)),
        Column::new("open_price_delta".into(), floats(|r| r.open_price_delta)),
        Column::new("close_price_delta".into(), floats(|r| r.close_price_delta)),
        Column::new("percent_change_delta".into(), floats(|r| r.percent_change_delta)),
    ])
    .map_err(map_polars("dataframe creation"))
}

fn parse_windows(df: &DataFrame, name: &str) -> Result<Vec<TimeWindow>, DataError> {
    read_strings(df, name)?
        .iter()
        .map(|s| s.parse::<TimeWindow>().map_err(DataError::ParquetError))
        .collect()
}

fn dataframe_to_full(df: &DataFrame) -> Result<Vec<DailySummary>, DataError> {
    let dates = read_dates(df, "date")?;
    let symbols = read_strings(df, "currency_symbol")?;
    let volumes = read_f64s(df, "total_volume")?;
    let opens = read_f64s(df, "open_price")?;
    let closes = read_f64s(df, "close_price")?;
    let changes = read_f64s(df, "percent_change")?;
    let peak_volume = parse_windows(df, "peak_volume_window")?;
    let peak_price = parse_windows(df, "peak_price_window")?;
    let trough_price = parse_windows(df, "trough_price_window")?;

    Ok(symbols
        .into_iter()
        .enumerate()
        .map(|(i, currency_symbol)| DailySummary {
            date: dates[i],
            currency_symbol,
            total_volume: volumes[i],
            open_price: opens[i],
            close_price: closes[i],
            percent_change: changes[i],
            peak_volume_window: peak_volume[i],
            peak_price_window: peak_price[i],
            trough_price_window: trough_price[i],
        })
        .collect())
}

fn dataframe_to_delta(df: &DataFrame) -> Result<Vec<DeltaSummary>, DataError> {
    let labels = read_strings(df, "date_range_label")?;
    let symbols = read_strings(df, "currency_symbol")?;
    let from = read_dates(df, "from_date")?;
    let to = read_dates(df, "to_date")?;
    let volumes = read_f64s(df, "volume_delta")?;
    let opens = read_f64s(df, "open_price_delta")?;
    let closes = read_f64s(df, "close_price_delta")?;
    let changes = read_f64s(df, "percent_change_delta")?;

    Ok(labels
        .into_iter()
        .zip(symbols)
        .enumerate()
        .map(|(i, (date_range_label, currency_symbol))| DeltaSummary {
            date_range_label,
            currency_symbol,
            from_date: from[i],
            to_date: to[i],
            volume_delta: volumes[i],
            open_price_delta: opens[i],
            close_price_delta: closes[i],
            percent_change_delta: changes[i],
        })
        .collect())
}
