//! Core layer: the currency table plus one observation table keyed by
//! currency id.
//!
//! Layout:
//! - `{dir}/currencies.parquet` — `cur_id`, `cur_name`
//! - `{dir}/observations.parquet` — `id`, `cur_id`, `timestamp`, OHLCV as
//!   nullable floats
//!
//! Both tables are rebuilt from the raw layer on every run. Raw strings that
//! do not parse as finite numbers become nulls here and are rejected by the
//! aggregator.

use polars::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

use super::catalog::CurrencyCatalog;
use super::parquet_io::{
    datetime_column, map_polars, read_datetimes, read_opt_f64s, read_parquet, read_strings,
    read_u32s, require_columns, stage_parquet,
};
use super::provider::DataError;
use crate::domain::{
    assign_currency_ids, Currency, CurrencyId, FieldValue, ObservationRecord, OhlcvField,
};

pub const CURRENCIES_TABLE: &str = "core_currencies";
pub const OBSERVATIONS_TABLE: &str = "core_observations";

/// Outcome of a core rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreBuildReport {
    pub currencies: usize,
    pub observations: usize,
    /// Individual OHLCV values that failed numeric coercion.
    pub null_values: usize,
}

pub struct CoreStore {
    dir: PathBuf,
}

impl CoreStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn currencies_path(&self) -> PathBuf {
        self.dir.join("currencies.parquet")
    }

    pub fn observations_path(&self) -> PathBuf {
        self.dir.join("observations.parquet")
    }

    /// Replace both core tables from raw rows.
    ///
    /// Currency ids follow first appearance in `raw`; observations are
    /// ordered by `(cur_id, timestamp)` with `id` counting from 0 per currency.
    pub fn rebuild(&self, raw: &[ObservationRecord]) -> Result<CoreBuildReport, DataError> {
        let currencies = assign_currency_ids(raw.iter().map(|r| r.symbol.as_str()));
        let ids: HashMap<&str, u32> = currencies
            .iter()
            .map(|c| (c.symbol.as_str(), c.id.0))
            .collect();

        let mut rows: Vec<(u32, &ObservationRecord)> = raw
            .iter()
            .filter_map(|r| ids.get(r.symbol.as_str()).map(|id| (*id, r)))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.timestamp.cmp(&b.1.timestamp)));

        let mut row_ids: Vec<u64> = Vec::with_capacity(rows.len());
        let mut next: HashMap<u32, u64> = HashMap::new();
        for (cur_id, _) in &rows {
            let counter = next.entry(*cur_id).or_insert(0);
            row_ids.push(*counter);
            *counter += 1;
        }

        let mut null_values = 0;
        let mut columns = vec![
            Column::new("id".into(), row_ids),
            Column::new(
                "cur_id".into(),
                rows.iter().map(|(id, _)| *id).collect::<Vec<u32>>(),
            ),
            datetime_column("timestamp", rows.iter().map(|(_, r)| r.timestamp))?,
        ];
        for field in OhlcvField::ALL {
            let values: Vec<Option<f64>> = rows.iter().map(|(_, r)| r.numeric(field)).collect();
            null_values += values.iter().filter(|v| v.is_none()).count();
            columns.push(Column::new(field.as_str().into(), values));
        }
        let mut observations = DataFrame::new(columns).map_err(map_polars("dataframe creation"))?;

        let mut currency_df = DataFrame::new(vec![
            Column::new(
                "cur_id".into(),
                currencies.iter().map(|c| c.id.0).collect::<Vec<u32>>(),
            ),
            Column::new(
                "cur_name".into(),
                currencies.iter().map(|c| c.symbol.clone()).collect::<Vec<String>>(),
            ),
        ])
        .map_err(map_polars("dataframe creation"))?;

        // Stage both before replacing either. Ids are stable across rebuilds,
        // so new currencies beside old observations is the only torn state.
        let staged_currencies =
            stage_parquet(&mut currency_df, &self.currencies_path(), CURRENCIES_TABLE)?;
        let staged_observations =
            match stage_parquet(&mut observations, &self.observations_path(), OBSERVATIONS_TABLE) {
                Ok(staged) => staged,
                Err(e) => {
                    staged_currencies.discard();
                    return Err(e);
                }
            };
        if let Err(e) = staged_currencies.commit() {
            staged_observations.discard();
            return Err(e);
        }
        staged_observations.commit()?;

        let report = CoreBuildReport {
            currencies: currencies.len(),
            observations: rows.len(),
            null_values,
        };
        info!(
            currencies = report.currencies,
            observations = report.observations,
            null_values = report.null_values,
            "core layer rebuilt"
        );
        Ok(report)
    }

    fn load_currencies(&self) -> Result<Vec<Currency>, DataError> {
        let df = read_parquet(&self.currencies_path(), CURRENCIES_TABLE, "core")?;
        require_columns(&df, &["cur_id", "cur_name"])?;
        let ids = read_u32s(&df, "cur_id")?;
        let names = read_strings(&df, "cur_name")?;
        let mut currencies: Vec<Currency> = ids
            .into_iter()
            .zip(names)
            .map(|(id, name)| Currency::new(id, name))
            .collect();
        currencies.sort_by_key(|c| c.id);
        Ok(currencies)
    }

    /// Number of stored observations, `None` before the first rebuild.
    pub fn observation_count(&self) -> Result<Option<usize>, DataError> {
        let path = self.observations_path();
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(
            read_parquet(&path, OBSERVATIONS_TABLE, "core")?.height(),
        ))
    }
}

impl CurrencyCatalog for CoreStore {
    fn list_currencies(&self) -> Result<Vec<Currency>, DataError> {
        self.load_currencies()
    }

    fn id_for(&self, symbol: &str) -> Result<Option<CurrencyId>, DataError> {
        Ok(self
            .load_currencies()?
            .into_iter()
            .find(|c| c.symbol == symbol)
            .map(|c| c.id))
    }

    fn fetch_observations(&self, symbol: &str) -> Result<Vec<ObservationRecord>, DataError> {
        let Some(id) = self.id_for(symbol)? else {
            return Ok(Vec::new());
        };

        let path = self.observations_path();
        if !path.exists() {
            return Err(DataError::NoStoredData {
                table: OBSERVATIONS_TABLE.into(),
                stage: "core".into(),
            });
        }

        let df = LazyFrame::scan_parquet(&path, Default::default())
            .map_err(map_polars("scan core observations"))?
            .filter(col("cur_id").eq(lit(id.0)))
            .sort(["id"], SortMultipleOptions::default())
            .collect()
            .map_err(map_polars("filter core observations"))?;

        let timestamps = read_datetimes(&df, "timestamp")?;
        let mut fields = Vec::with_capacity(OhlcvField::ALL.len());
        for field in OhlcvField::ALL {
            fields.push(read_opt_f64s(&df, field.as_str())?);
        }

        Ok(timestamps
            .into_iter()
            .enumerate()
            .map(|(i, timestamp)| {
                let value = |f: usize| fields[f][i].map(FieldValue::Number);
                ObservationRecord {
                    timestamp,
                    symbol: symbol.to_string(),
                    open: value(0),
                    high: value(1),
                    low: value(2),
                    close: value(3),
                    volume: value(4),
                }
            })
            .collect())
    }
}
