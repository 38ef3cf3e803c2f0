//! Mart-layer aggregation engine.
//!
//! Pure and in-memory: the catalog is the only input, and persistence happens
//! in the caller. Three stages:
//! - [`daily::DailyAggregator`]: one summary per currency per calendar day
//! - [`snapshot::SnapshotAssembler`]: the full mart across all currencies
//! - [`delta::DeltaComputer`]: latest-day minus previous-day per currency

pub mod daily;
pub mod delta;
pub mod snapshot;

pub use daily::{percent_change, DailyAggregation, DailyAggregator};
pub use delta::{delta_between, latest_two, DeltaComputer};
pub use snapshot::{order_rows, Parallelism, Snapshot, SnapshotAssembler};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::data::catalog::CurrencyCatalog;
use crate::data::provider::DataError;
use crate::domain::{Currency, DailySummary, DeltaSummary, OhlcvField, SamplingInterval};

/// Row order of both mart tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    /// Historical head-insertion layout: last catalog currency first, dates
    /// ascending within a currency.
    #[default]
    Legacy,
    /// `(currency_symbol, date)` ascending.
    Sorted,
}

impl fmt::Display for RowOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowOrder::Legacy => f.write_str("legacy"),
            RowOrder::Sorted => f.write_str("sorted"),
        }
    }
}

impl FromStr for RowOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "legacy" => Ok(RowOrder::Legacy),
            "sorted" => Ok(RowOrder::Sorted),
            other => Err(format!("unknown row order '{other}'. Valid: legacy, sorted")),
        }
    }
}

/// Errors raised by the mart engine.
#[derive(Debug, Error)]
pub enum MartError {
    #[error("malformed observation for {symbol} at {timestamp}: missing or non-numeric {field}")]
    MalformedObservation {
        symbol: String,
        timestamp: NaiveDateTime,
        field: OhlcvField,
    },

    #[error("catalog error: {0}")]
    Catalog(#[from] DataError),

    #[error("failed to build aggregation thread pool: {0}")]
    ThreadPool(String),
}

/// Knobs for one mart build.
#[derive(Debug, Clone, Copy, Default)]
pub struct MartConfig {
    pub interval: SamplingInterval,
    pub order: RowOrder,
    pub parallelism: Parallelism,
}

/// Both mart tables from one build.
#[derive(Debug, Default)]
pub struct MartTables {
    pub currencies: Vec<Currency>,
    pub full: Vec<DailySummary>,
    pub delta: Vec<DeltaSummary>,
    pub rejected: Vec<MartError>,
}

/// Full mart, then delta mart, from one catalog snapshot.
pub fn build_marts(
    catalog: &dyn CurrencyCatalog,
    config: &MartConfig,
) -> Result<MartTables, MartError> {
    let snapshot = SnapshotAssembler::new(DailyAggregator::new(config.interval))
        .with_order(config.order)
        .with_parallelism(config.parallelism)
        .assemble(catalog)?;

    let delta = DeltaComputer::new(config.order).compute(&snapshot.rows, &snapshot.currencies);

    Ok(MartTables {
        currencies: snapshot.currencies,
        full: snapshot.rows,
        delta,
        rejected: snapshot.rejected,
    })
}
