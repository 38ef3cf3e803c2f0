//! Collaborators around the mart engine: sources, stores and the catalog.

pub mod alphavantage;
pub mod catalog;
pub mod circuit_breaker;
pub mod core_store;
pub mod download;
pub mod mart_store;
pub mod parquet_io;
pub mod provider;
pub mod raw_store;
pub mod synthetic;

pub use alphavantage::{AlphaVantageConfig, AlphaVantageSource, OutputSize};
pub use catalog::{CurrencyCatalog, InMemoryCatalog};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use core_store::{CoreBuildReport, CoreStore};
pub use download::{fetch_symbols, FetchSummary};
pub use mart_store::{MartMeta, MartStore, DELTA_TABLE, FULL_TABLE};
pub use provider::{DataError, FetchProgress, FetchResult, LogProgress, ObservationSource};
pub use raw_store::{AppendReport, RawStore, RawWriteLock, DEFAULT_STALE_LOCK_AGE};
pub use synthetic::{SyntheticConfig, SyntheticSource};
