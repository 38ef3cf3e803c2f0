//! Observation source trait and structured error types.
//!
//! The ObservationSource trait abstracts over where intraday series come from
//! (Alpha Vantage, the synthetic generator) so the raw stage can run offline
//! and tests never touch the network.

use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::ObservationRecord;

/// Structured error types for sources and stores.
///
/// Displayable from the CLI as-is.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error(
        "store is locked by another writer: {} (delete it if no writer is running)",
        path.display()
    )]
    StoreLocked { path: PathBuf },

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("no stored data in {table}; run the `{stage}` stage first")]
    NoStoredData { table: String, stage: String },

    #[error("failed to write table '{table}': {reason}")]
    UploadFailure { table: String, reason: String },

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Whether a retry of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::NetworkUnreachable(_) | DataError::RateLimited { .. }
        )
    }
}

/// Result of a successful fetch for a single symbol.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub records: Vec<ObservationRecord>,
}

/// A provider of intraday OHLCV series.
///
/// Implementations only fetch and flatten; deduplication and storage belong
/// to the raw store.
pub trait ObservationSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the full intraday series available for a symbol.
    fn fetch(&self, symbol: &str) -> Result<FetchResult, DataError>;

    /// Check if the source is currently usable (not rate-limited, not blocked).
    fn is_available(&self) -> bool;
}

/// Progress callback for multi-symbol fetches.
pub trait FetchProgress: Send {
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    fn on_complete(&self, symbol: &str, index: usize, total: usize, result: &Result<usize, DataError>);

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that emits `tracing` events.
pub struct LogProgress;

impl FetchProgress for LogProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        info!("[{}/{}] fetching {symbol}", index + 1, total);
    }

    fn on_complete(
        &self,
        symbol: &str,
        _index: usize,
        _total: usize,
        result: &Result<usize, DataError>,
    ) {
        match result {
            Ok(rows) => info!(symbol, rows, "fetched"),
            Err(e) => warn!(symbol, error = %e, "fetch failed"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        info!(succeeded, failed, total, "fetch batch complete");
    }
}
