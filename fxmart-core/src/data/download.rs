//! Fetch orchestrator: pulls several symbols into the raw layer with
//! progress reporting. One failing symbol never aborts the others.

use super::provider::{DataError, FetchProgress, ObservationSource};
use super::raw_store::RawStore;

/// Fetch each symbol and append it to the raw store.
///
/// Stops early only when the source reports itself unavailable (circuit
/// breaker open); the remaining symbols are recorded as failed.
pub fn fetch_symbols(
    source: &dyn ObservationSource,
    store: &RawStore,
    symbols: &[String],
    progress: &dyn FetchProgress,
) -> FetchSummary {
    let total = symbols.len();
    let mut succeeded = 0;
    let mut failed = 0;
    let mut rows_appended = 0;
    let mut errors: Vec<(String, DataError)> = Vec::new();

    for (i, symbol) in symbols.iter().enumerate() {
        progress.on_start(symbol, i, total);

        let result = fetch_single(source, store, symbol);
        progress.on_complete(symbol, i, total, &result);

        match result {
            Ok(rows) => {
                succeeded += 1;
                rows_appended += rows;
            }
            Err(e) => {
                errors.push((symbol.clone(), e));
                failed += 1;
            }
        }

        if !source.is_available() {
            for sym in &symbols[(i + 1)..total] {
                errors.push((sym.clone(), DataError::CircuitBreakerTripped));
                failed += 1;
            }
            break;
        }
    }

    progress.on_batch_complete(succeeded, failed, total);

    FetchSummary {
        total,
        succeeded,
        failed,
        rows_appended,
        errors,
    }
}

/// Fetch one symbol and land it: fetch → raw append.
fn fetch_single(
    source: &dyn ObservationSource,
    store: &RawStore,
    symbol: &str,
) -> Result<usize, DataError> {
    let fetched = source.fetch(symbol)?;
    let report = store.append(&fetched.records)?;
    Ok(report.received)
}

/// Summary of a multi-symbol fetch.
#[derive(Debug)]
pub struct FetchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub rows_appended: usize,
    pub errors: Vec<(String, DataError)>,
}

impl FetchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}
