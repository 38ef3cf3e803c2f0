//! Pipeline stages: raw → core → mart.
//!
//! Each stage reads only the committed output of the previous one, so stages
//! can be rerun independently. `run_all` chains them in order.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, info_span, warn};

use fxmart_core::data::{
    fetch_symbols, AlphaVantageSource, CircuitBreaker, CoreBuildReport, CoreStore,
    CurrencyCatalog, DataError, FetchProgress, FetchSummary, MartMeta, MartStore,
    ObservationSource, SyntheticSource, DELTA_TABLE, FULL_TABLE,
};
use fxmart_core::mart::{build_marts, MartError};

use crate::config::{ConfigError, PipelineConfig, SourceKind};

/// Errors from the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("mart error: {0}")]
    Mart(#[from] MartError),
    #[error("every symbol failed to fetch ({0} attempted)")]
    NothingFetched(usize),
}

/// Build the configured observation source.
pub fn build_source(config: &PipelineConfig) -> Result<Box<dyn ObservationSource>, PipelineError> {
    match config.source.kind {
        SourceKind::AlphaVantage => {
            let api_key = config.resolve_api_key()?;
            let breaker = Arc::new(CircuitBreaker::new(
                std::time::Duration::from_secs(config.source.breaker_cooldown_secs),
                config.source.breaker_failure_threshold,
            ));
            let source = AlphaVantageSource::new(config.alpha_vantage_config(api_key), breaker)?;
            Ok(Box::new(source))
        }
        SourceKind::Synthetic => Ok(Box::new(SyntheticSource::new(config.synthetic_config()))),
    }
}

/// Outcome of the raw stage.
#[derive(Debug)]
pub struct RawStageReport {
    pub fetch: FetchSummary,
    pub total_rows: usize,
}

/// Fetch every configured symbol into the raw layer.
///
/// Per-symbol failures are reported, not fatal. Fails only when no symbol
/// could be fetched at all.
pub fn run_raw_layer(
    config: &PipelineConfig,
    source: &dyn ObservationSource,
    progress: &dyn FetchProgress,
) -> Result<RawStageReport, PipelineError> {
    let _span = info_span!("raw_stage", source = source.name()).entered();

    let store = config.raw_store();
    let fetch = fetch_symbols(source, &store, &config.source.symbols, progress);
    for (symbol, error) in &fetch.errors {
        warn!(symbol = %symbol, error = %error, "symbol skipped");
    }
    if fetch.succeeded == 0 {
        return Err(PipelineError::NothingFetched(fetch.total));
    }

    let total_rows = store.row_count()?.unwrap_or(0);
    info!(
        succeeded = fetch.succeeded,
        failed = fetch.failed,
        total_rows,
        "raw layer updated"
    );
    Ok(RawStageReport { fetch, total_rows })
}

/// Rebuild the core layer from the whole raw layer.
pub fn run_core_layer(config: &PipelineConfig) -> Result<CoreBuildReport, PipelineError> {
    let _span = info_span!("core_stage").entered();

    let raw = config.raw_store().load()?;
    let report = CoreStore::new(config.core_dir()).rebuild(&raw)?;
    Ok(report)
}

/// Outcome of the mart stage.
#[derive(Debug)]
pub struct MartStageReport {
    pub full: MartMeta,
    pub delta: MartMeta,
    /// Observations skipped as malformed.
    pub rejected: Vec<MartError>,
}

/// Rebuild both mart tables from the core layer.
pub fn run_mart_layer(config: &PipelineConfig) -> Result<MartStageReport, PipelineError> {
    let _span = info_span!("mart_stage", order = %config.mart.row_order).entered();

    let catalog = CoreStore::new(config.core_dir());
    build_and_store_marts(&catalog, config)
}

/// Aggregate `catalog` and replace both mart tables.
pub fn build_and_store_marts(
    catalog: &dyn CurrencyCatalog,
    config: &PipelineConfig,
) -> Result<MartStageReport, PipelineError> {
    let mart_config = config.mart_config();
    let tables = build_marts(catalog, &mart_config)?;
    if !tables.rejected.is_empty() {
        warn!(rejected = tables.rejected.len(), "malformed observations skipped");
    }

    let store = MartStore::new(config.mart_dir());
    let full = store.write_full(&tables.full, mart_config.order)?;
    let delta = store.write_delta(&tables.delta, mart_config.order)?;

    Ok(MartStageReport {
        full,
        delta,
        rejected: tables.rejected,
    })
}

/// Outcome of a full run.
#[derive(Debug)]
pub struct RunReport {
    pub raw: RawStageReport,
    pub core: CoreBuildReport,
    pub mart: MartStageReport,
}

/// Raw, then core, then mart.
pub fn run_all(
    config: &PipelineConfig,
    source: &dyn ObservationSource,
    progress: &dyn FetchProgress,
) -> Result<RunReport, PipelineError> {
    let raw = run_raw_layer(config, source, progress)?;
    let core = run_core_layer(config)?;
    let mart = run_mart_layer(config)?;
    Ok(RunReport { raw, core, mart })
}

/// What each layer currently holds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarehouseStatus {
    pub raw_rows: Option<usize>,
    pub core_currencies: Option<usize>,
    pub core_observations: Option<usize>,
    pub mart_full: Option<MartMeta>,
    pub mart_delta: Option<MartMeta>,
}

impl WarehouseStatus {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Inspect every layer without modifying anything.
pub fn warehouse_status(config: &PipelineConfig) -> Result<WarehouseStatus, PipelineError> {
    let core = CoreStore::new(config.core_dir());
    let core_currencies = match core.list_currencies() {
        Ok(currencies) => Some(currencies.len()),
        Err(DataError::NoStoredData { .. }) => None,
        Err(e) => return Err(e.into()),
    };
    let mart = MartStore::new(config.mart_dir());

    Ok(WarehouseStatus {
        raw_rows: config.raw_store().row_count()?,
        core_currencies,
        core_observations: core.observation_count()?,
        mart_full: mart.meta(FULL_TABLE),
        mart_delta: mart.meta(DELTA_TABLE),
    })
}
