//! FXMart Runner — configuration, pipeline stages and export.
//!
//! This crate builds on `fxmart-core` to provide:
//! - TOML pipeline configuration with API key resolution
//! - The raw → core → mart stage runners
//! - Warehouse status inspection
//! - CSV export of the mart tables

pub mod config;
pub mod export;
pub mod pipeline;

pub use config::{ConfigError, MartSettings, PipelineConfig, SourceConfig, SourceKind, StorageConfig};
pub use export::{export_delta_csv, export_full_csv, export_marts};
pub use pipeline::{
    build_and_store_marts, build_source, run_all, run_core_layer, run_mart_layer, run_raw_layer,
    warehouse_status, MartStageReport, PipelineError, RawStageReport, RunReport, WarehouseStatus,
};
