//! End-to-end pipeline runs against the synthetic source.

use fxmart_core::data::{LogProgress, MartStore, FULL_TABLE, DELTA_TABLE};
use fxmart_core::mart::RowOrder;
use fxmart_runner::{
    build_source, export_marts, run_all, run_core_layer, run_mart_layer, PipelineConfig,
    SourceKind,
};
use proptest::prelude::*;
use std::path::Path;

fn config(root: &Path, order: RowOrder) -> PipelineConfig {
    PipelineConfig::from_toml(&format!(
        r#"
[source]
kind = "synthetic"
symbols = ["USD", "EUR", "GBP"]
synthetic_days = 3

[storage]
root = "{}"

[mart]
row_order = "{order}"
"#,
        root.display().to_string().replace('\\', "/")
    ))
    .unwrap()
}

#[test]
fn rerun_on_unchanged_raw_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), RowOrder::Legacy);
    let source = build_source(&config).unwrap();
    run_all(&config, source.as_ref(), &LogProgress).unwrap();

    let mart = MartStore::new(config.mart_dir());
    let full_before = std::fs::read(mart.table_path(FULL_TABLE)).unwrap();
    let delta_before = std::fs::read(mart.table_path(DELTA_TABLE)).unwrap();

    run_core_layer(&config).unwrap();
    run_mart_layer(&config).unwrap();

    assert_eq!(std::fs::read(mart.table_path(FULL_TABLE)).unwrap(), full_before);
    assert_eq!(std::fs::read(mart.table_path(DELTA_TABLE)).unwrap(), delta_before);
}

#[test]
fn refetch_then_rebuild_keeps_the_same_marts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), RowOrder::Legacy);
    let source = build_source(&config).unwrap();

    let first = run_all(&config, source.as_ref(), &LogProgress).unwrap();
    let second = run_all(&config, source.as_ref(), &LogProgress).unwrap();

    assert_eq!(first.raw.total_rows, second.raw.total_rows);
    assert_eq!(first.mart.full.content_hash, second.mart.full.content_hash);
    assert_eq!(first.mart.delta.content_hash, second.mart.delta.content_hash);
}

#[test]
fn legacy_and_sorted_runs_hold_the_same_rows() {
    let legacy_dir = tempfile::tempdir().unwrap();
    let sorted_dir = tempfile::tempdir().unwrap();

    let legacy = config(legacy_dir.path(), RowOrder::Legacy);
    let sorted = config(sorted_dir.path(), RowOrder::Sorted);
    for cfg in [&legacy, &sorted] {
        let source = build_source(cfg).unwrap();
        run_all(cfg, source.as_ref(), &LogProgress).unwrap();
    }

    let legacy_rows = MartStore::new(legacy.mart_dir()).load_full().unwrap();
    let sorted_rows = MartStore::new(sorted.mart_dir()).load_full().unwrap();
    assert_eq!(legacy_rows.len(), 9);
    assert_eq!(legacy_rows[0].currency_symbol, "GBP");
    assert_eq!(sorted_rows[0].currency_symbol, "EUR");
    for row in &legacy_rows {
        assert!(sorted_rows.contains(row));
    }

    let delta: Vec<String> = MartStore::new(sorted.mart_dir())
        .load_delta()
        .unwrap()
        .into_iter()
        .map(|d| d.currency_symbol)
        .collect();
    assert_eq!(delta, vec!["EUR", "GBP", "USD"]);
}

#[test]
fn export_after_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), RowOrder::Legacy);
    let source = build_source(&config).unwrap();
    run_all(&config, source.as_ref(), &LogProgress).unwrap();

    let paths = export_marts(&MartStore::new(config.mart_dir()), &dir.path().join("csv")).unwrap();
    let full = std::fs::read_to_string(&paths[0]).unwrap();
    let delta = std::fs::read_to_string(&paths[1]).unwrap();
    assert_eq!(full.lines().count(), 1 + 9);
    assert_eq!(delta.lines().count(), 1 + 3);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any distinct, non-blank symbol list is a valid config and survives TOML.
    #[test]
    fn symbol_lists_roundtrip(symbols in prop::collection::hash_set("[A-Z]{3}", 1..8)) {
        let mut config = PipelineConfig::default();
        config.source.kind = SourceKind::Synthetic;
        config.source.symbols = symbols.into_iter().collect();

        let text = config.to_toml().unwrap();
        let parsed = PipelineConfig::from_toml(&text).unwrap();
        prop_assert_eq!(parsed, config);
    }
}
