//! CSV export of the mart tables.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fxmart_core::data::{MartStore, DELTA_TABLE, FULL_TABLE};
use fxmart_core::domain::{DailySummary, DeltaSummary};

// ─── CSV export ─────────────────────────────────────────────────────

/// Full mart as CSV, one row per currency and day, in table order.
pub fn export_full_csv(rows: &[DailySummary]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "date",
        "currency_symbol",
        "total_volume",
        "open_price",
        "close_price",
        "percent_change",
        "peak_volume_window",
        "peak_price_window",
        "trough_price_window",
    ])?;

    for r in rows {
        wtr.write_record([
            &r.date.to_string(),
            &r.currency_symbol,
            &r.total_volume.to_string(),
            &r.open_price.to_string(),
            &r.close_price.to_string(),
            &r.percent_change.to_string(),
            &r.peak_volume_window.to_string(),
            &r.peak_price_window.to_string(),
            &r.trough_price_window.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Delta mart as CSV.
pub fn export_delta_csv(rows: &[DeltaSummary]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "date_range_label",
        "currency_symbol",
        "from_date",
        "to_date",
        "volume_delta",
        "open_price_delta",
        "close_price_delta",
        "percent_change_delta",
    ])?;

    for r in rows {
        wtr.write_record([
            &r.date_range_label,
            &r.currency_symbol,
            &r.from_date.to_string(),
            &r.to_date.to_string(),
            &r.volume_delta.to_string(),
            &r.open_price_delta.to_string(),
            &r.close_price_delta.to_string(),
            &r.percent_change_delta.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Export bundle ──────────────────────────────────────────────────

/// Write `mart_full.csv` and `mart_delta.csv` under `output_dir`.
///
/// Returns the written paths.
pub fn export_marts(store: &MartStore, output_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let full = store.load_full().context("failed to load full mart")?;
    let delta = store.load_delta().context("failed to load delta mart")?;

    let full_path = output_dir.join(format!("{FULL_TABLE}.csv"));
    fs::write(&full_path, export_full_csv(&full)?)
        .with_context(|| format!("failed to write {}", full_path.display()))?;

    let delta_path = output_dir.join(format!("{DELTA_TABLE}.csv"));
    fs::write(&delta_path, export_delta_csv(&delta)?)
        .with_context(|| format!("failed to write {}", delta_path.display()))?;

    Ok(vec![full_path, delta_path])
}
