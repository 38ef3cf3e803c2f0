//! FXMart CLI: run the warehouse stages and inspect their output.
//!
//! Commands:
//! - `init`: write a default config file
//! - `raw`: fetch every configured currency into the raw layer
//! - `core`: rebuild the core layer from the raw layer
//! - `mart`: rebuild the full and delta marts from the core layer
//! - `run`: raw, core and mart in sequence
//! - `status`: report what each layer holds
//! - `export`: write both mart tables as CSV

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fxmart_core::data::{FetchSummary, LogProgress, MartStore};
use fxmart_core::mart::RowOrder;
use fxmart_runner::{
    build_source, export_marts, run_all, run_core_layer, run_mart_layer, run_raw_layer,
    warehouse_status, MartStageReport, PipelineConfig, SourceKind,
};

const DEFAULT_CONFIG: &str = "fxmart.toml";

#[derive(Parser)]
#[command(
    name = "fxmart",
    about = "FXMart: intraday currency warehouse: raw → core → mart"
)]
struct Cli {
    /// Path to the TOML config. Defaults to ./fxmart.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override storage.root.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file.
    Init {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Fetch every configured currency into the raw layer.
    Raw {
        /// Use the seeded synthetic source instead of Alpha Vantage.
        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Rebuild the core layer from the raw layer.
    Core,
    /// Rebuild the full and delta marts from the core layer.
    Mart {
        /// Row order: legacy or sorted.
        #[arg(long)]
        order: Option<RowOrder>,
    },
    /// Run raw, core and mart in sequence.
    Run {
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        #[arg(long)]
        order: Option<RowOrder>,
    },
    /// Report what each layer holds.
    Status {
        /// Print as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Write both mart tables as CSV.
    Export {
        #[arg(long, default_value = "exports")]
        output_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "fxmart=info".into()))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Commands::Init { path, force } = &cli.command {
        return run_init(path, *force);
    }

    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Raw { .. } => run_raw_cmd(&config),
        Commands::Core => run_core_cmd(&config),
        Commands::Mart { .. } => run_mart_cmd(&config),
        Commands::Run { .. } => run_all_cmd(&config),
        Commands::Status { json } => run_status_cmd(&config, json),
        Commands::Export { output_dir } => run_export_cmd(&config, &output_dir),
    }
}

/// Load the config file, apply command-line overrides, then validate the result.
fn resolve_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(root) = &cli.root {
        config.storage.root = root.clone();
    }
    match &cli.command {
        Commands::Raw { synthetic } => apply_synthetic(&mut config, *synthetic),
        Commands::Mart { order } => apply_order(&mut config, *order),
        Commands::Run { synthetic, order } => {
            apply_synthetic(&mut config, *synthetic);
            apply_order(&mut config, *order);
        }
        _ => {}
    }
    config
        .validate()
        .context("invalid configuration after command-line overrides")?;
    Ok(config)
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => Ok(PipelineConfig::from_file(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            Ok(PipelineConfig::from_file(Path::new(DEFAULT_CONFIG))?)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn apply_synthetic(config: &mut PipelineConfig, synthetic: bool) {
    if synthetic {
        config.source.kind = SourceKind::Synthetic;
    }
}

fn apply_order(config: &mut PipelineConfig, order: Option<RowOrder>) {
    if let Some(order) = order {
        config.mart.row_order = order;
    }
}

fn run_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let toml = PipelineConfig::default().to_toml()?;
    std::fs::write(path, toml).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn run_raw_cmd(config: &PipelineConfig) -> Result<()> {
    let source = build_source(config)?;
    let report = run_raw_layer(config, source.as_ref(), &LogProgress)?;
    println!(
        "Raw layer: {} rows ({} of {} symbols fetched)",
        report.total_rows, report.fetch.succeeded, report.fetch.total
    );
    exit_on_fetch_errors(&report.fetch);
    Ok(())
}

fn run_core_cmd(config: &PipelineConfig) -> Result<()> {
    let report = run_core_layer(config)?;
    println!(
        "Core layer: {} currencies, {} observations ({} unparseable values)",
        report.currencies, report.observations, report.null_values
    );
    Ok(())
}

fn run_mart_cmd(config: &PipelineConfig) -> Result<()> {
    let report = run_mart_layer(config)?;
    print_mart_summary(&report);
    Ok(())
}

fn run_all_cmd(config: &PipelineConfig) -> Result<()> {
    let source = build_source(config)?;
    let report = run_all(config, source.as_ref(), &LogProgress)?;
    println!(
        "Raw layer: {} rows ({} of {} symbols fetched)",
        report.raw.total_rows, report.raw.fetch.succeeded, report.raw.fetch.total
    );
    println!(
        "Core layer: {} currencies, {} observations",
        report.core.currencies, report.core.observations
    );
    print_mart_summary(&report.mart);
    exit_on_fetch_errors(&report.raw.fetch);
    Ok(())
}

fn print_mart_summary(report: &MartStageReport) {
    println!(
        "Mart: {} daily rows, {} delta rows ({} order)",
        report.full.row_count, report.delta.row_count, report.full.row_order
    );
    if !report.rejected.is_empty() {
        println!("Skipped {} malformed observations:", report.rejected.len());
        for e in report.rejected.iter().take(10) {
            println!("  {e}");
        }
    }
}

fn exit_on_fetch_errors(summary: &FetchSummary) {
    if !summary.all_succeeded() {
        for (sym, err) in &summary.errors {
            eprintln!("Error for {sym}: {err}");
        }
        std::process::exit(1);
    }
}

fn run_status_cmd(config: &PipelineConfig, json: bool) -> Result<()> {
    let status = warehouse_status(config)?;
    if json {
        println!("{}", status.to_json()?);
        return Ok(());
    }

    let or_missing = |v: Option<usize>| v.map_or_else(|| "(not built)".to_string(), |n| n.to_string());

    println!("Warehouse: {}", config.storage.root.display());
    println!("{:<20} {:>12}", "Layer", "Rows");
    println!("{}", "-".repeat(33));
    println!("{:<20} {:>12}", "raw", or_missing(status.raw_rows));
    println!("{:<20} {:>12}", "core currencies", or_missing(status.core_currencies));
    println!("{:<20} {:>12}", "core observations", or_missing(status.core_observations));
    for (name, meta) in [("mart full", &status.mart_full), ("mart delta", &status.mart_delta)] {
        match meta {
            Some(m) => println!(
                "{:<20} {:>12}  {} order, generated {}, hash {}",
                name,
                m.row_count,
                m.row_order,
                m.generated_at.format("%Y-%m-%d %H:%M:%S"),
                &m.content_hash[..12]
            ),
            None => println!("{:<20} {:>12}", name, "(not built)"),
        }
    }
    Ok(())
}

fn run_export_cmd(config: &PipelineConfig, output_dir: &Path) -> Result<()> {
    let store = MartStore::new(config.mart_dir());
    for path in export_marts(&store, output_dir)? {
        println!("Wrote {}", path.display());
    }
    Ok(())
}
