//! Pipeline configuration, loaded from TOML.
//!
//! ```toml
//! [source]
//! kind = "alpha_vantage"       # or "synthetic"
//! symbols = ["USD", "EUR", "GBP"]
//! interval = "15min"
//!
//! [storage]
//! root = "warehouse"
//! raw_lock_stale_secs = 3600
//!
//! [mart]
//! row_order = "legacy"         # or "sorted"
//! threads = 4
//! ```
//!
//! Every field has a default, so an empty file is a valid config.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use fxmart_core::data::alphavantage::DEFAULT_BASE_URL;
use fxmart_core::data::{
    AlphaVantageConfig, OutputSize, RawStore, SyntheticConfig, DEFAULT_STALE_LOCK_AGE,
};
use fxmart_core::domain::SamplingInterval;
use fxmart_core::mart::{MartConfig, Parallelism, RowOrder};

/// Environment variable consulted when `source.api_key` is unset.
pub const API_KEY_ENV: &str = "ALPHAVANTAGE_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("no Alpha Vantage API key: set source.api_key or ALPHAVANTAGE_API_KEY")]
    MissingApiKey,
}

/// Which observation source the raw stage pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    AlphaVantage,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub symbols: Vec<String>,
    pub interval: SamplingInterval,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub base_url: String,
    pub output_size: OutputSize,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub retry_base_delay_ms: u64,
    pub breaker_cooldown_secs: u64,
    pub breaker_failure_threshold: u32,
    pub synthetic_start: NaiveDate,
    pub synthetic_days: u32,
    pub synthetic_seed: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        let synthetic = SyntheticConfig::default();
        Self {
            kind: SourceKind::default(),
            symbols: vec!["USD".into(), "EUR".into(), "GBP".into()],
            interval: SamplingInterval::default(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            output_size: OutputSize::default(),
            max_retries: 3,
            request_timeout_secs: 30,
            retry_base_delay_ms: 500,
            breaker_cooldown_secs: 60,
            breaker_failure_threshold: 3,
            synthetic_start: synthetic.start,
            synthetic_days: synthetic.days,
            synthetic_seed: synthetic.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Warehouse root; layers live in `raw/`, `core/` and `mart/` below it.
    pub root: PathBuf,
    /// A raw lock file older than this is left over from a killed run.
    pub raw_lock_stale_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("warehouse"),
            raw_lock_stale_secs: DEFAULT_STALE_LOCK_AGE.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MartSettings {
    pub row_order: RowOrder,
    /// Aggregation threads. Unset runs sequentially; `0` uses every core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub storage: StorageConfig,
    pub mart: MartSettings,
}

impl PipelineConfig {
    /// Load and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let source = &self.source;
        if source.symbols.is_empty() {
            return Err(ConfigError::Invalid("source.symbols is empty".into()));
        }
        let mut seen = HashSet::new();
        for symbol in &source.symbols {
            if symbol.trim().is_empty() {
                return Err(ConfigError::Invalid("source.symbols contains a blank symbol".into()));
            }
            if !seen.insert(symbol.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate symbol '{symbol}'")));
            }
        }
        if source.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("source.request_timeout_secs must be > 0".into()));
        }
        if source.kind == SourceKind::Synthetic && source.synthetic_days == 0 {
            return Err(ConfigError::Invalid("source.synthetic_days must be > 0".into()));
        }
        if self.storage.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.root is empty".into()));
        }
        Ok(())
    }

    /// API key from the file, else from [`API_KEY_ENV`].
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        self.resolve_api_key_with(std::env::var(API_KEY_ENV).ok())
    }

    fn resolve_api_key_with(&self, env_value: Option<String>) -> Result<String, ConfigError> {
        self.source
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or(env_value.filter(|k| !k.trim().is_empty()))
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.storage.root.join("raw")
    }

    pub fn raw_store(&self) -> RawStore {
        RawStore::new(self.raw_dir())
            .with_stale_lock_age(Duration::from_secs(self.storage.raw_lock_stale_secs))
    }

    pub fn core_dir(&self) -> PathBuf {
        self.storage.root.join("core")
    }

    pub fn mart_dir(&self) -> PathBuf {
        self.storage.root.join("mart")
    }

    pub fn mart_config(&self) -> MartConfig {
        MartConfig {
            interval: self.source.interval,
            order: self.mart.row_order,
            parallelism: match self.mart.threads {
                None => Parallelism::Sequential,
                Some(n) => Parallelism::Threads(n),
            },
        }
    }

    pub fn alpha_vantage_config(&self, api_key: String) -> AlphaVantageConfig {
        let source = &self.source;
        AlphaVantageConfig {
            api_key,
            base_url: source.base_url.clone(),
            interval: source.interval,
            output_size: source.output_size,
            max_retries: source.max_retries,
            base_delay: Duration::from_millis(source.retry_base_delay_ms),
            timeout: Duration::from_secs(source.request_timeout_secs),
        }
    }

    pub fn synthetic_config(&self) -> SyntheticConfig {
        SyntheticConfig {
            interval: self.source.interval,
            start: self.source.synthetic_start,
            days: self.source.synthetic_days,
            seed: self.source.synthetic_seed,
        }
    }
}
