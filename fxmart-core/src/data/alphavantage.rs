//! Alpha Vantage intraday source.
//!
//! Calls `TIME_SERIES_INTRADAY` and flattens the `Time Series (<interval>)`
//! object into observation records. Values are kept as the strings the API
//! returns; coercion happens in the core layer.
//!
//! Alpha Vantage reports most failures with HTTP 200 and a sentinel key:
//! - `Error Message` — unknown symbol or bad parameters
//! - `Note` — per-minute throttling
//! - `Information` — daily quota exhausted or key problems

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, FetchResult, ObservationSource};
use crate::domain::{FieldValue, ObservationRecord, SamplingInterval};

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `outputsize` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSize {
    /// Latest 100 samples.
    Compact,
    /// Full available intraday history.
    #[default]
    Full,
}

impl OutputSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSize::Compact => "compact",
            OutputSize::Full => "full",
        }
    }
}

/// Connection settings for [`AlphaVantageSource`].
#[derive(Debug, Clone)]
pub struct AlphaVantageConfig {
    pub api_key: String,
    pub base_url: String,
    pub interval: SamplingInterval,
    pub output_size: OutputSize,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl AlphaVantageConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            interval: SamplingInterval::default(),
            output_size: OutputSize::default(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// One entry of the time series object.
#[derive(Debug, Deserialize)]
struct IntradayEntry {
    #[serde(rename = "1. open")]
    open: Option<FieldValue>,
    #[serde(rename = "2. high")]
    high: Option<FieldValue>,
    #[serde(rename = "3. low")]
    low: Option<FieldValue>,
    #[serde(rename = "4. close")]
    close: Option<FieldValue>,
    #[serde(rename = "5. volume")]
    volume: Option<FieldValue>,
}

pub struct AlphaVantageSource {
    client: reqwest::blocking::Client,
    config: AlphaVantageConfig,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl AlphaVantageSource {
    pub fn new(
        config: AlphaVantageConfig,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            circuit_breaker,
        })
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.config.base_url.trim_end_matches('/'))
    }

    /// Query parameters for one symbol.
    fn query_params(&self, symbol: &str) -> [(&'static str, String); 5] {
        [
            ("function", "TIME_SERIES_INTRADAY".to_string()),
            ("symbol", symbol.to_string()),
            ("interval", self.config.interval.api_label().to_string()),
            ("outputsize", self.config.output_size.as_str().to_string()),
            ("apikey", self.config.api_key.clone()),
        ]
    }

    /// Flatten a decoded response body into records.
    ///
    /// The symbol comes from `Meta Data` when present, else `requested`.
    /// Entries with unparseable timestamps are skipped with a warning.
    pub fn parse_response(
        requested: &str,
        interval: SamplingInterval,
        body: Value,
    ) -> Result<Vec<ObservationRecord>, DataError> {
        let Value::Object(mut root) = body else {
            return Err(DataError::ResponseFormatChanged(
                "response is not a JSON object".into(),
            ));
        };

        if let Some(message) = root.get("Error Message").and_then(Value::as_str) {
            debug!(symbol = requested, message, "provider rejected symbol");
            return Err(DataError::SymbolNotFound {
                symbol: requested.to_string(),
            });
        }
        if root.contains_key("Note") {
            return Err(DataError::RateLimited {
                retry_after_secs: 60,
            });
        }
        if let Some(message) = root.get("Information").and_then(Value::as_str) {
            if message.to_lowercase().contains("rate limit") {
                return Err(DataError::RateLimited {
                    retry_after_secs: 60,
                });
            }
            return Err(DataError::AuthenticationRequired(message.to_string()));
        }

        let symbol = root
            .get("Meta Data")
            .and_then(|meta| meta.get("2. Symbol"))
            .and_then(Value::as_str)
            .unwrap_or(requested)
            .to_string();

        let key = interval.series_key();
        let series = root
            .remove(&key)
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("missing '{key}'")))?;
        let entries: BTreeMap<String, IntradayEntry> = serde_json::from_value(series)
            .map_err(|e| DataError::ResponseFormatChanged(format!("bad '{key}' entry: {e}")))?;

        let mut records = Vec::with_capacity(entries.len());
        for (stamp, entry) in entries {
            let Ok(timestamp) = NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT) else {
                warn!(symbol = %symbol, stamp = %stamp, "skipping entry with invalid timestamp");
                continue;
            };
            records.push(ObservationRecord {
                timestamp,
                symbol: symbol.clone(),
                open: entry.open,
                high: entry.high,
                low: entry.low,
                close: entry.close,
                volume: entry.volume,
            });
        }

        Ok(records)
    }

    /// Execute the request with retry and circuit breaker logic.
    ///
    /// Only transient errors are retried; an authentication failure trips the
    /// breaker for every later symbol.
    fn fetch_with_retry(&self, symbol: &str) -> Result<Vec<ObservationRecord>, DataError> {
        if !self.circuit_breaker.is_allowed() {
            debug!(
                symbol,
                remaining = ?self.circuit_breaker.remaining_cooldown(),
                "circuit breaker open"
            );
            return Err(DataError::CircuitBreakerTripped);
        }

        let url = self.query_url();
        let params = self.query_params(symbol);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.base_delay * 2u32.pow(attempt - 1);
                debug!(symbol, attempt, ?delay, "retrying");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }

            match self.request(&url, &params, symbol) {
                Ok(records) => {
                    self.circuit_breaker.record_success();
                    return Ok(records);
                }
                Err(e) if e.is_transient() => {
                    self.circuit_breaker.record_failure();
                    last_error = Some(e);
                }
                Err(e @ DataError::AuthenticationRequired(_)) => {
                    self.circuit_breaker.trip();
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }

    /// A single request, with HTTP and body failures mapped to `DataError`.
    fn request(
        &self,
        url: &str,
        params: &[(&'static str, String)],
        symbol: &str,
    ) -> Result<Vec<ObservationRecord>, DataError> {
        let resp = self.client.get(url).query(params).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                DataError::NetworkUnreachable(e.to_string())
            } else {
                DataError::Other(format!("request for {symbol} failed: {e}"))
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DataError::AuthenticationRequired(format!(
                "HTTP {status} from Alpha Vantage"
            )));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DataError::RateLimited {
                retry_after_secs: 60,
            });
        }
        if status.is_server_error() {
            return Err(DataError::NetworkUnreachable(format!("HTTP {status} for {symbol}")));
        }
        if !status.is_success() {
            return Err(DataError::Other(format!("HTTP {status} for {symbol}")));
        }

        let body: Value = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to decode response for {symbol}: {e}"))
        })?;
        Self::parse_response(symbol, self.config.interval, body)
    }
}

impl ObservationSource for AlphaVantageSource {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    fn fetch(&self, symbol: &str) -> Result<FetchResult, DataError> {
        let records = self.fetch_with_retry(symbol)?;
        Ok(FetchResult {
            symbol: symbol.to_string(),
            records,
        })
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_body() -> Value {
        json!({
            "Meta Data": {
                "1. Information": "Intraday (15min) open, high, low, close prices and volume",
                "2. Symbol": "EUR",
                "4. Interval": "15min"
            },
            "Time Series (15min)": {
                "2024-03-01 09:15:00": {
                    "1. open": "1.0810", "2. high": "1.0830", "3. low": "1.0800",
                    "4. close": "1.0825", "5. volume": "1200"
                },
                "2024-03-01 09:00:00": {
                    "1. open": "1.0800", "2. high": "1.0815", "3. low": "1.0795",
                    "4. close": "1.0810", "5. volume": "900"
                }
            }
        })
    }

    #[test]
    fn parses_time_series_entries() {
        let records =
            AlphaVantageSource::parse_response("EUR", SamplingInterval::FifteenMinutes, sample_body())
                .unwrap();
        assert_eq!(records.len(), 2);
        // BTreeMap keys iterate chronologically
        assert_eq!(records[0].timestamp.to_string(), "2024-03-01 09:00:00");
        assert_eq!(records[0].symbol, "EUR");
        assert_eq!(records[1].volume, Some(FieldValue::from("1200")));
    }

    #[test]
    fn missing_series_for_interval_is_format_change() {
        let err =
            AlphaVantageSource::parse_response("EUR", SamplingInterval::FiveMinutes, sample_body())
                .unwrap_err();
        assert!(matches!(err, DataError::ResponseFormatChanged(_)));
    }

    #[test]
    fn sentinel_keys_map_to_errors() {
        let interval = SamplingInterval::FifteenMinutes;
        let not_found = json!({"Error Message": "Invalid API call."});
        assert!(matches!(
            AlphaVantageSource::parse_response("XXX", interval, not_found),
            Err(DataError::SymbolNotFound { .. })
        ));

        let throttled = json!({"Note": "Thank you for using Alpha Vantage! ..."});
        assert!(matches!(
            AlphaVantageSource::parse_response("EUR", interval, throttled),
            Err(DataError::RateLimited { .. })
        ));

        let quota = json!({"Information": "Our standard API rate limit is 25 requests per day."});
        assert!(matches!(
            AlphaVantageSource::parse_response("EUR", interval, quota),
            Err(DataError::RateLimited { .. })
        ));

        let bad_key = json!({"Information": "The **demo** API key is for demo purposes only."});
        assert!(matches!(
            AlphaVantageSource::parse_response("EUR", interval, bad_key),
            Err(DataError::AuthenticationRequired(_))
        ));
    }

    #[test]
    fn bad_timestamps_are_skipped() {
        let body = json!({
            "Time Series (15min)": {
                "yesterday": {"1. open": "1"},
                "2024-03-01 09:00:00": {"1. open": "1", "5. volume": "5"}
            }
        });
        let records =
            AlphaVantageSource::parse_response("USD", SamplingInterval::FifteenMinutes, body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "USD");
        assert_eq!(records[0].close, None);
    }

    #[test]
    fn query_carries_interval_and_output_size() {
        let mut config = AlphaVantageConfig::new("secret");
        config.interval = SamplingInterval::SixtyMinutes;
        config.base_url = "http://localhost:9/".into();
        let source =
            AlphaVantageSource::new(config, Arc::new(CircuitBreaker::new(Duration::from_secs(60), 3))).unwrap();

        assert_eq!(source.query_url(), "http://localhost:9/query");
        let params = source.query_params("GBP");
        assert!(params.contains(&("interval", "60min".to_string())));
        assert!(params.contains(&("outputsize", "full".to_string())));
        assert!(params.contains(&("symbol", "GBP".to_string())));
    }

    #[test]
    fn open_breaker_refuses_fetch() {
        let breaker = Arc::new(CircuitBreaker::new(Duration::from_secs(60), 3));
        breaker.trip();
        let source = AlphaVantageSource::new(AlphaVantageConfig::new("k"), breaker).unwrap();
        assert!(!source.is_available());
        assert!(matches!(source.fetch("EUR"), Err(DataError::CircuitBreakerTripped)));
    }

    #[test]
    fn unreachable_host_is_retried_until_the_breaker_opens() {
        let mut config = AlphaVantageConfig::new("demo");
        config.base_url = "http://127.0.0.1:1".into();
        config.max_retries = 2;
        config.base_delay = Duration::from_millis(1);
        config.timeout = Duration::from_secs(2);
        let breaker = Arc::new(CircuitBreaker::new(Duration::from_secs(60), 3));
        let source = AlphaVantageSource::new(config, Arc::clone(&breaker)).unwrap();

        let err = source.fetch("EUR").unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err}");
        assert!(!source.is_available());
        assert!(matches!(source.fetch("USD"), Err(DataError::CircuitBreakerTripped)));
    }
}
