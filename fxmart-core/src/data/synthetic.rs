//! Deterministic synthetic intraday series for offline runs and tests.
//!
//! Seeded per symbol, so the same configuration always produces the same
//! samples. Values are emitted as strings, the way the HTTP source hands
//! them over.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{DataError, FetchResult, ObservationSource};
use crate::domain::{FieldValue, ObservationRecord, SamplingInterval};

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub interval: SamplingInterval,
    /// First generated calendar day.
    pub start: NaiveDate,
    /// Weekdays to generate; weekends are skipped.
    pub days: u32,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            interval: SamplingInterval::default(),
            start: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap_or_default(),
            days: 5,
            seed: 42,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }

    fn rng_for(&self, symbol: &str) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(symbol.as_bytes());
        hasher.update(&self.config.seed.to_le_bytes());
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }

    /// Generate the full series for one symbol.
    pub fn generate(&self, symbol: &str) -> Vec<ObservationRecord> {
        let mut rng = self.rng_for(symbol);
        let step = self.config.interval.duration();
        let per_day = (24 * 60 / self.config.interval.minutes()) as usize;

        let mut records = Vec::with_capacity(per_day * self.config.days as usize);
        let mut price: f64 = rng.gen_range(0.5..2.0);
        let mut day = self.config.start;
        let mut generated = 0;

        while generated < self.config.days {
            if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
                day = day.succ_opt().unwrap_or(day);
                continue;
            }

            let mut ts = NaiveDateTime::new(day, NaiveTime::default());
            for _ in 0..per_day {
                let ret: f64 = rng.gen_range(-0.002..0.002);
                let open = price;
                let close = price * (1.0 + ret);
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.0005));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.0005));
                let volume = rng.gen_range(0..5_000u32);

                let text = |v: f64| Some(FieldValue::Text(format!("{v:.5}")));
                records.push(ObservationRecord {
                    timestamp: ts,
                    symbol: symbol.to_string(),
                    open: text(open),
                    high: text(high),
                    low: text(low),
                    close: text(close),
                    volume: Some(FieldValue::Text(volume.to_string())),
                });

                price = close;
                ts += step;
            }

            generated += 1;
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }

        records
    }
}

impl ObservationSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, symbol: &str) -> Result<FetchResult, DataError> {
        Ok(FetchResult {
            symbol: symbol.to_string(),
            records: self.generate(symbol),
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}
