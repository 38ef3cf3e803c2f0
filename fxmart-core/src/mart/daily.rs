//! Daily Aggregator — one summary per calendar day for a single currency.
//!
//! Observations are partitioned by the date component of their timestamp (no
//! timezone conversion), sorted ascending inside each day, and reduced to:
//! - open of the first sample, close of the last sample;
//! - floating-point sum of volume;
//! - percent change `close / open * 100 - 100`;
//! - the interval-long windows ending at the max-volume, max-high and
//!   min-low samples. Ties go to the earliest sample.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::warn;

use super::MartError;
use crate::domain::{
    DailySummary, Observation, ObservationRecord, SamplingInterval, TimeWindow,
};

/// Result of aggregating one currency: the summaries plus every row that was
/// skipped as malformed.
#[derive(Debug, Default)]
pub struct DailyAggregation {
    pub summaries: Vec<DailySummary>,
    pub rejected: Vec<MartError>,
}

/// Stateless per-currency aggregator, parameterized by sampling interval.
#[derive(Debug, Clone, Copy)]
pub struct DailyAggregator {
    interval: SamplingInterval,
}

impl DailyAggregator {
    pub fn new(interval: SamplingInterval) -> Self {
        Self { interval }
    }

    /// Validate records row by row, then aggregate the valid ones.
    ///
    /// A malformed row is logged and skipped; the rest of its day is still
    /// summarized.
    pub fn aggregate_records(&self, symbol: &str, records: &[ObservationRecord]) -> DailyAggregation {
        let mut observations = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();

        for record in records {
            match record.validate() {
                Ok(obs) => observations.push(obs),
                Err(e) => {
                    warn!(symbol, error = %e, "skipping malformed observation");
                    rejected.push(e);
                }
            }
        }

        DailyAggregation {
            summaries: self.aggregate(symbol, &observations),
            rejected,
        }
    }

    /// Summarize validated observations, one summary per date, dates ascending.
    ///
    /// Input order is irrelevant except for breaking exact timestamp ties,
    /// where the earlier input row wins.
    pub fn aggregate(&self, symbol: &str, observations: &[Observation]) -> Vec<DailySummary> {
        let mut by_date: BTreeMap<NaiveDate, Vec<&Observation>> = BTreeMap::new();
        for obs in observations {
            by_date.entry(obs.date()).or_default().push(obs);
        }

        by_date
            .into_iter()
            .filter_map(|(date, mut day)| {
                // stable: equal timestamps keep input order
                day.sort_by_key(|o| o.timestamp);
                self.summarize_day(symbol, date, &day)
            })
            .collect()
    }

    fn summarize_day(
        &self,
        symbol: &str,
        date: NaiveDate,
        day: &[&Observation],
    ) -> Option<DailySummary> {
        let first = day.first()?;
        let last = day.last()?;

        let total_volume: f64 = day.iter().map(|o| o.volume).sum();
        let open_price = first.open;
        let close_price = last.close;

        let peak_volume = first_extreme(day, |o| o.volume, |a, b| a > b);
        let peak_price = first_extreme(day, |o| o.high, |a, b| a > b);
        let trough_price = first_extreme(day, |o| o.low, |a, b| a < b);

        Some(DailySummary {
            date,
            currency_symbol: symbol.to_string(),
            total_volume,
            open_price,
            close_price,
            percent_change: percent_change(open_price, close_price),
            peak_volume_window: TimeWindow::ending_at(peak_volume.timestamp, self.interval),
            peak_price_window: TimeWindow::ending_at(peak_price.timestamp, self.interval),
            trough_price_window: TimeWindow::ending_at(trough_price.timestamp, self.interval),
        })
    }
}

/// `close / open * 100 - 100`.
pub fn percent_change(open: f64, close: f64) -> f64 {
    close / open * 100.0 - 100.0
}

/// First observation (in slice order) whose key beats every earlier one.
///
/// `day` must be non-empty.
fn first_extreme<'a>(
    day: &[&'a Observation],
    key: impl Fn(&Observation) -> f64,
    beats: impl Fn(f64, f64) -> bool,
) -> &'a Observation {
    let mut best = day[0];
    for &obs in &day[1..] {
        if beats(key(obs), key(best)) {
            best = obs;
        }
    }
    best
}
