//! Mart rows: per-day summaries and day-over-day deltas.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::interval::SamplingInterval;

const WINDOW_TIME_FORMAT: &str = "%H:%M:%S";

/// Wall-clock window `[end - interval, end]`, rendered `HH:MM:SS - HH:MM:SS`.
///
/// The start wraps past midnight when `end` falls within the first interval
/// of the day (`23:45:00 - 00:00:00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Window of one sampling interval ending at `end`.
    pub fn ending_at(end: NaiveDateTime, interval: SamplingInterval) -> Self {
        Self {
            start: (end - interval.duration()).time(),
            end: end.time(),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format(WINDOW_TIME_FORMAT),
            self.end.format(WINDOW_TIME_FORMAT)
        )
    }
}

impl FromStr for TimeWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once(" - ")
            .ok_or_else(|| format!("invalid time window '{s}'"))?;
        let parse = |t: &str| {
            NaiveTime::parse_from_str(t.trim(), WINDOW_TIME_FORMAT)
                .map_err(|e| format!("invalid time '{t}' in window '{s}': {e}"))
        };
        Ok(Self {
            start: parse(start)?,
            end: parse(end)?,
        })
    }
}

impl TryFrom<String> for TimeWindow {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeWindow> for String {
    fn from(window: TimeWindow) -> Self {
        window.to_string()
    }
}

/// One row of the full mart: a currency's trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub currency_symbol: String,
    pub total_volume: f64,
    pub open_price: f64,
    pub close_price: f64,
    /// `close / open * 100 - 100`.
    pub percent_change: f64,
    pub peak_volume_window: TimeWindow,
    pub peak_price_window: TimeWindow,
    pub trough_price_window: TimeWindow,
}

/// One row of the delta mart: latest day minus the day before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaSummary {
    /// `"{older} - {newer}"`, ISO dates.
    pub date_range_label: String,
    pub currency_symbol: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub volume_delta: f64,
    pub open_price_delta: f64,
    pub close_price_delta: f64,
    pub percent_change_delta: f64,
}

impl DeltaSummary {
    pub fn date_range_label(older: NaiveDate, newer: NaiveDate) -> String {
        format!("{older} - {newer}")
    }
}
