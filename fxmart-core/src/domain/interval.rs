//! Sampling interval of the intraday source.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity of the intraday series. Extremum windows span exactly one
/// interval, so this is threaded through configuration rather than fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SamplingInterval {
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[default]
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "60min")]
    SixtyMinutes,
}

impl SamplingInterval {
    pub fn minutes(&self) -> i64 {
        match self {
            SamplingInterval::OneMinute => 1,
            SamplingInterval::FiveMinutes => 5,
            SamplingInterval::FifteenMinutes => 15,
            SamplingInterval::ThirtyMinutes => 30,
            SamplingInterval::SixtyMinutes => 60,
        }
    }

    pub fn duration(&self) -> TimeDelta {
        TimeDelta::minutes(self.minutes())
    }

    /// Value of the `interval` query parameter, e.g. `15min`.
    pub fn api_label(&self) -> &'static str {
        match self {
            SamplingInterval::OneMinute => "1min",
            SamplingInterval::FiveMinutes => "5min",
            SamplingInterval::FifteenMinutes => "15min",
            SamplingInterval::ThirtyMinutes => "30min",
            SamplingInterval::SixtyMinutes => "60min",
        }
    }

    /// JSON key holding the series, e.g. `Time Series (15min)`.
    pub fn series_key(&self) -> String {
        format!("Time Series ({})", self.api_label())
    }
}

impl fmt::Display for SamplingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_label())
    }
}

impl FromStr for SamplingInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1min" => Ok(SamplingInterval::OneMinute),
            "5min" => Ok(SamplingInterval::FiveMinutes),
            "15min" => Ok(SamplingInterval::FifteenMinutes),
            "30min" => Ok(SamplingInterval::ThirtyMinutes),
            "60min" => Ok(SamplingInterval::SixtyMinutes),
            other => Err(format!(
                "unknown interval '{other}'. Valid: 1min, 5min, 15min, 30min, 60min"
            )),
        }
    }
}
