//! Observation — one intraday OHLCV sample for a currency.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::mart::MartError;

/// A numeric field as it arrives at the engine boundary.
///
/// Sources hand over prices either as numbers or as numeric-typed strings
/// (`"1.08420"`); both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Coerce to a finite `f64`. Unparseable text, NaN and infinities yield `None`.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            FieldValue::Number(v) => *v,
            FieldValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    /// Textual form, as stored in the raw layer.
    pub fn to_raw_string(&self) -> String {
        match self {
            FieldValue::Number(v) => v.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// The five OHLCV fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OhlcvField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl OhlcvField {
    pub const ALL: [OhlcvField; 5] = [
        OhlcvField::Open,
        OhlcvField::High,
        OhlcvField::Low,
        OhlcvField::Close,
        OhlcvField::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OhlcvField::Open => "open",
            OhlcvField::High => "high",
            OhlcvField::Low => "low",
            OhlcvField::Close => "close",
            OhlcvField::Volume => "volume",
        }
    }
}

impl fmt::Display for OhlcvField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated observation as handed over by a source or the core layer.
///
/// Any OHLCV field may be absent; validation happens per row in the
/// aggregator so one bad row never poisons a whole day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub open: Option<FieldValue>,
    pub high: Option<FieldValue>,
    pub low: Option<FieldValue>,
    pub close: Option<FieldValue>,
    pub volume: Option<FieldValue>,
}

impl ObservationRecord {
    pub fn field(&self, field: OhlcvField) -> Option<&FieldValue> {
        match field {
            OhlcvField::Open => self.open.as_ref(),
            OhlcvField::High => self.high.as_ref(),
            OhlcvField::Low => self.low.as_ref(),
            OhlcvField::Close => self.close.as_ref(),
            OhlcvField::Volume => self.volume.as_ref(),
        }
    }

    /// Coerced value of one field, `None` if missing or non-numeric.
    pub fn numeric(&self, field: OhlcvField) -> Option<f64> {
        self.field(field).and_then(FieldValue::as_f64)
    }

    /// Validate into an [`Observation`].
    ///
    /// Fails with `MalformedObservation` naming the first missing or
    /// non-numeric field.
    pub fn validate(&self) -> Result<Observation, MartError> {
        let get = |field: OhlcvField| {
            self.numeric(field)
                .ok_or_else(|| MartError::MalformedObservation {
                    symbol: self.symbol.clone(),
                    timestamp: self.timestamp,
                    field,
                })
        };

        Ok(Observation {
            timestamp: self.timestamp,
            symbol: self.symbol.clone(),
            open: get(OhlcvField::Open)?,
            high: get(OhlcvField::High)?,
            low: get(OhlcvField::Low)?,
            close: get(OhlcvField::Close)?,
            volume: get(OhlcvField::Volume)?,
        })
    }
}

impl From<&Observation> for ObservationRecord {
    fn from(obs: &Observation) -> Self {
        Self {
            timestamp: obs.timestamp,
            symbol: obs.symbol.clone(),
            open: Some(FieldValue::Number(obs.open)),
            high: Some(FieldValue::Number(obs.high)),
            low: Some(FieldValue::Number(obs.low)),
            close: Some(FieldValue::Number(obs.close)),
            volume: Some(FieldValue::Number(obs.volume)),
        }
    }
}

/// Validated OHLCV observation, unique per `(timestamp, symbol)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Observation {
    /// Calendar date of the sample, in the source's own timezone.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}
