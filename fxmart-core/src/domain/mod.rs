//! Domain types: observations, currencies, sampling intervals and mart rows.

pub mod currency;
pub mod interval;
pub mod observation;
pub mod summary;

pub use currency::{assign_currency_ids, Currency, CurrencyId};
pub use interval::SamplingInterval;
pub use observation::{FieldValue, Observation, ObservationRecord, OhlcvField};
pub use summary::{DailySummary, DeltaSummary, TimeWindow};
