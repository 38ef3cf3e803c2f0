//! FXMart Core — domain types, the mart aggregation engine and its collaborators.
//!
//! - Domain types (observations, currencies, sampling intervals, mart rows)
//! - Mart engine: daily aggregation, snapshot assembly, delta computation
//! - Collaborators: observation sources, raw/core/mart parquet stores,
//!   currency catalog, circuit breaker
//!
//! The mart engine performs no I/O; it reads through [`data::CurrencyCatalog`]
//! and hands tables back to the caller.

pub mod data;
pub mod domain;
pub mod mart;
