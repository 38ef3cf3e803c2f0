//! Currency catalog — the mart engine's only view of the core layer.

use std::collections::HashMap;

use super::provider::DataError;
use crate::domain::{assign_currency_ids, Currency, CurrencyId, ObservationRecord};

/// Which currencies exist, their ids, and each one's observation history.
///
/// Physical layout is the implementation's business; the persisted core layer
/// keeps one observation table keyed by currency id.
pub trait CurrencyCatalog: Send + Sync {
    /// All currencies, in catalog (id) order.
    fn list_currencies(&self) -> Result<Vec<Currency>, DataError>;

    fn id_for(&self, symbol: &str) -> Result<Option<CurrencyId>, DataError>;

    /// Full observation history of one currency. Unknown symbols yield an
    /// empty history.
    fn fetch_observations(&self, symbol: &str) -> Result<Vec<ObservationRecord>, DataError>;
}

/// Catalog held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    currencies: Vec<Currency>,
    observations: HashMap<String, Vec<ObservationRecord>>,
}

impl InMemoryCatalog {
    /// Build from a flat record list; ids follow first appearance.
    pub fn from_records(records: Vec<ObservationRecord>) -> Self {
        let currencies = assign_currency_ids(records.iter().map(|r| r.symbol.as_str()));
        let mut observations: HashMap<String, Vec<ObservationRecord>> = HashMap::new();
        for record in records {
            observations
                .entry(record.symbol.clone())
                .or_default()
                .push(record);
        }
        Self {
            currencies,
            observations,
        }
    }

    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }
}

impl CurrencyCatalog for InMemoryCatalog {
    fn list_currencies(&self) -> Result<Vec<Currency>, DataError> {
        Ok(self.currencies.clone())
    }

    fn id_for(&self, symbol: &str) -> Result<Option<CurrencyId>, DataError> {
        Ok(self
            .currencies
            .iter()
            .find(|c| c.symbol == symbol)
            .map(|c| c.id))
    }

    fn fetch_observations(&self, symbol: &str) -> Result<Vec<ObservationRecord>, DataError> {
        Ok(self.observations.get(symbol).cloned().unwrap_or_default())
    }
}
