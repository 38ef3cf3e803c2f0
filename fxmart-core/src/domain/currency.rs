//! Currency identity in the core layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable integer identifier of a currency in the core layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyId(pub u32);

impl fmt::Display for CurrencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A row of the currency table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    pub id: CurrencyId,
    pub symbol: String,
}

impl Currency {
    pub fn new(id: u32, symbol: impl Into<String>) -> Self {
        Self {
            id: CurrencyId(id),
            symbol: symbol.into(),
        }
    }
}

/// Assign ids to symbols in order of first appearance, starting at 0.
pub fn assign_currency_ids<'a>(symbols: impl IntoIterator<Item = &'a str>) -> Vec<Currency> {
    let mut currencies: Vec<Currency> = Vec::new();
    for symbol in symbols {
        if !currencies.iter().any(|c| c.symbol == symbol) {
            let id = currencies.len() as u32;
            currencies.push(Currency::new(id, symbol));
        }
    }
    currencies
}
