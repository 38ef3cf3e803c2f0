//! Snapshot Assembler — the full mart across every catalog currency.
//!
//! Runs the [`DailyAggregator`] once per currency and concatenates the
//! results. Currencies are independent, so aggregation may fan out over a
//! rayon pool; results are always gathered back in catalog order before
//! [`RowOrder`] is applied, so parallel and sequential runs are identical.

use rayon::prelude::*;
use tracing::{debug, info};

use super::daily::{DailyAggregation, DailyAggregator};
use super::{MartError, RowOrder};
use crate::data::catalog::CurrencyCatalog;
use crate::domain::{Currency, DailySummary};

/// How per-currency aggregation is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parallelism {
    #[default]
    Sequential,
    /// Fan out over a dedicated pool of `n` threads; `0` uses rayon's global pool.
    Threads(usize),
}

/// The assembled full mart.
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Catalog currencies in catalog order.
    pub currencies: Vec<Currency>,
    pub rows: Vec<DailySummary>,
    /// Rows skipped as malformed, across all currencies.
    pub rejected: Vec<MartError>,
}

#[derive(Debug, Clone, Copy)]
pub struct SnapshotAssembler {
    aggregator: DailyAggregator,
    order: RowOrder,
    parallelism: Parallelism,
}

impl SnapshotAssembler {
    pub fn new(aggregator: DailyAggregator) -> Self {
        Self {
            aggregator,
            order: RowOrder::default(),
            parallelism: Parallelism::default(),
        }
    }

    pub fn with_order(mut self, order: RowOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Aggregate every currency in the catalog into one table.
    ///
    /// A catalog read failure aborts the assembly; malformed rows do not.
    pub fn assemble(&self, catalog: &dyn CurrencyCatalog) -> Result<Snapshot, MartError> {
        let currencies = catalog.list_currencies()?;
        let aggregations = self.aggregate_all(catalog, &currencies)?;

        let mut rejected = Vec::new();
        let mut per_currency = Vec::with_capacity(aggregations.len());
        for aggregation in aggregations {
            rejected.extend(aggregation.rejected);
            per_currency.push(aggregation.summaries);
        }

        let rows = order_rows(per_currency, self.order);
        info!(
            currencies = currencies.len(),
            rows = rows.len(),
            rejected = rejected.len(),
            order = %self.order,
            "assembled full mart"
        );

        Ok(Snapshot {
            currencies,
            rows,
            rejected,
        })
    }

    fn aggregate_all(
        &self,
        catalog: &dyn CurrencyCatalog,
        currencies: &[Currency],
    ) -> Result<Vec<DailyAggregation>, MartError> {
        let aggregator = self.aggregator;
        let run = |currency: &Currency| -> Result<DailyAggregation, MartError> {
            let records = catalog.fetch_observations(&currency.symbol)?;
            debug!(
                symbol = %currency.symbol,
                observations = records.len(),
                "aggregating currency"
            );
            Ok(aggregator.aggregate_records(&currency.symbol, &records))
        };

        match self.parallelism {
            Parallelism::Sequential => currencies.iter().map(run).collect(),
            Parallelism::Threads(0) => currencies.par_iter().map(run).collect(),
            Parallelism::Threads(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| MartError::ThreadPool(e.to_string()))?;
                pool.install(|| currencies.par_iter().map(run).collect())
            }
        }
    }
}

/// Concatenate per-currency summaries given in catalog order, each with
/// dates ascending, according to `order`.
///
/// `Legacy` keeps the layout of the historical head-insertion job, which
/// walked the catalog in order and each currency's dates newest-first while
/// prepending every row. The result is that sequence reversed: last catalog
/// currency first, dates ascending within each.
pub fn order_rows(per_currency: Vec<Vec<DailySummary>>, order: RowOrder) -> Vec<DailySummary> {
    match order {
        RowOrder::Legacy => per_currency.into_iter().rev().flatten().collect(),
        RowOrder::Sorted => {
            let mut rows: Vec<DailySummary> = per_currency.into_iter().flatten().collect();
            rows.sort_by(|a, b| {
                a.currency_symbol
                    .cmp(&b.currency_symbol)
                    .then(a.date.cmp(&b.date))
            });
            rows
        }
    }
}
