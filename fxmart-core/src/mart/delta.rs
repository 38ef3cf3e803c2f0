//! Delta Computer — day-over-day differences per currency.

use tracing::debug;

use super::RowOrder;
use crate::domain::{Currency, DailySummary, DeltaSummary};

#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaComputer {
    order: RowOrder,
}

impl DeltaComputer {
    pub fn new(order: RowOrder) -> Self {
        Self { order }
    }

    /// One delta per currency with at least two days in `full`.
    ///
    /// Currencies with less history are skipped. `Legacy` order emits the
    /// catalog in reverse (head insertion again); `Sorted` orders by symbol.
    pub fn compute(&self, full: &[DailySummary], currencies: &[Currency]) -> Vec<DeltaSummary> {
        let mut deltas: Vec<DeltaSummary> = currencies
            .iter()
            .filter_map(|currency| match latest_two(full, &currency.symbol) {
                Some((previous, latest)) => Some(delta_between(previous, latest)),
                None => {
                    debug!(symbol = %currency.symbol, "fewer than two days, no delta");
                    None
                }
            })
            .collect();

        match self.order {
            RowOrder::Legacy => deltas.reverse(),
            RowOrder::Sorted => deltas.sort_by(|a, b| a.currency_symbol.cmp(&b.currency_symbol)),
        }
        deltas
    }
}

/// The two most recent summaries for `symbol`, as `(previous, latest)`.
///
/// Sorted explicitly by date; the order of `full` does not matter.
pub fn latest_two<'a>(
    full: &'a [DailySummary],
    symbol: &str,
) -> Option<(&'a DailySummary, &'a DailySummary)> {
    let mut rows: Vec<&DailySummary> = full
        .iter()
        .filter(|s| s.currency_symbol == symbol)
        .collect();
    rows.sort_by(|a, b| b.date.cmp(&a.date));

    match rows.as_slice() {
        [latest, previous, ..] => Some((*previous, *latest)),
        _ => None,
    }
}

/// `latest − previous` for every numeric column.
pub fn delta_between(previous: &DailySummary, latest: &DailySummary) -> DeltaSummary {
    DeltaSummary {
        date_range_label: DeltaSummary::date_range_label(previous.date, latest.date),
        currency_symbol: latest.currency_symbol.clone(),
        from_date: previous.date,
        to_date: latest.date,
        volume_delta: latest.total_volume - previous.total_volume,
        open_price_delta: latest.open_price - previous.open_price,
        close_price_delta: latest.close_price - previous.close_price,
        percent_change_delta: latest.percent_change - previous.percent_change,
    }
}
