//! Property tests for mart engine invariants.
//!
//! Uses proptest to verify:
//! 1. Open/close come from the earliest and latest samples of the day
//! 2. Percent change identity: close = open * (1 + pct / 100)
//! 3. Total volume is permutation-invariant and equals the arithmetic sum
//! 4. Close delta is exactly latest close minus previous close
//! 5. Legacy and sorted orders hold the same rows

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use fxmart_core::domain::{Currency, Observation, SamplingInterval};
use fxmart_core::mart::{delta_between, latest_two, order_rows, DailyAggregator, DeltaComputer, RowOrder};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (0.5..2.0_f64).prop_map(|p| (p * 100_000.0).round() / 100_000.0)
}

/// Whole-number volumes keep floating-point sums exact in any order.
fn arb_volume() -> impl Strategy<Value = f64> {
    (0u32..1_000_000).prop_map(f64::from)
}

fn day_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// One day of 15-minute samples with distinct timestamps, in shuffled order.
fn arb_day() -> impl Strategy<Value = Vec<Observation>> {
    prop::collection::vec((arb_price(), arb_price(), arb_volume()), 1..96)
        .prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (open, close, volume))| Observation {
                    timestamp: day_start() + TimeDelta::minutes(15 * i as i64),
                    symbol: "EUR".into(),
                    open,
                    high: open.max(close),
                    low: open.min(close),
                    close,
                    volume,
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

fn aggregator() -> DailyAggregator {
    DailyAggregator::new(SamplingInterval::FifteenMinutes)
}

// ── 1. Open / close ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn open_and_close_follow_timestamps(day in arb_day()) {
        let summaries = aggregator().aggregate("EUR", &day);
        prop_assert_eq!(summaries.len(), 1);

        let first = day.iter().min_by_key(|o| o.timestamp).unwrap();
        let last = day.iter().max_by_key(|o| o.timestamp).unwrap();
        prop_assert_eq!(summaries[0].open_price, first.open);
        prop_assert_eq!(summaries[0].close_price, last.close);
    }
}

// ── 2. Percent change identity ───────────────────────────────────────

proptest! {
    #[test]
    fn percent_change_reconstructs_close(day in arb_day()) {
        let s = &aggregator().aggregate("EUR", &day)[0];
        let rebuilt = s.open_price * (1.0 + s.percent_change / 100.0);
        prop_assert!((rebuilt - s.close_price).abs() < 1e-9);
    }
}

// ── 3. Volume sum ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn total_volume_ignores_input_order(day in arb_day()) {
        let expected: f64 = day.iter().map(|o| o.volume).sum();

        let mut reversed = day.clone();
        reversed.reverse();

        let a = aggregator().aggregate("EUR", &day);
        let b = aggregator().aggregate("EUR", &reversed);
        prop_assert_eq!(a[0].total_volume, expected);
        prop_assert_eq!(&a, &b);
    }
}

// ── 4. Delta exactness ───────────────────────────────────────────────

proptest! {
    #[test]
    fn close_delta_is_exact(first in arb_day(), second in arb_day(), gap in 1i64..30) {
        let shifted: Vec<Observation> = second
            .into_iter()
            .map(|mut o| {
                o.timestamp += TimeDelta::days(gap);
                o
            })
            .collect();
        let mut all = first;
        all.extend(shifted);

        let full = aggregator().aggregate("EUR", &all);
        prop_assert_eq!(full.len(), 2);

        let (previous, latest) = latest_two(&full, "EUR").unwrap();
        let delta = delta_between(previous, latest);
        prop_assert_eq!(delta.close_price_delta, latest.close_price - previous.close_price);
        prop_assert_eq!(delta.volume_delta, latest.total_volume - previous.total_volume);
        prop_assert_eq!((latest.date - previous.date).num_days(), gap);
    }

    #[test]
    fn single_day_never_yields_delta(day in arb_day()) {
        let full = aggregator().aggregate("EUR", &day);
        let deltas = DeltaComputer::new(RowOrder::Legacy).compute(&full, &[Currency::new(0, "EUR")]);
        prop_assert!(deltas.is_empty());
    }
}

// ── 5. Row order ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn orders_are_permutations_of_each_other(day_a in arb_day(), day_b in arb_day()) {
        let usd: Vec<Observation> = day_b
            .into_iter()
            .map(|mut o| {
                o.symbol = "USD".into();
                o
            })
            .collect();
        let per_currency = vec![
            aggregator().aggregate("USD", &usd),
            aggregator().aggregate("EUR", &day_a),
        ];

        let legacy = order_rows(per_currency.clone(), RowOrder::Legacy);
        let sorted = order_rows(per_currency, RowOrder::Sorted);
        prop_assert_eq!(legacy.len(), sorted.len());
        prop_assert_eq!(&legacy[0].currency_symbol, "EUR");
        prop_assert_eq!(&sorted[0].currency_symbol, "EUR");
        for row in &legacy {
            prop_assert!(sorted.contains(row));
        }
    }
}
