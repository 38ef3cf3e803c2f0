//! Worked mart scenarios, end to end through an in-memory catalog.

use chrono::{NaiveDate, NaiveDateTime};
use fxmart_core::data::InMemoryCatalog;
use fxmart_core::domain::{FieldValue, ObservationRecord, OhlcvField, SamplingInterval};
use fxmart_core::mart::{build_marts, MartConfig, MartError, Parallelism, RowOrder};

fn ts(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn row(symbol: &str, at: NaiveDateTime, ohlc: [f64; 4], volume: f64) -> ObservationRecord {
    ObservationRecord {
        timestamp: at,
        symbol: symbol.into(),
        open: Some(FieldValue::Number(ohlc[0])),
        high: Some(FieldValue::Number(ohlc[1])),
        low: Some(FieldValue::Number(ohlc[2])),
        close: Some(FieldValue::Number(ohlc[3])),
        volume: Some(FieldValue::Number(volume)),
    }
}

/// USD on one day: 09:00/09:15/09:30 with volumes 100/500/200.
fn usd_day() -> Vec<ObservationRecord> {
    vec![
        row("USD", ts(1, 9, 30), [1.02, 1.04, 1.01, 1.03], 200.0),
        row("USD", ts(1, 9, 0), [1.0, 1.01, 0.99, 1.005], 100.0),
        row("USD", ts(1, 9, 15), [1.005, 1.03, 1.0, 1.02], 500.0),
    ]
}

/// EUR over two days, totals 1000 then 1200.
fn eur_days() -> Vec<ObservationRecord> {
    vec![
        row("EUR", ts(1, 10, 0), [1.08, 1.09, 1.07, 1.085], 400.0),
        row("EUR", ts(1, 10, 15), [1.085, 1.09, 1.08, 1.088], 600.0),
        row("EUR", ts(2, 10, 0), [1.088, 1.1, 1.08, 1.09], 700.0),
        row("EUR", ts(2, 10, 15), [1.09, 1.095, 1.085, 1.092], 500.0),
    ]
}

#[test]
fn usd_day_summary() {
    let catalog = InMemoryCatalog::from_records(usd_day());
    let tables = build_marts(&catalog, &MartConfig::default()).unwrap();

    assert_eq!(tables.full.len(), 1);
    let s = &tables.full[0];
    assert_eq!(s.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    assert_eq!(s.total_volume, 800.0);
    assert_eq!(s.open_price, 1.0);
    assert_eq!(s.close_price, 1.03);
    assert!((s.percent_change - 3.0).abs() < 1e-9);
    assert_eq!(s.peak_volume_window.to_string(), "09:00:00 - 09:15:00");
    assert_eq!(s.peak_price_window.to_string(), "09:15:00 - 09:30:00");
    assert_eq!(s.trough_price_window.to_string(), "08:45:00 - 09:00:00");

    // one day of history: no delta
    assert!(tables.delta.is_empty());
}

#[test]
fn eur_volume_delta() {
    let catalog = InMemoryCatalog::from_records(eur_days());
    let tables = build_marts(&catalog, &MartConfig::default()).unwrap();

    assert_eq!(tables.full.len(), 2);
    assert_eq!(tables.full[0].total_volume, 1000.0);
    assert_eq!(tables.full[1].total_volume, 1200.0);

    assert_eq!(tables.delta.len(), 1);
    let d = &tables.delta[0];
    assert_eq!(d.date_range_label, "2024-03-01 - 2024-03-02");
    assert_eq!(d.volume_delta, 200.0);
    assert_eq!(d.close_price_delta, 1.092 - 1.088);
    assert_eq!(d.open_price_delta, 1.088 - 1.08);
}

#[test]
fn legacy_order_puts_last_catalog_currency_first() {
    // catalog order: EUR (id 0), USD (id 1)
    let mut records = eur_days();
    records.extend(usd_day());
    records.push(row("USD", ts(2, 9, 0), [1.03, 1.03, 1.03, 1.03], 1.0));
    let catalog = InMemoryCatalog::from_records(records);

    let tables = build_marts(&catalog, &MartConfig::default()).unwrap();
    let layout: Vec<(String, u32)> = tables
        .full
        .iter()
        .map(|s| (s.currency_symbol.clone(), chrono::Datelike::day(&s.date)))
        .collect();
    assert_eq!(
        layout,
        vec![
            ("USD".to_string(), 1),
            ("USD".to_string(), 2),
            ("EUR".to_string(), 1),
            ("EUR".to_string(), 2),
        ]
    );

    let delta_symbols: Vec<&str> = tables.delta.iter().map(|d| d.currency_symbol.as_str()).collect();
    assert_eq!(delta_symbols, vec!["USD", "EUR"]);
}

#[test]
fn sorted_order_is_symbol_then_date() {
    let mut records = usd_day();
    records.extend(eur_days());
    let catalog = InMemoryCatalog::from_records(records);
    let config = MartConfig {
        order: RowOrder::Sorted,
        ..MartConfig::default()
    };

    let tables = build_marts(&catalog, &config).unwrap();
    let symbols: Vec<&str> = tables.full.iter().map(|s| s.currency_symbol.as_str()).collect();
    assert_eq!(symbols, vec!["EUR", "EUR", "USD"]);
}

#[test]
fn parallel_build_matches_sequential() {
    let mut records = usd_day();
    records.extend(eur_days());
    for (i, symbol) in ["GBP", "JPY", "CHF", "AUD"].iter().enumerate() {
        for day in 1..=3 {
            records.push(row(symbol, ts(day, 12, 0), [1.0, 1.1, 0.9, 1.0 + i as f64 * 0.01], 10.0));
        }
    }
    let catalog = InMemoryCatalog::from_records(records);

    let sequential = build_marts(&catalog, &MartConfig::default()).unwrap();
    let parallel = build_marts(
        &catalog,
        &MartConfig {
            parallelism: Parallelism::Threads(3),
            ..MartConfig::default()
        },
    )
    .unwrap();

    assert_eq!(sequential.full, parallel.full);
    assert_eq!(sequential.delta, parallel.delta);
}

#[test]
fn malformed_rows_are_skipped_and_reported() {
    let mut records = usd_day();
    let mut bad = row("USD", ts(1, 9, 45), [1.0, 1.0, 1.0, 1.0], 0.0);
    bad.volume = Some(FieldValue::from("n/a"));
    records.push(bad);
    let mut missing = row("USD", ts(1, 10, 0), [1.0, 1.0, 1.0, 1.0], 0.0);
    missing.open = None;
    records.push(missing);

    let catalog = InMemoryCatalog::from_records(records);
    let tables = build_marts(&catalog, &MartConfig::default()).unwrap();

    assert_eq!(tables.full[0].total_volume, 800.0);
    assert_eq!(tables.full[0].close_price, 1.03);
    assert_eq!(tables.rejected.len(), 2);
    assert!(matches!(
        tables.rejected[0],
        MartError::MalformedObservation { field: OhlcvField::Volume, .. }
    ));
    assert!(matches!(
        tables.rejected[1],
        MartError::MalformedObservation { field: OhlcvField::Open, .. }
    ));
}

#[test]
fn numeric_strings_aggregate_like_numbers() {
    let text: Vec<ObservationRecord> = usd_day()
        .into_iter()
        .map(|mut r| {
            r.volume = r.volume.map(|v| FieldValue::Text(v.to_raw_string()));
            r.close = r.close.map(|v| FieldValue::Text(v.to_raw_string()));
            r
        })
        .collect();

    let numbers = build_marts(&InMemoryCatalog::from_records(usd_day()), &MartConfig::default()).unwrap();
    let strings = build_marts(&InMemoryCatalog::from_records(text), &MartConfig::default()).unwrap();
    assert_eq!(numbers.full, strings.full);
}

#[test]
fn hourly_interval_widens_windows() {
    let catalog = InMemoryCatalog::from_records(usd_day());
    let config = MartConfig {
        interval: SamplingInterval::SixtyMinutes,
        ..MartConfig::default()
    };
    let tables = build_marts(&catalog, &config).unwrap();
    assert_eq!(tables.full[0].peak_volume_window.to_string(), "08:15:00 - 09:15:00");
}

#[test]
fn empty_catalog_builds_empty_marts() {
    let tables = build_marts(&InMemoryCatalog::default(), &MartConfig::default()).unwrap();
    assert!(tables.full.is_empty());
    assert!(tables.delta.is_empty());
    assert!(tables.rejected.is_empty());
}
