//! Feature engineering passes over canonical records
//!
//! Each pass takes a slice of [`EnrichedRecord`] and returns a new vector with
//! one more feature group filled in. Group rollups are built in a single pass
//! into a key -> aggregate map and then broadcast back onto every row by key
//! lookup.

use std::collections::HashMap;
use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::error::AnalysisError;
use crate::records::{CanonicalRecord, EnrichedRecord, SalesFeatures, StoreFeatures, TimeFeatures};

/// Sum and row count of one group.
#[derive(Debug, Default, Clone, Copy)]
struct Rollup {
    amount: f64,
    count: usize,
}

impl Rollup {
    fn add(&mut self, amount: f64) {
        self.amount += amount;
        self.count += 1;
    }
}

/// Cyclical hour encoding (period 24) and weekend flag.
pub fn add_time_features(rows: &[EnrichedRecord]) -> Vec<EnrichedRecord> {
    rows.iter()
        .map(|row| {
            let record = &row.canonical;
            let angle = 2.0 * PI * record.hour as f64 / 24.0;
            let day_of_week_num = record.datetime.weekday().num_days_from_monday();

            EnrichedRecord {
                time: Some(TimeFeatures {
                    hour_sin: angle.sin(),
                    hour_cos: angle.cos(),
                    day_of_week_num,
                    is_weekend: u8::from(day_of_week_num >= 5),
                }),
                ..row.clone()
            }
        })
        .collect()
}

/// Per-date sales rollups, per-row average item value and product popularity.
///
/// Fails with an arithmetic error if any row has a zero quantity.
pub fn add_sales_features(rows: &[EnrichedRecord]) -> crate::Result<Vec<EnrichedRecord>> {
    let mut daily: HashMap<NaiveDate, Rollup> = HashMap::new();
    let mut popularity: HashMap<&str, i64> = HashMap::new();

    for row in rows {
        let record = &row.canonical;
        daily
            .entry(record.transaction_date)
            .or_default()
            .add(record.total_amount);
        *popularity.entry(record.product_id.as_str()).or_default() += record.transaction_qty;
    }
    debug!(dates = daily.len(), products = popularity.len(), "Built sales rollups");

    rows.iter()
        .map(|row| -> crate::Result<EnrichedRecord> {
            let record = &row.canonical;
            let day = daily[&record.transaction_date];

            Ok(EnrichedRecord {
                sales: Some(SalesFeatures {
                    daily_sales: day.amount,
                    daily_transactions: day.count,
                    avg_transaction_value: avg_item_value(record)?,
                    product_popularity: popularity[record.product_id.as_str()],
                }),
                ..row.clone()
            })
        })
        .collect()
}

fn avg_item_value(record: &CanonicalRecord) -> crate::Result<f64> {
    if record.transaction_qty == 0 {
        return Err(AnalysisError::zero_denominator(format!(
            "avg_transaction_value of transaction {}",
            record.transaction_id
        )));
    }
    Ok(record.total_amount / record.transaction_qty as f64)
}

/// Rollups keyed by (store, date) and (store, category).
pub fn add_store_features(rows: &[EnrichedRecord]) -> Vec<EnrichedRecord> {
    let mut store_daily: HashMap<(&str, NaiveDate), Rollup> = HashMap::new();
    let mut product_mix: HashMap<(&str, &str), i64> = HashMap::new();

    for row in rows {
        let record = &row.canonical;
        store_daily
            .entry((record.store_id.as_str(), record.transaction_date))
            .or_default()
            .add(record.total_amount);
        *product_mix
            .entry((record.store_id.as_str(), record.product_category.as_str()))
            .or_default() += record.transaction_qty;
    }
    debug!(
        store_days = store_daily.len(),
        store_categories = product_mix.len(),
        "Built store rollups"
    );

    rows.iter()
        .map(|row| {
            let record = &row.canonical;
            let day = store_daily[&(record.store_id.as_str(), record.transaction_date)];

            EnrichedRecord {
                store: Some(StoreFeatures {
                    store_daily_sales: day.amount,
                    store_daily_transactions: day.count,
                    store_product_mix: product_mix
                        [&(record.store_id.as_str(), record.product_category.as_str())],
                }),
                ..row.clone()
            }
        })
        .collect()
}

/// Run the time, sales and store passes in order.
pub fn engineer_features(rows: &[CanonicalRecord]) -> crate::Result<Vec<EnrichedRecord>> {
    let base: Vec<EnrichedRecord> = rows.iter().cloned().map(EnrichedRecord::from).collect();
    let with_time = add_time_features(&base);
    let with_sales = add_sales_features(&with_time)?;
    Ok(add_store_features(&with_sales))
}
