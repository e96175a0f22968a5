//! Sales trend summaries and product/store rankings

use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::AnalysisError;
use crate::frame::{
    f64_values, i64_values, str_values, to_frame, HOUR, MONTH_KEY, PRODUCT_CATEGORY, PRODUCT_TYPE,
    STORE_ID, STORE_LOCATION, TOTAL_AMOUNT, TRANSACTION_DATE, TRANSACTION_ID, TRANSACTION_QTY,
};
use crate::records::CanonicalRecord;

const TRANSACTIONS: &str = "transactions";

/// Scalar overview of a batch of transactions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesTrendSummary {
    pub total_sales: f64,
    pub avg_daily_sales: f64,
    pub peak_sales_hour: u32,
    pub best_performing_category: String,
    /// Keyed by store location.
    pub best_performing_store: String,
    /// Percent change from the first to the last calendar month.
    pub sales_growth: f64,
}

/// Aggregates for one (category, type) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductMetric {
    pub product_category: String,
    pub product_type: String,
    pub transaction_qty: i64,
    pub total_amount: f64,
    pub transactions: usize,
    pub avg_price: f64,
    pub sales_share: f64,
}

/// Aggregates for one (store id, location) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreMetric {
    pub store_id: String,
    pub store_location: String,
    pub transactions: usize,
    pub total_amount: f64,
    pub transaction_qty: i64,
    pub avg_transaction_value: f64,
    pub sales_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySales {
    /// `YYYY-MM`
    pub month: String,
    pub total_amount: f64,
}

/// Group by `keys` and aggregate amount, quantity and row count.
///
/// Rows come back ordered by descending amount, ties broken by ascending keys.
pub(crate) fn grouped_totals(df: &DataFrame, keys: &[&str]) -> crate::Result<DataFrame> {
    let group_by: Vec<Expr> = keys.iter().map(|key| col(*key)).collect();

    let mut sort_by = vec![col(TOTAL_AMOUNT)];
    sort_by.extend(keys.iter().map(|key| col(*key)));
    let mut descending = vec![true];
    descending.extend(keys.iter().map(|_| false));

    let grouped = df
        .clone()
        .lazy()
        .group_by(group_by)
        .agg([
            col(TOTAL_AMOUNT).sum(),
            col(TRANSACTION_QTY).sum(),
            col(TRANSACTION_ID).count().alias(TRANSACTIONS),
        ])
        .sort_by_exprs(
            sort_by,
            SortMultipleOptions::default()
                .with_order_descending_multi(descending)
                .with_maintain_order(true),
        )
        .collect()?;

    debug!(keys = ?keys, groups = grouped.height(), "Aggregated groups");
    Ok(grouped)
}

/// Compute total, average daily and peak metrics plus month-over-month growth.
///
/// Fails with [`AnalysisError::EmptyInput`] on an empty table and with an
/// arithmetic error when growth would divide by a zero first-month total.
pub fn analyze_sales_trends<R: AsRef<CanonicalRecord>>(
    rows: &[R],
) -> crate::Result<SalesTrendSummary> {
    if rows.is_empty() {
        return Err(AnalysisError::EmptyInput("sales trends need at least one transaction"));
    }

    let df = to_frame(rows)?;
    let total_sales: f64 = f64_values(&df, TOTAL_AMOUNT)?.iter().sum();

    let daily = f64_values(&grouped_totals(&df, &[TRANSACTION_DATE])?, TOTAL_AMOUNT)?;
    let avg_daily_sales = daily.iter().sum::<f64>() / daily.len() as f64;

    let peak_sales_hour = first_key(&grouped_totals(&df, &[HOUR])?, HOUR, i64_values)? as u32;
    let best_performing_category = first_key(
        &grouped_totals(&df, &[PRODUCT_CATEGORY])?,
        PRODUCT_CATEGORY,
        str_values,
    )?;
    let best_performing_store = first_key(
        &grouped_totals(&df, &[STORE_LOCATION])?,
        STORE_LOCATION,
        str_values,
    )?;

    let monthly: Vec<f64> = monthly_sales(rows)?.into_iter().map(|m| m.total_amount).collect();
    let sales_growth = growth_rate(&monthly)?;

    let summary = SalesTrendSummary {
        total_sales,
        avg_daily_sales,
        peak_sales_hour,
        best_performing_category,
        best_performing_store,
        sales_growth,
    };
    info!(total_sales, sales_growth, "Analyzed sales trends");
    Ok(summary)
}

fn first_key<T>(
    grouped: &DataFrame,
    key: &str,
    read: fn(&DataFrame, &str) -> crate::Result<Vec<T>>,
) -> crate::Result<T> {
    read(grouped, key)?
        .into_iter()
        .next()
        .ok_or(AnalysisError::EmptyInput("no groups to rank"))
}

/// Sum `total_amount` per calendar month, oldest month first.
pub fn monthly_sales<R: AsRef<CanonicalRecord>>(rows: &[R]) -> crate::Result<Vec<MonthlySales>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let monthly = to_frame(rows)?
        .lazy()
        .group_by([col(MONTH_KEY)])
        .agg([col(TOTAL_AMOUNT).sum()])
        .sort([MONTH_KEY], SortMultipleOptions::default())
        .collect()?;

    let months = str_values(&monthly, MONTH_KEY)?;
    let totals = f64_values(&monthly, TOTAL_AMOUNT)?;
    Ok(months
        .into_iter()
        .zip(totals)
        .map(|(month, total_amount)| MonthlySales { month, total_amount })
        .collect())
}

/// Percent change from the first to the last of a chronological series.
///
/// Zero or one period yields 0.0. A zero first period is an arithmetic error.
pub fn growth_rate(monthly_totals: &[f64]) -> crate::Result<f64> {
    match monthly_totals {
        [] | [_] => Ok(0.0),
        [first, .., last] => {
            if *first == 0.0 {
                return Err(AnalysisError::zero_denominator(
                    "sales_growth (first month total is zero)",
                ));
            }
            Ok((last - first) / first * 100.0)
        }
    }
}

fn shares(amounts: &[f64], context: &str) -> crate::Result<Vec<f64>> {
    let grand_total: f64 = amounts.iter().sum();
    if amounts.is_empty() {
        return Ok(Vec::new());
    }
    if grand_total == 0.0 {
        return Err(AnalysisError::zero_denominator(format!("{} sales_share", context)));
    }
    Ok(amounts.iter().map(|amount| amount / grand_total).collect())
}

/// Rank (category, type) pairs by total amount.
pub fn analyze_product_performance<R: AsRef<CanonicalRecord>>(
    rows: &[R],
) -> crate::Result<Vec<ProductMetric>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let grouped = grouped_totals(&to_frame(rows)?, &[PRODUCT_CATEGORY, PRODUCT_TYPE])?;
    let categories = str_values(&grouped, PRODUCT_CATEGORY)?;
    let types = str_values(&grouped, PRODUCT_TYPE)?;
    let quantities = i64_values(&grouped, TRANSACTION_QTY)?;
    let amounts = f64_values(&grouped, TOTAL_AMOUNT)?;
    let counts = i64_values(&grouped, TRANSACTIONS)?;
    let shares = shares(&amounts, "product")?;

    let mut metrics = Vec::with_capacity(grouped.height());
    for i in 0..grouped.height() {
        if quantities[i] == 0 {
            return Err(AnalysisError::zero_denominator(format!(
                "avg_price of {} / {}",
                categories[i], types[i]
            )));
        }

        metrics.push(ProductMetric {
            product_category: categories[i].clone(),
            product_type: types[i].clone(),
            transaction_qty: quantities[i],
            total_amount: amounts[i],
            transactions: counts[i] as usize,
            avg_price: amounts[i] / quantities[i] as f64,
            sales_share: shares[i],
        });
    }

    info!(products = metrics.len(), "Ranked product performance");
    Ok(metrics)
}

/// Rank (store id, location) pairs by total amount.
pub fn analyze_store_performance<R: AsRef<CanonicalRecord>>(
    rows: &[R],
) -> crate::Result<Vec<StoreMetric>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let grouped = grouped_totals(&to_frame(rows)?, &[STORE_ID, STORE_LOCATION])?;
    let ids = str_values(&grouped, STORE_ID)?;
    let locations = str_values(&grouped, STORE_LOCATION)?;
    let quantities = i64_values(&grouped, TRANSACTION_QTY)?;
    let amounts = f64_values(&grouped, TOTAL_AMOUNT)?;
    let counts = i64_values(&grouped, TRANSACTIONS)?;
    let shares = shares(&amounts, "store")?;

    // every group holds at least one row, so counts are never zero
    let metrics: Vec<StoreMetric> = (0..grouped.height())
        .map(|i| StoreMetric {
            store_id: ids[i].clone(),
            store_location: locations[i].clone(),
            transactions: counts[i] as usize,
            total_amount: amounts[i],
            transaction_qty: quantities[i],
            avg_transaction_value: amounts[i] / counts[i] as f64,
            sales_share: shares[i],
        })
        .collect();

    info!(stores = metrics.len(), "Ranked store performance");
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::preprocess;
    use crate::records::TransactionRecord;

    fn raw(
        id: &str,
        store: &str,
        category: &str,
        kind: &str,
        qty: i64,
        price: f64,
        date: &str,
        time: &str,
    ) -> TransactionRecord {
        TransactionRecord {
            transaction_id: Some(id.to_string()),
            transaction_date: Some(date.to_string()),
            transaction_time: Some(time.to_string()),
            transaction_qty: Some(qty.to_string()),
            unit_price: Some(price.to_string()),
            product_id: Some(format!("{}-{}", category, kind)),
            product_category: Some(category.to_string()),
            product_type: Some(kind.to_string()),
            store_id: Some(store.to_string()),
            store_location: Some(format!("Store {}", store)),
        }
    }

    fn scenario() -> Vec<CanonicalRecord> {
        preprocess(&[
            raw("1", "A", "Coffee", "Drip", 2, 3.0, "2024-01-01", "08:00:00"),
            raw("2", "A", "Tea", "Chai", 1, 4.0, "2024-01-01", "13:00:00"),
            raw("3", "B", "Coffee", "Drip", 3, 3.0, "2024-01-02", "18:00:00"),
            raw("4", "B", "Coffee", "Drip", 1, 3.0, "2024-02-01", "09:00:00"),
        ])
        .unwrap()
    }

    #[test]
    fn test_growth_rate() {
        assert_eq!(growth_rate(&[100.0, 150.0]).unwrap(), 50.0);
        assert_eq!(growth_rate(&[100.0]).unwrap(), 0.0);
        assert_eq!(growth_rate(&[]).unwrap(), 0.0);
        assert_eq!(growth_rate(&[200.0, 1.0, 100.0]).unwrap(), -50.0);
        assert!(matches!(growth_rate(&[0.0, 10.0]), Err(AnalysisError::Arithmetic { .. })));
    }

    #[test]
    fn test_sales_trends_scenario() {
        let summary = analyze_sales_trends(&scenario()).unwrap();

        assert!((summary.total_sales - 22.0).abs() < 1e-9);
        // three distinct dates: 10, 9, 3
        assert!((summary.avg_daily_sales - 22.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.peak_sales_hour, 18);
        assert_eq!(summary.best_performing_category, "Coffee");
        assert_eq!(summary.best_performing_store, "Store B");
        assert!((summary.sales_growth - (3.0 - 19.0) / 19.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_monthly_sales_order() {
        let monthly = monthly_sales(&scenario()).unwrap();
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].month, "2024-01");
        assert_eq!(monthly[0].total_amount, 19.0);
        assert_eq!(monthly[1].month, "2024-02");
        assert_eq!(monthly[1].total_amount, 3.0);
    }

    #[test]
    fn test_ties_break_on_ascending_key() {
        let rows = preprocess(&[
            raw("1", "B", "Tea", "Chai", 1, 5.0, "2024-01-01", "15:00:00"),
            raw("2", "A", "Coffee", "Drip", 1, 5.0, "2024-01-01", "09:00:00"),
        ])
        .unwrap();

        let summary = analyze_sales_trends(&rows).unwrap();
        assert_eq!(summary.peak_sales_hour, 9);
        assert_eq!(summary.best_performing_category, "Coffee");
        assert_eq!(summary.best_performing_store, "Store A");
    }

    #[test]
    fn test_peak_hour_ties_compare_numerically() {
        // "10" sorts before "9" as text; hours rank as numbers
        let rows = preprocess(&[
            raw("1", "A", "Coffee", "Drip", 1, 5.0, "2024-01-01", "10:00:00"),
            raw("2", "A", "Coffee", "Drip", 1, 5.0, "2024-01-01", "09:00:00"),
        ])
        .unwrap();

        assert_eq!(analyze_sales_trends(&rows).unwrap().peak_sales_hour, 9);
    }

    #[test]
    fn test_empty_trends_rejected() {
        let rows: Vec<CanonicalRecord> = Vec::new();
        assert!(matches!(analyze_sales_trends(&rows), Err(AnalysisError::EmptyInput(_))));
        assert!(analyze_product_performance(&rows).unwrap().is_empty());
        assert!(analyze_store_performance(&rows).unwrap().is_empty());
    }

    #[test]
    fn test_product_performance() {
        let products = analyze_product_performance(&scenario()).unwrap();

        assert_eq!(products.len(), 2);
        assert_eq!(products[0].product_category, "Coffee");
        assert_eq!(products[0].transaction_qty, 6);
        assert_eq!(products[0].transactions, 3);
        assert!((products[0].total_amount - 18.0).abs() < 1e-9);
        assert!((products[0].avg_price - 3.0).abs() < 1e-9);
        assert_eq!(products[1].product_category, "Tea");

        let share_sum: f64 = products.iter().map(|p| p.sales_share).sum();
        assert!((share_sum - 1.0).abs() < 1e-9);
        let amount_sum: f64 = products.iter().map(|p| p.total_amount).sum();
        assert!((amount_sum - 22.0).abs() < 1e-9);
    }

    #[test]
    fn test_product_ties_sorted_by_category_then_type() {
        let rows = preprocess(&[
            raw("1", "A", "Tea", "Green", 1, 4.0, "2024-01-01", "08:00:00"),
            raw("2", "A", "Coffee", "Latte", 1, 4.0, "2024-01-01", "08:00:00"),
            raw("3", "A", "Coffee", "Drip", 1, 4.0, "2024-01-01", "08:00:00"),
        ])
        .unwrap();

        let order: Vec<(String, String)> = analyze_product_performance(&rows)
            .unwrap()
            .into_iter()
            .map(|p| (p.product_category, p.product_type))
            .collect();

        assert_eq!(
            order,
            vec![
                ("Coffee".to_string(), "Drip".to_string()),
                ("Coffee".to_string(), "Latte".to_string()),
                ("Tea".to_string(), "Green".to_string()),
            ]
        );
    }

    #[test]
    fn test_store_performance() {
        let stores = analyze_store_performance(&scenario()).unwrap();

        assert_eq!(stores.len(), 2);
        assert_eq!(stores[0].store_id, "B");
        assert!((stores[0].total_amount - 12.0).abs() < 1e-9);
        assert_eq!(stores[0].transactions, 2);
        assert_eq!(stores[0].transaction_qty, 4);
        assert!((stores[0].avg_transaction_value - 6.0).abs() < 1e-9);
        assert_eq!(stores[1].store_id, "A");
        assert!((stores[1].total_amount - 10.0).abs() < 1e-9);

        let share_sum: f64 = stores.iter().map(|s| s.sales_share).sum();
        assert!((share_sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_total_share_is_arithmetic_error() {
        let mut rows = scenario();
        for row in rows.iter_mut() {
            row.total_amount = 0.0;
        }

        assert!(matches!(
            analyze_store_performance(&rows),
            Err(AnalysisError::Arithmetic { .. })
        ));
    }
}
