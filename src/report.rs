//! Aggregate series handed to a rendering layer
//!
//! Every series is keyed and sorted so that a chart can be drawn from it
//! directly, without regrouping the transactions.

use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::frame::{
    f64_values, i64_values, str_values, to_frame, DAY_OF_WEEK, DAY_OF_WEEK_NUM, HOUR,
    PRODUCT_CATEGORY, STORE_LOCATION, TOTAL_AMOUNT, TRANSACTION_DATE,
};
use crate::records::CanonicalRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyedAmount {
    pub key: String,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourlyMean {
    pub hour: u32,
    pub mean_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapCell {
    pub day_of_week: String,
    pub day_of_week_num: u32,
    pub hour: u32,
    pub mean_amount: f64,
}

/// Mean `total_amount` per (day of week, hour).
///
/// Only slots with at least one transaction are present; an empty slot is
/// absent rather than zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SalesHeatmap {
    /// Ordered Monday first, then by hour.
    pub cells: Vec<HeatmapCell>,
}

impl SalesHeatmap {
    pub fn get(&self, day_of_week: &str, hour: u32) -> Option<f64> {
        self.cells
            .iter()
            .find(|cell| cell.day_of_week == day_of_week && cell.hour == hour)
            .map(|cell| cell.mean_amount)
    }
}

/// All series needed to chart a batch of sales.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SalesReport {
    /// Sum per `YYYY-MM-DD` date, oldest first.
    pub daily_sales: Vec<KeyedAmount>,
    /// Mean per hour, ascending.
    pub hourly_mean: Vec<HourlyMean>,
    /// Sum per product category, ascending by name.
    pub category_sales: Vec<KeyedAmount>,
    /// Sum per store location, ascending by name.
    pub store_sales: Vec<KeyedAmount>,
    pub heatmap: SalesHeatmap,
}

pub fn build_report<R: AsRef<CanonicalRecord>>(rows: &[R]) -> crate::Result<SalesReport> {
    if rows.is_empty() {
        return Ok(SalesReport::default());
    }

    let df = to_frame(rows)?;
    let report = SalesReport {
        daily_sales: keyed_sums(&df, TRANSACTION_DATE)?,
        hourly_mean: hourly_means(&df)?,
        category_sales: keyed_sums(&df, PRODUCT_CATEGORY)?,
        store_sales: keyed_sums(&df, STORE_LOCATION)?,
        heatmap: heatmap(&df)?,
    };

    info!(
        days = report.daily_sales.len(),
        heatmap_cells = report.heatmap.cells.len(),
        "Built report series"
    );
    Ok(report)
}

fn keyed_sums(df: &DataFrame, key: &str) -> crate::Result<Vec<KeyedAmount>> {
    let grouped = df
        .clone()
        .lazy()
        .group_by([col(key)])
        .agg([col(TOTAL_AMOUNT).sum()])
        .sort([key], SortMultipleOptions::default())
        .collect()?;

    Ok(str_values(&grouped, key)?
        .into_iter()
        .zip(f64_values(&grouped, TOTAL_AMOUNT)?)
        .map(|(key, total_amount)| KeyedAmount { key, total_amount })
        .collect())
}

fn hourly_means(df: &DataFrame) -> crate::Result<Vec<HourlyMean>> {
    let grouped = df
        .clone()
        .lazy()
        .group_by([col(HOUR)])
        .agg([col(TOTAL_AMOUNT).mean()])
        .sort([HOUR], SortMultipleOptions::default())
        .collect()?;

    Ok(i64_values(&grouped, HOUR)?
        .into_iter()
        .zip(f64_values(&grouped, TOTAL_AMOUNT)?)
        .map(|(hour, mean_amount)| HourlyMean {
            hour: hour as u32,
            mean_amount,
        })
        .collect())
}

fn heatmap(df: &DataFrame) -> crate::Result<SalesHeatmap> {
    let grouped = df
        .clone()
        .lazy()
        .group_by([col(DAY_OF_WEEK_NUM), col(DAY_OF_WEEK), col(HOUR)])
        .agg([col(TOTAL_AMOUNT).mean()])
        .sort([DAY_OF_WEEK_NUM, HOUR], SortMultipleOptions::default())
        .collect()?;

    let day_nums = i64_values(&grouped, DAY_OF_WEEK_NUM)?;
    let days = str_values(&grouped, DAY_OF_WEEK)?;
    let hours = i64_values(&grouped, HOUR)?;
    let means = f64_values(&grouped, TOTAL_AMOUNT)?;

    let cells = (0..grouped.height())
        .map(|i| HeatmapCell {
            day_of_week: days[i].clone(),
            day_of_week_num: day_nums[i] as u32,
            hour: hours[i] as u32,
            mean_amount: means[i],
        })
        .collect();

    Ok(SalesHeatmap { cells })
}
