//! Raw row normalization and data-quality diagnostics

use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::AnalysisError;
use crate::records::{CanonicalRecord, TimePeriod, TransactionRecord};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

/// Non-fatal findings surfaced by [`check_quality`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DataQualityWarning {
    MissingValues { field: String, count: usize },
    DuplicateRows(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Summary statistics describing the shape and cleanliness of a raw table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub total_rows: usize,
    /// Null count per raw field, keyed by field name.
    pub missing_values: BTreeMap<String, usize>,
    pub duplicates: usize,
    pub unique_stores: usize,
    pub unique_products: usize,
    /// `None` when no row carries a parseable date and time.
    pub date_range: Option<DateRange>,
}

impl QualityReport {
    pub fn warnings(&self) -> Vec<DataQualityWarning> {
        let mut warnings: Vec<DataQualityWarning> = self
            .missing_values
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(field, &count)| DataQualityWarning::MissingValues {
                field: field.clone(),
                count,
            })
            .collect();

        if self.duplicates > 0 {
            warnings.push(DataQualityWarning::DuplicateRows(self.duplicates));
        }

        warnings
    }

    pub fn is_clean(&self) -> bool {
        self.warnings().is_empty()
    }
}

/// Normalize raw rows into canonical records with derived temporal and
/// monetary fields.
///
/// Fails on the first row with a missing or malformed required field. The
/// input slice is left untouched.
pub fn preprocess(rows: &[TransactionRecord]) -> crate::Result<Vec<CanonicalRecord>> {
    let canonical = rows
        .iter()
        .enumerate()
        .map(|(idx, row)| canonicalize(idx, row))
        .collect::<crate::Result<Vec<_>>>()?;

    info!(rows = canonical.len(), "Preprocessed transaction rows");
    Ok(canonical)
}

fn canonicalize(row: usize, raw: &TransactionRecord) -> crate::Result<CanonicalRecord> {
    let transaction_id = required_text(row, "transaction_id", &raw.transaction_id)?;
    let date_text = required_text(row, "transaction_date", &raw.transaction_date)?;
    let time_text = required_text(row, "transaction_time", &raw.transaction_time)?;

    let transaction_date = parse_date(&date_text).ok_or_else(|| {
        AnalysisError::schema(row, "transaction_date", format!("unparsable date `{}`", date_text))
    })?;
    let transaction_time = parse_time(&time_text).ok_or_else(|| {
        AnalysisError::schema(row, "transaction_time", format!("unparsable time `{}`", time_text))
    })?;

    let qty_text = required_text(row, "transaction_qty", &raw.transaction_qty)?;
    let transaction_qty: i64 = qty_text.parse().map_err(|_| {
        AnalysisError::schema(row, "transaction_qty", format!("unparsable quantity `{}`", qty_text))
    })?;
    if transaction_qty <= 0 {
        return Err(AnalysisError::schema(
            row,
            "transaction_qty",
            format!("quantity must be positive, got {}", transaction_qty),
        ));
    }

    let price_text = required_text(row, "unit_price", &raw.unit_price)?;
    let unit_price: f64 = price_text.parse().map_err(|_| {
        AnalysisError::schema(row, "unit_price", format!("unparsable price `{}`", price_text))
    })?;
    if !unit_price.is_finite() || unit_price <= 0.0 {
        return Err(AnalysisError::schema(
            row,
            "unit_price",
            format!("price must be positive, got {}", unit_price),
        ));
    }

    let datetime = transaction_date.and_time(transaction_time);
    let hour = datetime.hour();

    Ok(CanonicalRecord {
        transaction_id,
        transaction_date,
        transaction_time,
        transaction_qty,
        unit_price,
        product_id: required_text(row, "product_id", &raw.product_id)?,
        product_category: required_text(row, "product_category", &raw.product_category)?,
        product_type: required_text(row, "product_type", &raw.product_type)?,
        store_id: required_text(row, "store_id", &raw.store_id)?,
        store_location: required_text(row, "store_location", &raw.store_location)?,
        datetime,
        total_amount: transaction_qty as f64 * unit_price,
        hour,
        day_of_week: datetime.format("%A").to_string(),
        month: datetime.format("%B").to_string(),
        time_period: TimePeriod::from_hour(hour),
    })
}

fn required_text(
    row: usize,
    field: &'static str,
    value: &Option<String>,
) -> crate::Result<String> {
    match value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(AnalysisError::schema(row, field, "missing value")),
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
}

/// Compute row, null, duplicate and cardinality statistics for a raw table.
///
/// Never fails: findings are returned for the caller to act on.
pub fn check_quality(rows: &[TransactionRecord]) -> QualityReport {
    let missing_values = TransactionRecord::FIELDS
        .iter()
        .map(|&field| {
            let count = rows.iter().filter(|row| row.is_null(field)).count();
            (field.to_string(), count)
        })
        .collect::<BTreeMap<_, _>>();

    let mut seen = HashSet::with_capacity(rows.len());
    let mut duplicates = 0;
    for row in rows {
        let key = (
            row.transaction_id.as_deref(),
            row.transaction_date.as_deref(),
            row.transaction_time.as_deref(),
            row.transaction_qty.as_deref(),
            row.unit_price.as_deref(),
            row.product_id.as_deref(),
            row.product_category.as_deref(),
            row.product_type.as_deref(),
            row.store_id.as_deref(),
            row.store_location.as_deref(),
        );
        if !seen.insert(key) {
            duplicates += 1;
        }
    }

    let unique_stores = rows
        .iter()
        .filter_map(|row| row.store_id.as_deref())
        .collect::<HashSet<_>>()
        .len();
    let unique_products = rows
        .iter()
        .filter_map(|row| row.product_id.as_deref())
        .collect::<HashSet<_>>()
        .len();

    let date_range = rows
        .iter()
        .filter_map(|row| {
            let date = parse_date(row.transaction_date.as_deref()?)?;
            let time = parse_time(row.transaction_time.as_deref()?)?;
            Some(date.and_time(time))
        })
        .fold(None, |range: Option<DateRange>, datetime| {
            Some(match range {
                None => DateRange {
                    start: datetime,
                    end: datetime,
                },
                Some(range) => DateRange {
                    start: range.start.min(datetime),
                    end: range.end.max(datetime),
                },
            })
        });

    let report = QualityReport {
        total_rows: rows.len(),
        missing_values,
        duplicates,
        unique_stores,
        unique_products,
        date_range,
    };

    debug!(rows = report.total_rows, "Checked data quality");
    for warning in report.warnings() {
        warn!(?warning, "Data quality issue");
    }

    report
}
