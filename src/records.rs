//! Row types flowing through the pipeline: raw, canonical and enriched

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A raw point-of-sale row as supplied by a record source.
///
/// Every field is optional raw text so that a missing column, an empty cell or
/// a malformed number reaches the preprocessor, which reports it as a schema
/// error naming the field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransactionRecord {
    pub transaction_id: Option<String>,
    pub transaction_date: Option<String>,
    pub transaction_time: Option<String>,
    pub transaction_qty: Option<String>,
    pub unit_price: Option<String>,
    pub product_id: Option<String>,
    pub product_category: Option<String>,
    pub product_type: Option<String>,
    pub store_id: Option<String>,
    pub store_location: Option<String>,
}

impl TransactionRecord {
    /// Field names in source column order.
    pub const FIELDS: [&'static str; 10] = [
        "transaction_id",
        "transaction_date",
        "transaction_time",
        "transaction_qty",
        "unit_price",
        "product_id",
        "product_category",
        "product_type",
        "store_id",
        "store_location",
    ];

    /// Whether the named field is absent or blank.
    pub fn is_null(&self, field: &str) -> bool {
        fn blank(value: &Option<String>) -> bool {
            value.as_deref().map_or(true, |v| v.trim().is_empty())
        }

        match field {
            "transaction_id" => blank(&self.transaction_id),
            "transaction_date" => blank(&self.transaction_date),
            "transaction_time" => blank(&self.transaction_time),
            "transaction_qty" => blank(&self.transaction_qty),
            "unit_price" => blank(&self.unit_price),
            "product_id" => blank(&self.product_id),
            "product_category" => blank(&self.product_category),
            "product_type" => blank(&self.product_type),
            "store_id" => blank(&self.store_id),
            "store_location" => blank(&self.store_location),
            _ => false,
        }
    }
}

/// Coarse daypart derived from the hour of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TimePeriod {
    Morning,
    Lunch,
    Afternoon,
    Evening,
}

impl TimePeriod {
    /// Buckets: [0, 11] Morning, (11, 14] Lunch, (14, 17] Afternoon, (17, 24) Evening.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            0..=11 => TimePeriod::Morning,
            12..=14 => TimePeriod::Lunch,
            15..=17 => TimePeriod::Afternoon,
            _ => TimePeriod::Evening,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::Morning => "Morning",
            TimePeriod::Lunch => "Lunch",
            TimePeriod::Afternoon => "Afternoon",
            TimePeriod::Evening => "Evening",
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction after date/time normalization and derived-field computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub transaction_id: String,
    pub transaction_date: NaiveDate,
    pub transaction_time: NaiveTime,
    pub transaction_qty: i64,
    pub unit_price: f64,
    pub product_id: String,
    pub product_category: String,
    pub product_type: String,
    pub store_id: String,
    pub store_location: String,
    pub datetime: NaiveDateTime,
    pub total_amount: f64,
    pub hour: u32,
    /// English weekday name, e.g. "Monday".
    pub day_of_week: String,
    /// English month name, e.g. "January".
    pub month: String,
    pub time_period: TimePeriod,
}

impl AsRef<CanonicalRecord> for CanonicalRecord {
    fn as_ref(&self) -> &CanonicalRecord {
        self
    }
}

/// Cyclical hour encoding and weekday flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeFeatures {
    pub hour_sin: f64,
    pub hour_cos: f64,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week_num: u32,
    pub is_weekend: u8,
}

/// Per-date rollups broadcast onto each row, plus per-row ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SalesFeatures {
    pub daily_sales: f64,
    pub daily_transactions: usize,
    pub avg_transaction_value: f64,
    pub product_popularity: i64,
}

/// Rollups scoped to (store, date) and (store, category).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StoreFeatures {
    pub store_daily_sales: f64,
    pub store_daily_transactions: usize,
    pub store_product_mix: i64,
}

/// A canonical record carrying whichever feature groups have been computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub canonical: CanonicalRecord,
    pub time: Option<TimeFeatures>,
    pub sales: Option<SalesFeatures>,
    pub store: Option<StoreFeatures>,
}

impl From<CanonicalRecord> for EnrichedRecord {
    fn from(canonical: CanonicalRecord) -> Self {
        EnrichedRecord {
            canonical,
            time: None,
            sales: None,
            store: None,
        }
    }
}

impl AsRef<CanonicalRecord> for EnrichedRecord {
    fn as_ref(&self) -> &CanonicalRecord {
        &self.canonical
    }
}
