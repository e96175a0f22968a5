//! Conversion of record slices into a polars `DataFrame` for grouped aggregation

use chrono::Datelike;
use polars::prelude::*;

use crate::records::CanonicalRecord;

pub const TRANSACTION_ID: &str = "transaction_id";
pub const TRANSACTION_DATE: &str = "transaction_date";
pub const MONTH_KEY: &str = "month_key";
pub const HOUR: &str = "hour";
pub const DAY_OF_WEEK: &str = "day_of_week";
pub const DAY_OF_WEEK_NUM: &str = "day_of_week_num";
pub const TRANSACTION_QTY: &str = "transaction_qty";
pub const UNIT_PRICE: &str = "unit_price";
pub const TOTAL_AMOUNT: &str = "total_amount";
pub const PRODUCT_ID: &str = "product_id";
pub const PRODUCT_CATEGORY: &str = "product_category";
pub const PRODUCT_TYPE: &str = "product_type";
pub const STORE_ID: &str = "store_id";
pub const STORE_LOCATION: &str = "store_location";

/// Build a `DataFrame` with one row per record.
///
/// Dates are rendered as `YYYY-MM-DD` and months as `YYYY-MM` so that string
/// order is chronological order.
pub fn to_frame<R: AsRef<CanonicalRecord>>(rows: &[R]) -> crate::Result<DataFrame> {
    let records: Vec<&CanonicalRecord> = rows.iter().map(AsRef::as_ref).collect();

    fn text(
        records: &[&CanonicalRecord],
        field: impl Fn(&CanonicalRecord) -> String,
    ) -> Vec<String> {
        records.iter().map(|r| field(r)).collect()
    }

    let columns: Vec<Column> = vec![
        Series::new(TRANSACTION_ID.into(), text(&records, |r| r.transaction_id.clone())).into(),
        Series::new(
            TRANSACTION_DATE.into(),
            text(&records, |r| r.transaction_date.format("%Y-%m-%d").to_string()),
        )
        .into(),
        Series::new(
            MONTH_KEY.into(),
            text(&records, |r| format!("{:04}-{:02}", r.datetime.year(), r.datetime.month())),
        )
        .into(),
        Series::new(HOUR.into(), records.iter().map(|r| r.hour as i64).collect::<Vec<_>>()).into(),
        Series::new(DAY_OF_WEEK.into(), text(&records, |r| r.day_of_week.clone())).into(),
        Series::new(
            DAY_OF_WEEK_NUM.into(),
            records
                .iter()
                .map(|r| r.datetime.weekday().num_days_from_monday() as i64)
                .collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            TRANSACTION_QTY.into(),
            records.iter().map(|r| r.transaction_qty).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            UNIT_PRICE.into(),
            records.iter().map(|r| r.unit_price).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            TOTAL_AMOUNT.into(),
            records.iter().map(|r| r.total_amount).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(PRODUCT_ID.into(), text(&records, |r| r.product_id.clone())).into(),
        Series::new(PRODUCT_CATEGORY.into(), text(&records, |r| r.product_category.clone())).into(),
        Series::new(PRODUCT_TYPE.into(), text(&records, |r| r.product_type.clone())).into(),
        Series::new(STORE_ID.into(), text(&records, |r| r.store_id.clone())).into(),
        Series::new(STORE_LOCATION.into(), text(&records, |r| r.store_location.clone())).into(),
    ];

    Ok(DataFrame::new(columns)?)
}

/// Read a non-null string column.
pub(crate) fn str_values(df: &DataFrame, name: &str) -> crate::Result<Vec<String>> {
    Ok(df
        .column(name)?
        .str()?
        .into_no_null_iter()
        .map(str::to_string)
        .collect())
}

/// Read a numeric column as `f64`, casting integer columns.
pub(crate) fn f64_values(df: &DataFrame, name: &str) -> crate::Result<Vec<f64>> {
    Ok(df
        .column(name)?
        .cast(&DataType::Float64)?
        .f64()?
        .into_no_null_iter()
        .collect())
}

/// Read a numeric column as `i64`, casting unsigned count columns.
pub(crate) fn i64_values(df: &DataFrame, name: &str) -> crate::Result<Vec<i64>> {
    Ok(df
        .column(name)?
        .cast(&DataType::Int64)?
        .i64()?
        .into_no_null_iter()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::preprocess;
    use crate::records::TransactionRecord;

    #[test]
    fn test_to_frame_shape_and_keys() {
        let raw = TransactionRecord {
            transaction_id: Some("7".to_string()),
            transaction_date: Some("2024-02-03".to_string()),
            transaction_time: Some("09:30:00".to_string()),
            transaction_qty: Some("2".to_string()),
            unit_price: Some("2.5".to_string()),
            product_id: Some("10".to_string()),
            product_category: Some("Bakery".to_string()),
            product_type: Some("Scone".to_string()),
            store_id: Some("3".to_string()),
            store_location: Some("Astoria".to_string()),
        };
        let rows = preprocess(&[raw]).unwrap();
        let df = to_frame(&rows).unwrap();

        assert_eq!(df.height(), 1);
        assert_eq!(df.width(), 14);
        assert_eq!(str_values(&df, MONTH_KEY).unwrap(), vec!["2024-02"]);
        assert_eq!(str_values(&df, TRANSACTION_DATE).unwrap(), vec!["2024-02-03"]);
        assert_eq!(f64_values(&df, TOTAL_AMOUNT).unwrap(), vec![5.0]);
        assert_eq!(i64_values(&df, DAY_OF_WEEK_NUM).unwrap(), vec![5]);
    }

    #[test]
    fn test_to_frame_empty() {
        let rows: Vec<CanonicalRecord> = Vec::new();
        let df = to_frame(&rows).unwrap();
        assert_eq!(df.height(), 0);
    }
}
