//! CSV-backed record source

use std::io::Read;
use std::path::Path;

use tracing::info;

use crate::records::TransactionRecord;

/// Read raw transaction rows from a headered CSV file.
///
/// Columns are matched by name and kept as raw text. Missing columns and empty
/// cells come back as `None`; both they and malformed numbers are rejected
/// later by the preprocessor.
pub fn load_records<P: AsRef<Path>>(path: P) -> crate::Result<Vec<TransactionRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let records = read_records(file)?;

    info!(rows = records.len(), path = %path.display(), "Loaded transaction records");
    Ok(records)
}

pub fn read_records<R: Read>(reader: R) -> crate::Result<Vec<TransactionRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let records = csv_reader
        .deserialize::<TransactionRecord>()
        .collect::<Result<Vec<_>, csv::Error>>()?;
    Ok(records)
}
