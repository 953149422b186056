//! CSV ingestion of transaction uploads

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::{FraudError, Result, TransactionRecord};

/// Read all transaction rows from a CSV file with a header line
pub fn read_transactions<P: AsRef<Path>>(path: P) -> Result<Vec<TransactionRecord>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let records = read_transactions_from(file)?;
    log::info!("Read {} transactions from {}", records.len(), path.display());
    Ok(records)
}

/// Read transaction rows from any reader.
///
/// Extra columns are ignored. A row that cannot be decoded fails the whole
/// batch with its 0-based data row index.
pub fn read_transactions_from<R: Read>(reader: R) -> Result<Vec<TransactionRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    rdr.deserialize::<TransactionRecord>()
        .enumerate()
        .map(|(row, result)| result.map_err(|e| row_error(row, &headers, e)))
        .collect()
}

fn row_error(row: usize, headers: &csv::StringRecord, err: csv::Error) -> FraudError {
    match err.kind() {
        csv::ErrorKind::Deserialize { err: de, .. } => {
            let field = de
                .field()
                .and_then(|i| headers.get(i as usize))
                .unwrap_or("record")
                .to_string();
            FraudError::MalformedInput {
                row,
                field,
                message: de.kind().to_string(),
            }
        }
        csv::ErrorKind::UnequalLengths { .. } => {
            FraudError::malformed(row, "record", "row has a different number of fields than the header")
        }
        _ => FraudError::Csv(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "transaction_id,amount,timestamp,sender_account_age,recipient_account_age,sender_transaction_count,recipient_transaction_count,is_fraud";

    #[test]
    fn test_read_labeled_rows() {
        let csv = format!(
            "{}\nT1,52999,2024-10-26 09:23:15,2,400,1,90,1\nT2,120.5,2024-10-26 10:00:00,300,410,55,70,0\n",
            HEADER
        );
        let records = read_transactions_from(csv.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].transaction_id.as_deref(), Some("T1"));
        assert_eq!(records[0].amount, 52999.0);
        assert_eq!(records[0].is_fraud, Some(1.0));
        assert_eq!(records[1].timestamp, "2024-10-26 10:00:00");
    }

    #[test]
    fn test_unlabeled_rows_and_extra_columns() {
        let csv = "amount,timestamp,sender_account_age,recipient_account_age,sender_transaction_count,recipient_transaction_count,channel\n\
                   10,2024-10-26 09:23:15,2,400,1,90,app\n";
        let records = read_transactions_from(csv.as_bytes()).unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].is_fraud.is_none());
        assert!(records[0].transaction_id.is_none());
    }

    #[test]
    fn test_bad_number_reports_row_and_field() {
        let csv = format!(
            "{}\nT1,10,2024-10-26 09:23:15,2,400,1,90,0\nT2,abc,2024-10-26 09:23:15,2,400,1,90,0\n",
            HEADER
        );
        let err = read_transactions_from(csv.as_bytes()).unwrap_err();
        match err {
            FraudError::MalformedInput { row, field, .. } => {
                assert_eq!(row, 1);
                assert_eq!(field, "amount");
            }
            other => panic!("expected MalformedInput, got {other:?}"),
        }
    }
}
