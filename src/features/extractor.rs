//! Transaction feature extraction
//!
//! Maps a raw transaction row to the canonical feature vector. The column order
//! defined here is the only one used, on both the fit and the predict path.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::{FraudError, Result, TransactionRecord};

/// Number of features per transaction
pub const FEATURE_DIM: usize = 7;

/// Canonical feature order
pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "amount",
    "hour",
    "day_of_week",
    "sender_account_age",
    "recipient_account_age",
    "sender_transaction_count",
    "recipient_transaction_count",
];

/// One transaction's features in canonical order
pub type FeatureVector = [f64; FEATURE_DIM];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a transaction timestamp into local wall-clock time.
///
/// Offset-carrying timestamps keep their own offset, so `hour` is the hour the
/// sender saw. Date-only values map to midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Features extracted from a single transaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransactionFeatures {
    pub amount: f64,
    /// Hour of day, 0-23
    pub hour: f64,
    /// Day of week, Monday = 0
    pub day_of_week: f64,
    pub sender_account_age: f64,
    pub recipient_account_age: f64,
    pub sender_transaction_count: f64,
    pub recipient_transaction_count: f64,
}

impl TransactionFeatures {
    /// Build features for the record at `row` (0-based data row)
    pub fn from_record(record: &TransactionRecord, row: usize) -> Result<Self> {
        let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| {
            FraudError::malformed(
                row,
                "timestamp",
                format!("cannot parse {:?} as a date-time", record.timestamp),
            )
        })?;

        let numeric = [
            ("amount", record.amount),
            ("sender_account_age", record.sender_account_age),
            ("recipient_account_age", record.recipient_account_age),
            ("sender_transaction_count", record.sender_transaction_count),
            ("recipient_transaction_count", record.recipient_transaction_count),
        ];
        if let Some((field, value)) = numeric.iter().find(|(_, v)| !v.is_finite()) {
            return Err(FraudError::malformed(
                row,
                field,
                format!("expected a finite number, got {}", value),
            ));
        }

        Ok(TransactionFeatures {
            amount: record.amount,
            hour: timestamp.hour() as f64,
            day_of_week: timestamp.weekday().num_days_from_monday() as f64,
            sender_account_age: record.sender_account_age,
            recipient_account_age: record.recipient_account_age,
            sender_transaction_count: record.sender_transaction_count,
            recipient_transaction_count: record.recipient_transaction_count,
        })
    }

    /// Flatten in canonical order
    pub fn to_array(&self) -> FeatureVector {
        [
            self.amount,
            self.hour,
            self.day_of_week,
            self.sender_account_age,
            self.recipient_account_age,
            self.sender_transaction_count,
            self.recipient_transaction_count,
        ]
    }
}

/// Feature matrix for a batch, with labels when every row carried one
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub matrix: Vec<FeatureVector>,
    pub labels: Option<Vec<f32>>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.matrix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }
}

/// Converts transaction batches into feature matrices
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        FeatureExtractor
    }

    /// Extract features for every record.
    ///
    /// The batch is validated as a whole: the first bad row aborts extraction
    /// and nothing is returned for the rest.
    pub fn extract(&self, records: &[TransactionRecord]) -> Result<FeatureSet> {
        let matrix = self.extract_features(records)?;

        let labels = if !records.is_empty() && records.iter().all(|r| r.is_fraud.is_some()) {
            Some(self.labels(records)?)
        } else {
            None
        };

        Ok(FeatureSet { matrix, labels })
    }

    /// Feature matrix only; `is_fraud` is never read
    pub fn extract_features(&self, records: &[TransactionRecord]) -> Result<Vec<FeatureVector>> {
        records
            .iter()
            .enumerate()
            .map(|(row, record)| TransactionFeatures::from_record(record, row).map(|f| f.to_array()))
            .collect()
    }

    /// Extract features and labels for training; every row must be labeled
    pub fn extract_labeled(
        &self,
        records: &[TransactionRecord],
    ) -> Result<(Vec<FeatureVector>, Vec<f32>)> {
        let features = self.extract(records)?;
        match features.labels {
            Some(labels) => Ok((features.matrix, labels)),
            None => {
                let row = records.iter().position(|r| r.is_fraud.is_none()).unwrap_or(0);
                Err(FraudError::malformed(row, "is_fraud", "training rows need a fraud label"))
            }
        }
    }

    fn labels(&self, records: &[TransactionRecord]) -> Result<Vec<f32>> {
        records
            .iter()
            .enumerate()
            .map(|(row, record)| match record.is_fraud {
                Some(v) if v == 0.0 || v == 1.0 => Ok(v as f32),
                Some(v) => Err(FraudError::malformed(
                    row,
                    "is_fraud",
                    format!("label must be 0 or 1, got {}", v),
                )),
                None => Err(FraudError::malformed(row, "is_fraud", "missing label")),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: &str, label: Option<f64>) -> TransactionRecord {
        TransactionRecord {
            transaction_id: None,
            amount: 1200.0,
            timestamp: timestamp.to_string(),
            sender_account_age: 40.0,
            recipient_account_age: 12.0,
            sender_transaction_count: 7.0,
            recipient_transaction_count: 3.0,
            is_fraud: label,
        }
    }

    #[test]
    fn test_calendar_features() {
        // 2024-10-26 was a Saturday
        let features = TransactionFeatures::from_record(&record("2024-10-26 09:23:15", None), 0)
            .unwrap();
        assert_eq!(features.hour, 9.0);
        assert_eq!(features.day_of_week, 5.0);

        let monday = TransactionFeatures::from_record(&record("2024-10-28T23:59:00", None), 0)
            .unwrap();
        assert_eq!(monday.hour, 23.0);
        assert_eq!(monday.day_of_week, 0.0);
    }

    #[test]
    fn test_canonical_order() {
        let features = TransactionFeatures::from_record(&record("2024-10-26 09:23:15", None), 0)
            .unwrap();
        assert_eq!(
            features.to_array(),
            [1200.0, 9.0, 5.0, 40.0, 12.0, 7.0, 3.0]
        );
        assert_eq!(FEATURE_NAMES[0], "amount");
        assert_eq!(FEATURE_NAMES[6], "recipient_transaction_count");
    }

    #[test]
    fn test_feature_only_extraction_ignores_labels() {
        let records = vec![
            record("2024-10-26 09:23:15", Some(2.0)),
            record("2024-10-26 10:00:00", Some(-1.0)),
        ];
        let extractor = FeatureExtractor::new();

        assert!(extractor.extract(&records).is_err());
        let matrix = extractor.extract_features(&records).unwrap();
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix[1][1], 10.0);
    }

    #[test]
    fn test_timestamp_formats() {
        assert!(parse_timestamp("2024-10-26 09:23:15.250").is_some());
        assert!(parse_timestamp("2024/10/26 09:23:15").is_some());
        assert!(parse_timestamp("2024-10-26 09:23").is_some());
        assert_eq!(
            parse_timestamp("2024-10-26").map(|t| t.hour()),
            Some(0)
        );
        // Offset is respected, not converted to UTC
        assert_eq!(
            parse_timestamp("2024-10-26T22:10:00+05:30").map(|t| t.hour()),
            Some(22)
        );
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_malformed_timestamp_identifies_row() {
        let records = vec![
            record("2024-10-26 09:23:15", Some(0.0)),
            record("2024-10-26 10:00:00", Some(0.0)),
            record("", Some(1.0)),
            record("2024-10-26 11:00:00", Some(0.0)),
        ];

        let err = FeatureExtractor::new().extract(&records).unwrap_err();
        match err {
            FraudError::MalformedInput { row, field, .. } => {
                assert_eq!(row, 2);
                assert_eq!(field, "timestamp");
            }
            other => panic!("expected MalformedInput, got {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_amount_rejected() {
        let mut bad = record("2024-10-26 09:23:15", None);
        bad.amount = f64::NAN;
        let err = FeatureExtractor::new().extract(&[bad]).unwrap_err();
        assert!(matches!(err, FraudError::MalformedInput { row: 0, ref field, .. } if field == "amount"));
    }

    #[test]
    fn test_labels_only_when_all_rows_labeled() {
        let extractor = FeatureExtractor::new();

        let labeled = vec![
            record("2024-10-26 09:23:15", Some(0.0)),
            record("2024-10-26 09:23:15", Some(1.0)),
        ];
        let set = extractor.extract(&labeled).unwrap();
        assert_eq!(set.labels, Some(vec![0.0, 1.0]));

        let partial = vec![
            record("2024-10-26 09:23:15", Some(0.0)),
            record("2024-10-26 09:23:15", None),
        ];
        let set = extractor.extract(&partial).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.labels.is_none());

        let err = extractor.extract_labeled(&partial).unwrap_err();
        assert!(matches!(err, FraudError::MalformedInput { row: 1, .. }));
    }

    #[test]
    fn test_invalid_label_rejected() {
        let records = vec![record("2024-10-26 09:23:15", Some(2.0))];
        let err = FeatureExtractor::new().extract(&records).unwrap_err();
        assert!(matches!(err, FraudError::MalformedInput { row: 0, ref field, .. } if field == "is_fraud"));
    }
}
