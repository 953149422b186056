//! Synthetic labeled transactions for trying the pipeline

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{FraudError, Result, TransactionRecord};

/// Days covered by generated timestamps
const SPAN_DAYS: i64 = 90;

/// Fraud rows fall in [0, NIGHT_END_HOUR)
pub const NIGHT_END_HOUR: i64 = 5;

/// Generate `rows` labeled transactions, each fraud with probability `fraud_rate`.
///
/// Fraud rows are large transfers from fresh accounts placed between
/// midnight and 05:00; legitimate rows are spread over the whole day.
pub fn synthetic_transactions(rows: usize, fraud_rate: f64, seed: u64) -> Result<Vec<TransactionRecord>> {
    if !(0.0..=1.0).contains(&fraud_rate) {
        return Err(FraudError::Config(format!(
            "fraud rate must be in [0, 1], got {}",
            fraud_rate
        )));
    }

    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| FraudError::Config("invalid synthetic start date".to_string()))?;
    let mut rng = StdRng::seed_from_u64(seed);

    let records = (0..rows)
        .map(|i| {
            let fraud = rng.gen_bool(fraud_rate);
            let hour = if fraud {
                rng.gen_range(0..NIGHT_END_HOUR)
            } else {
                rng.gen_range(0..24)
            };
            let timestamp = timestamp_at(&mut rng, start, hour);

            if fraud {
                TransactionRecord {
                    transaction_id: Some(format!("TX{:06}", i)),
                    amount: rng.gen_range(20_000.0..200_000.0_f64).round(),
                    timestamp,
                    sender_account_age: rng.gen_range(0.0..7.0_f64).round(),
                    recipient_account_age: rng.gen_range(0.0..30.0_f64).round(),
                    sender_transaction_count: rng.gen_range(0.0..5.0_f64).round(),
                    recipient_transaction_count: rng.gen_range(0.0..10.0_f64).round(),
                    is_fraud: Some(1.0),
                }
            } else {
                TransactionRecord {
                    transaction_id: Some(format!("TX{:06}", i)),
                    amount: rng.gen_range(10.0..15_000.0_f64).round(),
                    timestamp,
                    sender_account_age: rng.gen_range(30.0..2_000.0_f64).round(),
                    recipient_account_age: rng.gen_range(30.0..2_000.0_f64).round(),
                    sender_transaction_count: rng.gen_range(5.0..500.0_f64).round(),
                    recipient_transaction_count: rng.gen_range(5.0..500.0_f64).round(),
                    is_fraud: Some(0.0),
                }
            }
        })
        .collect();

    Ok(records)
}

fn timestamp_at(rng: &mut StdRng, start: NaiveDateTime, hour: i64) -> String {
    let at = start
        + Duration::days(rng.gen_range(0..SPAN_DAYS))
        + Duration::hours(hour)
        + Duration::minutes(rng.gen_range(0..60))
        + Duration::seconds(rng.gen_range(0..60));
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}
