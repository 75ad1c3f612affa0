//! Row-level transforms of the cleaner: timestamp parsing, latest-wins
//! deduplication and the retention window.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use sha2::{Digest, Sha256};

use crate::errors::{AvmError, AvmResult};
use crate::models::{Batch, Value};

const SECONDS_PER_DAY: i64 = 86_400;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a scrape timestamp cell. Null is `Ok(None)`; anything that is not
/// a recognisable timestamp text is an error.
pub fn parse_timestamp(value: &Value, column: &str) -> AvmResult<Option<NaiveDateTime>> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::Text(text) => text.trim(),
        other => {
            return Err(AvmError::InvalidTimestamp {
                column: column.to_string(),
                value: format!("{other:?}"),
            })
        }
    };
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Some(parsed));
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(Some(parsed.naive_utc()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, DATE_FORMAT) {
        return Ok(Some(date.and_hms_opt(0, 0, 0).unwrap_or_default()));
    }
    Err(AvmError::InvalidTimestamp {
        column: column.to_string(),
        value: text.to_string(),
    })
}

fn timestamps(batch: &Batch, date_column: &str) -> AvmResult<Vec<Option<NaiveDateTime>>> {
    batch
        .column_values(date_column)
        .map(|value| parse_timestamp(value, date_column))
        .collect()
}

/// Feed one cell into the row hash in a form that survives a store round
/// trip: booleans hash as numbers and lists as their JSON text.
fn hash_cell(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update([0u8]),
        Value::Number(n) if n.is_nan() => hasher.update([0u8]),
        Value::Number(n) => {
            let n = if *n == 0.0 { 0.0 } else { *n };
            hasher.update([1u8]);
            hasher.update(n.to_bits().to_le_bytes());
        }
        Value::Bool(b) => {
            hasher.update([1u8]);
            hasher.update((if *b { 1.0_f64 } else { 0.0 }).to_bits().to_le_bytes());
        }
        Value::Text(text) => {
            hasher.update([2u8]);
            hasher.update((text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
        }
        Value::List(items) => {
            let text = serde_json::to_string(items).unwrap_or_default();
            hasher.update([2u8]);
            hasher.update((text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
        }
    }
}

/// SHA-256 identity of one row over every column except `date_column`.
pub fn row_identity(batch: &Batch, row: usize, date_column: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for column in batch.columns() {
        if column == date_column {
            continue;
        }
        hasher.update((column.len() as u64).to_le_bytes());
        hasher.update(column.as_bytes());
        hash_cell(&mut hasher, batch.value(row, column));
    }
    hasher.finalize().into()
}

/// Sort by `date_column` descending (nulls last, ties in input order) and
/// keep the first row of every identity group, i.e. the latest scrape.
pub fn dedup_latest(batch: Batch, date_column: &str) -> AvmResult<Batch> {
    let stamps = timestamps(&batch, date_column)?;
    let mut order: Vec<usize> = (0..batch.len()).collect();
    // `None < Some`, so reversing puts nulls last.
    order.sort_by(|&a, &b| stamps[b].cmp(&stamps[a]));

    let mut seen: HashSet<[u8; 32]> = HashSet::with_capacity(batch.len());
    let keep: Vec<usize> = order
        .into_iter()
        .filter(|&row| seen.insert(row_identity(&batch, row, date_column)))
        .collect();

    let (columns, records) = batch.into_parts();
    let mut slots: Vec<Option<_>> = records.into_iter().map(Some).collect();
    let kept = keep
        .into_iter()
        .filter_map(|row| slots[row].take())
        .collect();
    Ok(Batch::with_columns(columns, kept))
}

/// Whole days between `timestamp` and the start of `today`, rounded down.
pub fn age_days(today: NaiveDate, timestamp: NaiveDateTime) -> i64 {
    let midnight = today.and_hms_opt(0, 0, 0).unwrap_or_default();
    (midnight - timestamp).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Keep rows whose age is at most `days`. Rows without a timestamp are
/// dropped.
pub fn apply_retention(
    batch: Batch,
    date_column: &str,
    today: NaiveDate,
    days: i64,
) -> AvmResult<Batch> {
    let stamps = timestamps(&batch, date_column)?;
    let (columns, records) = batch.into_parts();
    let kept = records
        .into_iter()
        .zip(stamps)
        .filter(|(_, stamp)| matches!(stamp, Some(ts) if age_days(today, *ts) <= days))
        .map(|(record, _)| record)
        .collect();
    Ok(Batch::with_columns(columns, kept))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
