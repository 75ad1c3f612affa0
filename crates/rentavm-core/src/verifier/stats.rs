//! Per-field batch statistics and their merge into the historical summary.

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::models::{Batch, ColumnKind, FieldStatistics, Value};

/// Describe one column: `None` when it has no numeric value at all.
///
/// `std` is the sample standard deviation (n - 1 denominator) and is `None`
/// for fewer than two values.
pub fn describe_column<'a>(values: impl Iterator<Item = &'a Value>) -> Option<FieldStatistics> {
    let mut total: u64 = 0;
    let mut present: Vec<f64> = Vec::new();
    for value in values {
        total += 1;
        if let Some(x) = value.as_number() {
            if !x.is_nan() {
                present.push(x);
            }
        }
    }
    if present.is_empty() {
        return None;
    }

    let count = present.len() as f64;
    let sum: f64 = present.iter().sum();
    let sum_of_squares: f64 = present.iter().map(|x| x * x).sum();
    let mean = sum / count;
    let std = if present.len() > 1 {
        let squared_deviation: f64 = present.iter().map(|x| (x - mean).powi(2)).sum();
        Some((squared_deviation / (count - 1.0)).sqrt())
    } else {
        None
    };
    let min = present.iter().copied().fold(f64::INFINITY, f64::min);
    let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(FieldStatistics {
        mean,
        std,
        min,
        max,
        missing_rate: (total - present.len() as u64) as f64 / total as f64,
        sample_count: present.len() as u64,
        samples_total_count: total,
        sum,
        sum_of_squares,
    })
}

/// Statistics for every numeric column of `batch`, in column order.
///
/// Text and all-null columns are skipped. Columns are described in parallel.
pub fn describe_batch(batch: &Batch) -> IndexMap<String, FieldStatistics> {
    let numeric: Vec<&String> = batch
        .columns()
        .iter()
        .filter(|column| batch.column_kind(column) == ColumnKind::Numeric)
        .collect();

    let described: Vec<(String, Option<FieldStatistics>)> = numeric
        .par_iter()
        .map(|column| {
            (
                (*column).clone(),
                describe_column(batch.column_values(column)),
            )
        })
        .collect();

    described
        .into_iter()
        .filter_map(|(column, stats)| stats.map(|s| (column, s)))
        .collect()
}

/// Merge a batch's statistics for one field into its historical statistics.
///
/// The update reproduces the reference behaviour of the historical dataset
/// exactly, including its non-textbook parts:
/// - `mean` is `(historical.mean + batch.mean) / combined sample count`,
///   not a sample-weighted mean;
/// - the variance denominator is twice the *batch* sample count;
/// - both missing-rate weights use the pre-update historical total.
///
/// Changing any of these would make new statistics incomparable with the
/// ones already persisted.
pub fn merge(historical: &FieldStatistics, batch: &FieldStatistics) -> FieldStatistics {
    let samples_total_new = historical.samples_total_count + batch.samples_total_count;
    let samples_new = historical.sample_count + batch.sample_count;
    let mean_new = (historical.mean + batch.mean) / samples_new as f64;

    let sum_total = batch.sum + historical.sum;
    let sum_total_squares = batch.sum_of_squares + historical.sum_of_squares;
    let n_samples = (batch.sample_count + batch.sample_count) as f64;
    let sigma = sum_total_squares / n_samples - (sum_total / n_samples).powi(2);
    let std_new = if sigma >= 0.0 { Some(sigma.sqrt()) } else { None };

    let min_new = if batch.min <= historical.min {
        batch.min
    } else {
        historical.min
    };
    let max_new = if batch.max >= historical.max {
        batch.max
    } else {
        historical.max
    };

    let weight_denominator =
        (historical.samples_total_count + batch.samples_total_count) as f64;
    let missing_weight_old = historical.samples_total_count as f64 / weight_denominator;
    let missing_weight_new = batch.samples_total_count as f64 / weight_denominator;
    let missing_new =
        historical.missing_rate * missing_weight_old + batch.missing_rate * missing_weight_new;

    FieldStatistics {
        mean: mean_new,
        std: std_new,
        min: min_new,
        max: max_new,
        missing_rate: missing_new,
        sample_count: samples_new,
        samples_total_count: samples_total_new,
        sum: sum_total,
        sum_of_squares: sum_total_squares,
    }
}

/// Batch statistics for a column that is null on all `samples_total_count`
/// rows. Only the counts and the missing rate carry information.
pub fn describe_all_missing(samples_total_count: u64) -> FieldStatistics {
    FieldStatistics {
        mean: 0.0,
        std: None,
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
        missing_rate: 1.0,
        sample_count: 0,
        samples_total_count,
        sum: 0.0,
        sum_of_squares: 0.0,
    }
}

/// Fold an all-missing batch into history.
///
/// The missing rate and the total row count move with the same weights as
/// in [`merge`]; everything describing the values themselves stays as it
/// was, since the batch has none.
pub fn merge_missing(historical: &FieldStatistics, batch: &FieldStatistics) -> FieldStatistics {
    let weight_denominator =
        (historical.samples_total_count + batch.samples_total_count) as f64;
    let missing_new = if weight_denominator > 0.0 {
        (historical.missing_rate * historical.samples_total_count as f64
            + batch.missing_rate * batch.samples_total_count as f64)
            / weight_denominator
    } else {
        historical.missing_rate
    };

    FieldStatistics {
        missing_rate: missing_new,
        samples_total_count: historical.samples_total_count + batch.samples_total_count,
        ..historical.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
