//! Criterion benchmarks for rentavm-core.
//!
//! None of these need a Python runtime; the `python` feature only adds thin
//! wrappers on top of the same Rust functions.
//!
//! ## Benchmark groups
//!
//! 1. **describe** — Per-column batch statistics at several batch sizes.
//! 2. **merge** — Online merge of historical and batch statistics.
//! 3. **t_test** — Two-sample test including the Student-t CDF.
//! 4. **cleaner_transform** — Latest-wins dedup and the retention window.
//! 5. **table_store** — SQLite replace + read of a listings table.
//!
//! ## Running
//!
//! ```sh
//! cargo bench --manifest-path crates/rentavm-core/Cargo.toml
//! # Run only the dedup group:
//! cargo bench --manifest-path crates/rentavm-core/Cargo.toml -- cleaner_transform
//! ```

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use rentavm_core::cleaner::transform::{apply_retention, dedup_latest};
use rentavm_core::models::{Batch, FieldStatistics, Record, TableRef, Value, WriteMode};
use rentavm_core::store::tables::{SqliteTableStore, TableStore};
use rentavm_core::verifier::stats::{describe_batch, merge};
use rentavm_core::verifier::ttest::{student_t_cdf, t_test};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `n` synthetic listings with a mix of numeric, text and pseudo-categorical
/// fields. Every third listing repeats an earlier one a day later.
fn synthetic_batch(n: usize) -> Batch {
    let records = (0..n)
        .map(|i| {
            let listing = if i % 3 == 2 { i - 1 } else { i };
            let day = 1 + (i % 10) as u32;
            let mut record = Record::new();
            record.insert("Price".into(), Value::Number(300.0 + (listing % 700) as f64));
            record.insert("Area".into(), Value::Number(20.0 + (listing % 90) as f64));
            record.insert(
                "Floor".into(),
                if listing % 11 == 0 {
                    Value::Null
                } else {
                    Value::Number((listing % 9) as f64)
                },
            );
            record.insert("City".into(), Value::Text(format!("City{}", listing % 5)));
            if listing % 2 == 0 {
                record.insert("Ypatybes_Balkonas".into(), Value::Number(1.0));
            }
            record.insert(
                "DateScraped".into(),
                Value::Text(format!("2024-01-{day:02} 08:00:00")),
            );
            record
        })
        .collect();
    Batch::new(records)
}

fn field_stats(mean: f64, sample_count: u64) -> FieldStatistics {
    FieldStatistics {
        mean,
        std: Some(mean / 10.0),
        min: mean / 2.0,
        max: mean * 2.0,
        missing_rate: 0.05,
        sample_count,
        samples_total_count: sample_count + sample_count / 20,
        sum: mean * sample_count as f64,
        sum_of_squares: mean * mean * sample_count as f64,
    }
}

// ---------------------------------------------------------------------------
// Benchmark groups
// ---------------------------------------------------------------------------

fn bench_describe(c: &mut Criterion) {
    let mut group = c.benchmark_group("describe");
    for size in [100usize, 1_000, 10_000] {
        let batch = synthetic_batch(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| describe_batch(black_box(batch)))
        });
    }
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let historical = field_stats(550.0, 10_000);
    let batch = field_stats(560.0, 400);
    c.bench_function("merge", |b| {
        b.iter(|| merge(black_box(&historical), black_box(&batch)))
    });
}

fn bench_t_test(c: &mut Criterion) {
    let mut group = c.benchmark_group("t_test");
    let historical = field_stats(550.0, 10_000);
    let batch = field_stats(560.0, 400);
    group.bench_function("t_test", |b| {
        b.iter(|| t_test(black_box(&historical), black_box(&batch)))
    });
    for df in [10.0f64, 1_000.0, 100_000.0] {
        group.bench_with_input(BenchmarkId::new("student_t_cdf", df), &df, |b, &df| {
            b.iter(|| student_t_cdf(black_box(1.5), black_box(df)))
        });
    }
    group.finish();
}

fn bench_cleaner_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("cleaner_transform");
    let today = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
    for size in [1_000usize, 10_000] {
        let batch = synthetic_batch(size);
        group.bench_with_input(BenchmarkId::new("dedup_latest", size), &batch, |b, batch| {
            b.iter(|| dedup_latest(batch.clone(), "DateScraped").unwrap())
        });
        group.bench_with_input(BenchmarkId::new("apply_retention", size), &batch, |b, batch| {
            b.iter(|| apply_retention(batch.clone(), "DateScraped", today, 7).unwrap())
        });
    }
    group.finish();
}

fn bench_table_store(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteTableStore::open(dir.path().join("bench.db")).unwrap();
    let table = TableRef::new("data_listings", "raw_listings_2024_01_10");
    let batch = synthetic_batch(1_000);

    let mut group = c.benchmark_group("table_store");
    group.sample_size(20);
    group.bench_function("replace_1000", |b| {
        b.iter(|| store.write(&table, black_box(&batch), WriteMode::Replace).unwrap())
    });
    store.write(&table, &batch, WriteMode::Replace).unwrap();
    group.bench_function("read_1000", |b| b.iter(|| store.read(&table).unwrap()));
    group.finish();
}

criterion_group!(
    benches,
    bench_describe,
    bench_merge,
    bench_t_test,
    bench_cleaner_transform,
    bench_table_store,
);
criterion_main!(benches);
