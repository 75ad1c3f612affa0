//! Persistence of the [`HistoricalSummary`] as three plain tables.
//!
//! The summary lives in `<dataset>.variable_names`, `<dataset>.value_names`
//! and `<dataset>.statistics` of any [`TableStore`]. Saving replaces each
//! table wholesale; loading a store that has never been saved yields an
//! empty summary.

use indexmap::{IndexMap, IndexSet};
use tracing::info;

use crate::errors::{AvmError, AvmResult};
use crate::models::{
    Batch, FieldStatistics, HistoricalSummary, Record, TableRef, Value, WriteMode, WriteOutcome,
};
use crate::store::tables::TableStore;

pub const VARIABLE_NAMES_TABLE: &str = "variable_names";
pub const VALUE_NAMES_TABLE: &str = "value_names";
pub const STATISTICS_TABLE: &str = "statistics";

pub const VARIABLE_NAMES_COLUMN: &str = "VariableNames";
pub const VALUE_NAMES_COLUMN: &str = "ValueNames";
pub const STATISTICS_NAME_COLUMN: &str = "Name";

/// Statistic columns of the `statistics` table, in stored order.
pub const STATISTICS_COLUMNS: &[&str] = &[
    "mean",
    "std",
    "min",
    "max",
    "missing",
    "samples",
    "samples_total",
    "sum",
    "sum_squares",
];

/// Load/save boundary for the historical summary.
pub trait SummaryStore {
    fn load(&self) -> AvmResult<HistoricalSummary>;
    fn save(&self, summary: &HistoricalSummary) -> AvmResult<()>;
}

/// [`SummaryStore`] encoded as tables of a [`TableStore`].
pub struct TableSummaryStore<'a, T: TableStore> {
    tables: &'a T,
    dataset: String,
}

impl<'a, T: TableStore> TableSummaryStore<'a, T> {
    pub fn new(tables: &'a T, dataset: impl Into<String>) -> Self {
        Self {
            tables,
            dataset: dataset.into(),
        }
    }

    fn table(&self, name: &str) -> TableRef {
        TableRef::new(self.dataset.clone(), name)
    }

    fn read_names(&self, table: &str, column: &str) -> AvmResult<IndexSet<String>> {
        let Some(batch) = self.tables.read(&self.table(table))? else {
            return Ok(IndexSet::new());
        };
        Ok(batch
            .column_values(column)
            .filter_map(|value| value.as_text().map(str::to_string))
            .collect())
    }

    fn replace(&self, table: &str, batch: &Batch) -> AvmResult<()> {
        let target = self.table(table);
        match self.tables.write(&target, batch, WriteMode::Replace)? {
            WriteOutcome::Written => Ok(()),
            outcome => Err(AvmError::UnexpectedWriteOutcome {
                table: target.qualified(),
                outcome,
            }),
        }
    }
}

impl<T: TableStore> SummaryStore for TableSummaryStore<'_, T> {
    fn load(&self) -> AvmResult<HistoricalSummary> {
        let known_variable_names = self.read_names(VARIABLE_NAMES_TABLE, VARIABLE_NAMES_COLUMN)?;
        let known_value_names = self.read_names(VALUE_NAMES_TABLE, VALUE_NAMES_COLUMN)?;
        let statistics = match self.tables.read(&self.table(STATISTICS_TABLE))? {
            Some(batch) => statistics_from_batch(&batch)?,
            None => IndexMap::new(),
        };
        let summary = HistoricalSummary {
            known_variable_names,
            known_value_names,
            statistics,
        };
        info!(
            "Loaded historical summary: {} variables, {} values, {} statistics",
            summary.known_variable_names.len(),
            summary.known_value_names.len(),
            summary.statistics.len()
        );
        Ok(summary)
    }

    fn save(&self, summary: &HistoricalSummary) -> AvmResult<()> {
        self.replace(
            VARIABLE_NAMES_TABLE,
            &names_to_batch(VARIABLE_NAMES_COLUMN, &summary.known_variable_names),
        )?;
        self.replace(
            VALUE_NAMES_TABLE,
            &names_to_batch(VALUE_NAMES_COLUMN, &summary.known_value_names),
        )?;
        self.replace(STATISTICS_TABLE, &statistics_to_batch(&summary.statistics))?;
        info!("Successfully updated historical info in the table store.");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

fn names_to_batch(column: &str, names: &IndexSet<String>) -> Batch {
    let records = names
        .iter()
        .map(|name| {
            let mut record = Record::new();
            record.insert(column.to_string(), Value::Text(name.clone()));
            record
        })
        .collect();
    Batch::with_columns(std::iter::once(column.to_string()).collect(), records)
}

fn statistics_to_batch(statistics: &IndexMap<String, FieldStatistics>) -> Batch {
    let columns: IndexSet<String> = std::iter::once(STATISTICS_NAME_COLUMN)
        .chain(STATISTICS_COLUMNS.iter().copied())
        .map(str::to_string)
        .collect();
    let records = statistics
        .iter()
        .map(|(name, stats)| {
            let cells: [(&str, Value); 10] = [
                (STATISTICS_NAME_COLUMN, Value::Text(name.clone())),
                ("mean", Value::Number(stats.mean)),
                ("std", stats.std.map(Value::Number).unwrap_or(Value::Null)),
                ("min", Value::Number(stats.min)),
                ("max", Value::Number(stats.max)),
                ("missing", Value::Number(stats.missing_rate)),
                ("samples", Value::Number(stats.sample_count as f64)),
                ("samples_total", Value::Number(stats.samples_total_count as f64)),
                ("sum", Value::Number(stats.sum)),
                ("sum_squares", Value::Number(stats.sum_of_squares)),
            ];
            cells
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<Record>()
        })
        .collect();
    Batch::with_columns(columns, records)
}

fn statistics_from_batch(batch: &Batch) -> AvmResult<IndexMap<String, FieldStatistics>> {
    let mut statistics = IndexMap::new();
    for row in 0..batch.len() {
        let Some(name) = batch.value(row, STATISTICS_NAME_COLUMN).as_text() else {
            return Err(AvmError::Store(format!(
                "statistics row {row} has no {STATISTICS_NAME_COLUMN}"
            )));
        };
        let number = |column: &str| -> AvmResult<f64> {
            batch.value(row, column).as_number().ok_or_else(|| {
                AvmError::Store(format!("statistics for {name} lack a numeric {column}"))
            })
        };
        let count = |column: &str| -> AvmResult<u64> { Ok(number(column)?.max(0.0).round() as u64) };
        let stats = FieldStatistics {
            mean: number("mean")?,
            std: batch.value(row, "std").as_number(),
            min: number("min")?,
            max: number("max")?,
            missing_rate: number("missing")?,
            sample_count: count("samples")?,
            samples_total_count: count("samples_total")?,
            sum: number("sum")?,
            sum_of_squares: number("sum_squares")?,
        };
        statistics.insert(name.to_string(), stats);
    }
    Ok(statistics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
