//! Shared typed models used across the verifier, cleaner, and store layers.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Value / Record
// ---------------------------------------------------------------------------

/// A single cell of a scraped listing.
///
/// Deserializes untagged from plain JSON scalars, so a scraper can hand over
/// `{"Price": 500, "City": "Vilnius", "Ypatybes": ["Balkonas"]}` directly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell. Booleans count as 0/1.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True for free-text cells (text and list values).
    pub fn is_string_kind(&self) -> bool {
        matches!(self, Value::Text(_) | Value::List(_))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// One scraped listing: field name -> value, in insertion order.
pub type Record = IndexMap<String, Value>;

static NULL: Value = Value::Null;

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Storage kind of a batch column, derived from its non-null values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    /// Every non-null value is a number or a boolean.
    Numeric,
    /// At least one non-null value is text or a list.
    String,
    /// The column holds no non-null value at all.
    Empty,
}

/// An ordered set of records collected in one run.
///
/// `columns` is the explicit union of field names across all records, in
/// first-seen order. A field absent from a record reads as [`Value::Null`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    columns: IndexSet<String>,
    records: Vec<Record>,
}

impl Batch {
    pub fn new(records: Vec<Record>) -> Self {
        Self::with_columns(IndexSet::new(), records)
    }

    /// Build a batch with a declared column set (e.g. a stored table schema);
    /// any extra keys found in `records` are appended to it.
    pub fn with_columns(mut columns: IndexSet<String>, records: Vec<Record>) -> Self {
        for record in &records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.insert(key.clone());
                }
            }
        }
        Self { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn columns(&self) -> &IndexSet<String> {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_parts(self) -> (IndexSet<String>, Vec<Record>) {
        (self.columns, self.records)
    }

    pub fn push(&mut self, record: Record) {
        for key in record.keys() {
            if !self.columns.contains(key) {
                self.columns.insert(key.clone());
            }
        }
        self.records.push(record);
    }

    /// Cell at (`row`, `column`); absent fields read as null.
    pub fn value(&self, row: usize, column: &str) -> &Value {
        self.records
            .get(row)
            .and_then(|record| record.get(column))
            .unwrap_or(&NULL)
    }

    /// All cells of one column, one per record, nulls included.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.records
            .iter()
            .map(move |record| record.get(column).unwrap_or(&NULL))
    }

    pub fn column_kind(&self, column: &str) -> ColumnKind {
        let mut kind = ColumnKind::Empty;
        for value in self.column_values(column) {
            if value.is_string_kind() {
                return ColumnKind::String;
            }
            if !value.is_null() {
                kind = ColumnKind::Numeric;
            }
        }
        kind
    }

    /// Row-wise concatenation; the column set becomes the union of both.
    pub fn concat(mut self, other: Batch) -> Batch {
        let (columns, records) = other.into_parts();
        for column in columns {
            self.columns.insert(column);
        }
        self.records.extend(records);
        self
    }

    /// Rename columns according to `mapping` (old name -> new name).
    /// Names not present in the mapping are kept as they are.
    pub fn rename_columns(&mut self, mapping: &IndexMap<String, String>) {
        if mapping.is_empty() {
            return;
        }
        let rename = |name: &String| mapping.get(name).cloned().unwrap_or_else(|| name.clone());
        self.columns = self.columns.iter().map(rename).collect();
        for record in &mut self.records {
            *record = record
                .drain(..)
                .map(|(key, value)| (rename(&key), value))
                .collect();
        }
    }
}

// ---------------------------------------------------------------------------
// Historical statistics
// ---------------------------------------------------------------------------

/// Aggregate statistics of one numeric field.
///
/// `sum` and `sum_of_squares` are the sufficient statistics that let later
/// batches be merged in without the raw values. `std` is `None` when the
/// variance estimate is undefined or negative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldStatistics {
    pub mean: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub missing_rate: f64,
    pub sample_count: u64,
    pub samples_total_count: u64,
    pub sum: f64,
    pub sum_of_squares: f64,
}

/// Persisted vocabulary and per-field statistics accumulated across runs.
///
/// All three collections only ever grow.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSummary {
    pub known_variable_names: IndexSet<String>,
    pub known_value_names: IndexSet<String>,
    pub statistics: IndexMap<String, FieldStatistics>,
}

impl HistoricalSummary {
    pub fn is_empty(&self) -> bool {
        self.known_variable_names.is_empty()
            && self.known_value_names.is_empty()
            && self.statistics.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Table store contract types
// ---------------------------------------------------------------------------

/// A logical table address: `dataset.table`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    pub fn qualified(&self) -> String {
        format!("{}.{}", self.dataset, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Drop whatever is there and write the batch as the whole table.
    Replace,
    /// Add the batch rows to an existing table.
    Append,
}

/// Result of a table write that the caller is expected to match on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Written,
    /// Append refused: the batch carries columns the table does not have.
    SchemaConflict,
    /// Append refused: the table does not exist.
    TableMissing,
}

// ---------------------------------------------------------------------------
// Run messages
// ---------------------------------------------------------------------------

/// `{"message": "<text>"}`, the structured reply of a completed stage.
pub fn success_message(text: &str) -> String {
    let quoted = serde_json::Value::String(text.to_string());
    format!("{{\"message\": {quoted}}}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
