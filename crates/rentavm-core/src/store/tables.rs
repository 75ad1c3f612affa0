//! Master/snapshot table store.
//!
//! [`TableStore`] is the boundary the cleaner and the summary store talk to.
//! [`SqliteTableStore`] backs it with a single SQLite file in which the
//! logical table `dataset.table` is an SQLite table literally named
//! `"dataset.table"`. Each public method opens its own connection, so the
//! caller never manages connection lifetime.

use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use tracing::debug;

use crate::errors::{AvmError, AvmResult};
use crate::models::{Batch, Record, TableRef, Value, WriteMode, WriteOutcome};
use crate::store::schema;

/// Table-level persistence used by the cleaner and the summary store.
pub trait TableStore {
    /// Read a whole table, or `None` when it does not exist.
    fn read(&self, table: &TableRef) -> AvmResult<Option<Batch>>;

    /// Write `batch` into `table`. Append failures that the caller can
    /// recover from come back as [`WriteOutcome`] variants, not as errors.
    fn write(&self, table: &TableRef, batch: &Batch, mode: WriteMode) -> AvmResult<WriteOutcome>;

    /// Delete a table; deleting a missing table is a no-op.
    fn delete(&self, table: &TableRef) -> AvmResult<()>;

    /// Table ids (without the dataset prefix) inside `dataset`, sorted.
    fn list_tables(&self, dataset: &str) -> AvmResult<Vec<String>>;
}

// ---------------------------------------------------------------------------
// Helper: tilde expansion
// ---------------------------------------------------------------------------

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if text == "~" || text.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if text.len() > 2 {
                expanded.push(&text[2..]);
            }
            return expanded;
        }
    }
    path.to_path_buf()
}

// ---------------------------------------------------------------------------
// Helper: cell conversion
// ---------------------------------------------------------------------------

/// Convert a cell into its SQLite representation. Booleans become 0/1 and
/// lists become JSON array text.
pub fn to_sql_value(value: &Value) -> AvmResult<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) if n.is_nan() => SqlValue::Null,
        Value::Number(n) => SqlValue::Real(*n),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::List(items) => SqlValue::Text(serde_json::to_string(items)?),
    })
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i as f64),
        ValueRef::Real(f) => Value::Number(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

// ---------------------------------------------------------------------------
// SqliteTableStore
// ---------------------------------------------------------------------------

pub struct SqliteTableStore {
    db_path: PathBuf,
}

impl SqliteTableStore {
    /// Open (creating if needed) the store file. The path is expanded and
    /// parent directories are created when missing.
    pub fn open(db_path: impl AsRef<Path>) -> AvmResult<Self> {
        let expanded = expand_tilde(db_path.as_ref());
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()?.join(expanded)
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self { db_path: resolved };
        let conn = store.connect()?;
        schema::init_meta(&conn)?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> AvmResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        Ok(conn)
    }

    /// Insert every record of `batch` into `name`, one SQL column per group.
    fn insert_rows(
        conn: &Connection,
        name: &str,
        batch: &Batch,
        groups: &[(String, Vec<&str>)],
    ) -> AvmResult<()> {
        let columns: Vec<&str> = groups.iter().map(|(column, _)| column.as_str()).collect();
        let mut stmt = conn.prepare(&schema::insert_sql(name, &columns))?;
        for row in 0..batch.len() {
            let values = groups
                .iter()
                .map(|(_, members)| {
                    let cell = members
                        .iter()
                        .map(|member| batch.value(row, member))
                        .find(|value| !value.is_null());
                    match cell {
                        Some(value) => to_sql_value(value),
                        None => Ok(SqlValue::Null),
                    }
                })
                .collect::<AvmResult<Vec<SqlValue>>>()?;
            stmt.execute(rusqlite::params_from_iter(values.iter()))?;
        }
        Ok(())
    }
}

/// Group batch columns by the SQL column that stores them.
///
/// SQLite column names ignore ASCII case, so names differing only in case
/// share one column. It is spelled like the matching name in `existing`, or
/// else like the first such name in the batch. Within a row the first
/// non-null member wins.
fn column_groups<'b>(batch: &'b Batch, existing: &[String]) -> Vec<(String, Vec<&'b str>)> {
    let mut groups: IndexMap<String, (String, Vec<&'b str>)> = IndexMap::new();
    for column in existing {
        groups
            .entry(column.to_ascii_lowercase())
            .or_insert_with(|| (column.clone(), Vec::new()));
    }
    for column in batch.columns() {
        groups
            .entry(column.to_ascii_lowercase())
            .or_insert_with(|| (column.clone(), Vec::new()))
            .1
            .push(column.as_str());
    }
    groups
        .into_values()
        .filter(|(_, members)| !members.is_empty())
        .collect()
}

impl TableStore for SqliteTableStore {
    fn read(&self, table: &TableRef) -> AvmResult<Option<Batch>> {
        let name = table.qualified();
        let conn = self.connect()?;
        if !schema::table_exists(&conn, &name)? {
            return Ok(None);
        }
        let columns = schema::table_columns(&conn, &name)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} ORDER BY rowid;",
            schema::quote_ident(&name)
        ))?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                record.insert(column.clone(), from_sql_value(row.get_ref(i)?));
            }
            records.push(record);
        }
        let declared: IndexSet<String> = columns.into_iter().collect();
        debug!("Read {} rows from {}", records.len(), name);
        Ok(Some(Batch::with_columns(declared, records)))
    }

    fn write(&self, table: &TableRef, batch: &Batch, mode: WriteMode) -> AvmResult<WriteOutcome> {
        let name = table.qualified();
        if batch.columns().is_empty() {
            return Err(AvmError::Store(format!(
                "cannot write a batch without columns to {name}"
            )));
        }
        let mut conn = self.connect()?;

        match mode {
            WriteMode::Replace => {
                let groups = column_groups(batch, &[]);
                let columns: Vec<&str> = groups.iter().map(|(column, _)| column.as_str()).collect();
                let tx = conn.transaction()?;
                tx.execute_batch(&schema::drop_table_sql(&name))?;
                tx.execute_batch(&schema::create_table_sql(&name, &columns))?;
                Self::insert_rows(&tx, &name, batch, &groups)?;
                tx.commit()?;
            }
            WriteMode::Append => {
                if !schema::table_exists(&conn, &name)? {
                    return Ok(WriteOutcome::TableMissing);
                }
                let existing = schema::table_columns(&conn, &name)?;
                let known: IndexSet<String> =
                    existing.iter().map(|c| c.to_ascii_lowercase()).collect();
                if batch
                    .columns()
                    .iter()
                    .any(|c| !known.contains(&c.to_ascii_lowercase()))
                {
                    return Ok(WriteOutcome::SchemaConflict);
                }
                let groups = column_groups(batch, &existing);
                let tx = conn.transaction()?;
                Self::insert_rows(&tx, &name, batch, &groups)?;
                tx.commit()?;
            }
        }
        debug!("Wrote {} rows to {} ({:?})", batch.len(), name, mode);
        Ok(WriteOutcome::Written)
    }

    fn delete(&self, table: &TableRef) -> AvmResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(&schema::drop_table_sql(&table.qualified()))?;
        Ok(())
    }

    fn list_tables(&self, dataset: &str) -> AvmResult<Vec<String>> {
        let conn = self.connect()?;
        let prefix = format!("{dataset}.");
        let tables = schema::list_table_names(&conn)?
            .into_iter()
            .filter_map(|name| name.strip_prefix(&prefix).map(str::to_string))
            .collect();
        Ok(tables)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn open_store() -> (tempfile::TempDir, SqliteTableStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteTableStore::open(dir.path().join("tables.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_replace_then_read_round_trips_cells() {
        let (_dir, store) = open_store();
        let table = TableRef::new("data", "listings");
        let batch = Batch::new(vec![
            record(&[
                ("Price", 500.0.into()),
                ("City", "Vilnius".into()),
                ("Tags", Value::List(vec!["A".into(), "B".into()])),
            ]),
            record(&[("Price", Value::Null), ("Balcony", true.into())]),
        ]);

        let outcome = store.write(&table, &batch, WriteMode::Replace).unwrap();
        assert_eq!(outcome, WriteOutcome::Written);

        let read = store.read(&table).unwrap().unwrap();
        let columns: Vec<&str> = read.columns().iter().map(String::as_str).collect();
        assert_eq!(columns, vec!["Price", "City", "Tags", "Balcony"]);
        assert_eq!(read.value(0, "Price"), &Value::Number(500.0));
        assert_eq!(read.value(0, "City"), &Value::Text("Vilnius".into()));
        assert_eq!(read.value(0, "Tags"), &Value::Text("[\"A\",\"B\"]".into()));
        assert_eq!(read.value(1, "Price"), &Value::Null);
        assert_eq!(read.value(1, "Balcony"), &Value::Number(1.0));
    }

    #[test]
    fn test_open_refuses_newer_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tables.db");
        SqliteTableStore::open(&path).unwrap();
        let conn = Connection::open(&path).unwrap();
        schema::set_meta(&conn, "schema_version", "99").unwrap();
        drop(conn);

        let err = SqliteTableStore::open(&path).err().unwrap();
        assert!(matches!(err, AvmError::Store(_)));
    }

    #[test]
    fn test_read_missing_table_is_none() {
        let (_dir, store) = open_store();
        assert!(store.read(&TableRef::new("data", "nope")).unwrap().is_none());
    }

    #[test]
    fn test_append_outcomes() {
        let (_dir, store) = open_store();
        let table = TableRef::new("data", "master");
        let first = Batch::new(vec![record(&[("a", 1.0.into()), ("b", 2.0.into())])]);

        assert_eq!(
            store.write(&table, &first, WriteMode::Append).unwrap(),
            WriteOutcome::TableMissing
        );
        store.write(&table, &first, WriteMode::Replace).unwrap();

        // Fewer columns than the table: null-filled.
        let narrower = Batch::new(vec![record(&[("a", 3.0.into())])]);
        assert_eq!(
            store.write(&table, &narrower, WriteMode::Append).unwrap(),
            WriteOutcome::Written
        );

        // A new column cannot be appended.
        let wider = Batch::new(vec![record(&[("a", 4.0.into()), ("c", 5.0.into())])]);
        assert_eq!(
            store.write(&table, &wider, WriteMode::Append).unwrap(),
            WriteOutcome::SchemaConflict
        );

        let read = store.read(&table).unwrap().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read.value(1, "a"), &Value::Number(3.0));
        assert!(read.value(1, "b").is_null());
    }

    #[test]
    fn test_append_matches_columns_ignoring_case() {
        let (_dir, store) = open_store();
        let table = TableRef::new("data", "master");
        let day_five = Batch::new(vec![record(&[("Ypatybes_Wifi", 1.0.into())])]);
        store.write(&table, &day_five, WriteMode::Replace).unwrap();

        let day_six = Batch::new(vec![record(&[("Ypatybes_WiFi", 1.0.into())])]);
        assert_eq!(
            store.write(&table, &day_six, WriteMode::Append).unwrap(),
            WriteOutcome::Written
        );

        let read = store.read(&table).unwrap().unwrap();
        let columns: Vec<&str> = read.columns().iter().map(String::as_str).collect();
        assert_eq!(columns, vec!["Ypatybes_Wifi"]);
        assert_eq!(read.len(), 2);
        assert_eq!(read.value(1, "Ypatybes_Wifi"), &Value::Number(1.0));
    }

    #[test]
    fn test_replace_folds_columns_differing_in_case() {
        let (_dir, store) = open_store();
        let table = TableRef::new("data", "master");
        let batch = Batch::new(vec![
            record(&[("Ypatybes_Wifi", 1.0.into()), ("Price", 500.0.into())]),
            record(&[("Ypatybes_WiFi", 1.0.into()), ("Price", 600.0.into())]),
        ]);
        store.write(&table, &batch, WriteMode::Replace).unwrap();

        let read = store.read(&table).unwrap().unwrap();
        let columns: Vec<&str> = read.columns().iter().map(String::as_str).collect();
        assert_eq!(columns, vec!["Ypatybes_Wifi", "Price"]);
        assert_eq!(read.value(0, "Ypatybes_Wifi"), &Value::Number(1.0));
        assert_eq!(read.value(1, "Ypatybes_Wifi"), &Value::Number(1.0));
    }

    #[test]
    fn test_empty_table_keeps_schema() {
        let (_dir, store) = open_store();
        let table = TableRef::new("data_info", "value_names");
        let columns: IndexSet<String> = ["ValueNames".to_string()].into_iter().collect();
        store
            .write(&table, &Batch::with_columns(columns, vec![]), WriteMode::Replace)
            .unwrap();
        let read = store.read(&table).unwrap().unwrap();
        assert!(read.is_empty());
        assert!(read.columns().contains("ValueNames"));
    }

    #[test]
    fn test_write_without_columns_is_an_error() {
        let (_dir, store) = open_store();
        let err = store
            .write(&TableRef::new("d", "t"), &Batch::default(), WriteMode::Replace)
            .unwrap_err();
        assert!(matches!(err, AvmError::Store(_)));
    }

    #[test]
    fn test_list_and_delete_tables() {
        let (_dir, store) = open_store();
        let batch = Batch::new(vec![record(&[("a", 1.0.into())])]);
        for (dataset, table) in [
            ("data", "raw_2024_01_02"),
            ("data", "raw_2024_01_01"),
            ("other", "raw_2024_01_01"),
        ] {
            store
                .write(&TableRef::new(dataset, table), &batch, WriteMode::Replace)
                .unwrap();
        }
        assert_eq!(
            store.list_tables("data").unwrap(),
            vec!["raw_2024_01_01", "raw_2024_01_02"]
        );

        store.delete(&TableRef::new("data", "raw_2024_01_01")).unwrap();
        store.delete(&TableRef::new("data", "never_existed")).unwrap();
        assert_eq!(store.list_tables("data").unwrap(), vec!["raw_2024_01_02"]);
        assert_eq!(store.list_tables("other").unwrap().len(), 1);
    }
}
