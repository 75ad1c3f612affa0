//! SQLite DDL helpers for the dynamic-schema table store.
//!
//! Listing tables have no fixed schema: their columns follow whatever the
//! batch being written carries. Only `store_meta` is declared up front.

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{AvmError, AvmResult};

/// Current store schema version, recorded in `store_meta`.
pub const STORE_SCHEMA_VERSION: i32 = 1;

pub const META_STATEMENTS: &[&str] = &["CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );"];

/// Create `store_meta` and stamp the schema version if it is not set yet.
///
/// A store stamped with a newer version than this build understands is
/// refused.
pub fn init_meta(conn: &Connection) -> AvmResult<()> {
    for stmt in META_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    if get_meta(conn, "schema_version")?.is_none() {
        set_meta(conn, "schema_version", &STORE_SCHEMA_VERSION.to_string())?;
    }
    let version = get_schema_version(conn);
    if version > STORE_SCHEMA_VERSION {
        return Err(AvmError::Store(format!(
            "store schema version {version} is newer than supported version {STORE_SCHEMA_VERSION}"
        )));
    }
    Ok(())
}

/// Read the stored schema version. Returns 0 when absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    match get_meta(conn, "schema_version") {
        Ok(Some(v)) => v.parse::<i32>().unwrap_or(0),
        _ => 0,
    }
}

pub fn get_meta(conn: &Connection, key: &str) -> AvmResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1 LIMIT 1;",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> AvmResult<()> {
    conn.execute(
        "INSERT INTO store_meta(key, value) VALUES(?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        params![key, value],
    )?;
    Ok(())
}

// ─── Identifiers and statements ─────────────────────────────────────────────

/// Quote an arbitrary name as an SQLite identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE` with untyped columns, so every cell keeps the storage class
/// it was written with.
pub fn create_table_sql(table: &str, columns: &[&str]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!("CREATE TABLE {} ({});", quote_ident(table), cols.join(", "))
}

pub fn insert_sql(table: &str, columns: &[&str]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote_ident(table),
        cols.join(", "),
        placeholders.join(", ")
    )
}

pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {};", quote_ident(table))
}

pub fn table_exists(conn: &Connection, table: &str) -> AvmResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1;",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Column names of `table`, in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> AvmResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid;")?;
    let names = stmt
        .query_map(params![table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// All user table names (excluding `store_meta` and SQLite internals).
pub fn list_table_names(conn: &Connection) -> AvmResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name <> 'store_meta' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name;",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
