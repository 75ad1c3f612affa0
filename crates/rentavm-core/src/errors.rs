//! Error types for the rentavm core library.

#[cfg(feature = "python")]
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyTimeoutError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;

use crate::models::WriteOutcome;

/// Top-level error enum for the rentavm core library.
///
/// Drift findings are never reported through this type; they end up in the
/// verification report and the log stream instead.
#[derive(Debug, thiserror::Error)]
pub enum AvmError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid timestamp in column {column}: {value:?}")]
    InvalidTimestamp { column: String, value: String },

    #[error("Max retries exceeded with url {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },

    #[error("Unexpected write outcome for table {table}: {outcome:?}")]
    UnexpectedWriteOutcome { table: String, outcome: WriteOutcome },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

#[cfg(feature = "python")]
impl From<AvmError> for PyErr {
    fn from(err: AvmError) -> PyErr {
        match &err {
            AvmError::Store(_) | AvmError::Sqlite(_) | AvmError::UnexpectedWriteOutcome { .. } => {
                PyRuntimeError::new_err(err.to_string())
            }
            AvmError::Config(_)
            | AvmError::InvalidTimestamp { .. }
            | AvmError::Json(_)
            | AvmError::Regex(_) => PyValueError::new_err(err.to_string()),
            AvmError::RetriesExhausted { .. } => PyTimeoutError::new_err(err.to_string()),
            AvmError::Io(_) => PyIOError::new_err(err.to_string()),
        }
    }
}

pub type AvmResult<T> = Result<T, AvmError>;
