//! Python bindings: JSON in, JSON out.

use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::config::PipelineConfig;
use crate::errors::{AvmError, AvmResult};
use crate::models::{Batch, Record};
use crate::pipeline::{Pipeline, StaticSource};
use crate::store::summary::TableSummaryStore;
use crate::store::tables::SqliteTableStore;
use crate::verifier::FormatVerifier;

fn load_config(config_json: Option<&str>) -> AvmResult<PipelineConfig> {
    match config_json {
        Some(text) => PipelineConfig::from_json_str(text),
        None => Ok(PipelineConfig::default()),
    }
}

/// Run the whole pipeline over already scraped listings and return the run
/// report as JSON.
#[pyfunction]
#[pyo3(signature = (db_path, records_json, config_json=None, source_url="inline"))]
pub fn run_pipeline(
    db_path: &str,
    records_json: &str,
    config_json: Option<&str>,
    source_url: &str,
) -> PyResult<String> {
    let records: Vec<Record> = serde_json::from_str(records_json).map_err(AvmError::from)?;
    let tables = SqliteTableStore::open(db_path)?;
    let pipeline = Pipeline::new(&tables, load_config(config_json)?)?;
    let mut source = StaticSource::new(source_url, records);
    let report = pipeline.run(&mut source)?;
    Ok(serde_json::to_string(&report).map_err(AvmError::from)?)
}

/// Verify normalized records against the stored summary, persist the
/// updated summary and return the verification report as JSON.
#[pyfunction]
#[pyo3(signature = (db_path, records_json, config_json=None))]
pub fn verify_records(
    db_path: &str,
    records_json: &str,
    config_json: Option<&str>,
) -> PyResult<String> {
    let records: Vec<Record> = serde_json::from_str(records_json).map_err(AvmError::from)?;
    let config = load_config(config_json)?;
    let tables = SqliteTableStore::open(db_path)?;
    let summaries = TableSummaryStore::new(&tables, config.summary.dataset.as_str());
    let report = FormatVerifier::new(config.verifier).verify_and_persist(&summaries, &Batch::new(records))?;
    Ok(serde_json::to_string(&report).map_err(AvmError::from)?)
}

#[pymodule]
fn rentavm_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(run_pipeline, m)?)?;
    m.add_function(wrap_pyfunction!(verify_records, m)?)?;
    m.add("DEFAULT_P_VALUE", crate::config::DEFAULT_P_VALUE)?;
    m.add(
        "DEFAULT_MISSING_VALUE_DEVIATION",
        crate::config::DEFAULT_MISSING_VALUE_DEVIATION,
    )?;
    m.add("DEFAULT_RETENTION_DAYS", crate::config::DEFAULT_RETENTION_DAYS)?;
    Ok(())
}
