//! Format verifier: drift detection of a scraped batch against history.
//!
//! A run is a single linear pass. Names, then types, then statistics are
//! checked and every finding is reported; none of them aborts the run. Only
//! the name and statistics checks change the [`HistoricalSummary`], which is
//! passed in by value and handed back updated. Persisting it is the
//! caller's job (see [`FormatVerifier::verify_and_persist`]).

pub mod names;
pub mod stats;
pub mod ttest;
pub mod types;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::VerifierSettings;
use crate::errors::AvmResult;
use crate::models::{Batch, ColumnKind, HistoricalSummary};
use crate::store::summary::SummaryStore;

pub use names::NameReport;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatisticsReport {
    /// Fields seen for the first time; their batch statistics were stored as is.
    pub new_fields: Vec<String>,
    /// Fields merged into existing history.
    pub updated_fields: Vec<String>,
    pub failed_t_test: Vec<String>,
    pub failed_missing: Vec<String>,
    /// Fields with history that came back null on every row. Only their
    /// missing rate and total row count were updated.
    pub all_missing_fields: Vec<String>,
    /// p-value per updated field; `None` when the test is undefined.
    pub p_values: IndexMap<String, Option<f64>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VerificationReport {
    pub names: NameReport,
    pub unexpected_string_fields: Vec<String>,
    pub statistics: StatisticsReport,
}

impl VerificationReport {
    pub fn has_drift(&self) -> bool {
        self.names.has_drift()
            || !self.unexpected_string_fields.is_empty()
            || !self.statistics.failed_t_test.is_empty()
            || !self.statistics.failed_missing.is_empty()
    }
}

pub struct FormatVerifier {
    settings: VerifierSettings,
}

impl FormatVerifier {
    pub fn new(settings: VerifierSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &VerifierSettings {
        &self.settings
    }

    pub fn check_names(&self, summary: &mut HistoricalSummary, batch: &Batch) -> NameReport {
        let report = names::check_names(summary, batch.columns());

        if report.missing_variables.is_empty() {
            info!("Found all of the expected variables.");
        } else {
            warn!(
                "Variables expected, but not found in the dataset: {:?}",
                report.missing_variables
            );
        }
        if report.new_variables.is_empty() {
            info!("Found no new variables.");
        } else {
            warn!("Found previously unseen variables: {:?}", report.new_variables);
        }
        if report.new_values.is_empty() {
            info!("Found no new values.");
        } else {
            warn!("Found previously unseen value names: {:?}", report.new_values);
        }
        report
    }

    pub fn check_types(&self, batch: &Batch) -> Vec<String> {
        let unexpected = types::check_types(batch, &self.settings.string_fields);
        if unexpected.is_empty() {
            info!("Found no new string-typed variables.");
        } else {
            warn!(
                "Found variables not expected to hold strings: {:?}",
                unexpected
            );
        }
        unexpected
    }

    /// Test every numeric field with history, then merge the batch into it.
    ///
    /// Both tests compare against the historical statistics as they were
    /// before this batch is merged in.
    pub fn check_statistics(
        &self,
        summary: &mut HistoricalSummary,
        batch: &Batch,
    ) -> StatisticsReport {
        let mut report = StatisticsReport::default();

        for (field, batch_stats) in stats::describe_batch(batch) {
            let Some(historical) = summary.statistics.get_mut(&field) else {
                report.new_fields.push(field.clone());
                summary.statistics.insert(field, batch_stats);
                continue;
            };

            let p_value = ttest::t_test(historical, &batch_stats);
            if matches!(p_value, Some(p) if p <= self.settings.p_value) {
                report.failed_t_test.push(field.clone());
            }
            let missing_difference = (historical.missing_rate - batch_stats.missing_rate).abs();
            if missing_difference >= self.settings.missing_value_deviation {
                report.failed_missing.push(field.clone());
            }

            *historical = stats::merge(historical, &batch_stats);
            report.p_values.insert(field.clone(), p_value);
            report.updated_fields.push(field);
        }

        let total = batch.len() as u64;
        for field in batch.columns() {
            if total == 0 || batch.column_kind(field) != ColumnKind::Empty {
                continue;
            }
            let Some(historical) = summary.statistics.get_mut(field) else {
                continue;
            };
            let batch_stats = stats::describe_all_missing(total);
            let missing_difference = (historical.missing_rate - batch_stats.missing_rate).abs();
            if missing_difference >= self.settings.missing_value_deviation {
                report.failed_missing.push(field.clone());
            }
            *historical = stats::merge_missing(historical, &batch_stats);
            report.all_missing_fields.push(field.clone());
        }
        if !report.all_missing_fields.is_empty() {
            warn!(
                "Found variables with no values in this batch: {:?}",
                report.all_missing_fields
            );
        }

        info!("Saved new statistics for variables: {:?}", report.new_fields);
        info!("Updated statistics for all existing variables.");

        if report.failed_t_test.is_empty() {
            info!(
                "All variables passed the statistical tests with a p-value of {}.",
                self.settings.p_value
            );
        } else {
            warn!(
                "Found variables that have failed the statistical test with p-value of {}: {:?}",
                self.settings.p_value, report.failed_t_test
            );
        }
        if report.failed_missing.is_empty() {
            info!(
                "All variables passed the missing value check with deviation of {}.",
                self.settings.missing_value_deviation
            );
        } else {
            warn!(
                "Found variables that have failed the missing value check with deviation of {}: {:?}",
                self.settings.missing_value_deviation, report.failed_missing
            );
        }
        report
    }

    /// Run all checks, returning the updated summary with the findings.
    pub fn verify(
        &self,
        mut summary: HistoricalSummary,
        batch: &Batch,
    ) -> (HistoricalSummary, VerificationReport) {
        info!("Executing data checks on {} records.", batch.len());
        let names = self.check_names(&mut summary, batch);
        let unexpected_string_fields = self.check_types(batch);
        let statistics = self.check_statistics(&mut summary, batch);
        info!("Successfully executed all the data checks.");

        (
            summary,
            VerificationReport {
                names,
                unexpected_string_fields,
                statistics,
            },
        )
    }

    /// Load the summary, verify `batch` against it and save it back.
    ///
    /// The summary is saved whether or not drift was found.
    pub fn verify_and_persist(
        &self,
        store: &impl SummaryStore,
        batch: &Batch,
    ) -> AvmResult<VerificationReport> {
        let summary = store.load()?;
        let (summary, report) = self.verify(summary, batch);
        store.save(&summary)?;
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
