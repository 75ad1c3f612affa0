//! Pipeline configuration, loaded once per run from a JSON document.
//!
//! Every field has a default, so `{}` is a valid configuration.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{AvmError, AvmResult};

pub const DEFAULT_P_VALUE: f64 = 0.05;
pub const DEFAULT_MISSING_VALUE_DEVIATION: f64 = 0.1;
pub const DEFAULT_RETENTION_DAYS: i64 = 7;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DATE_SCRAPED_FIELD: &str = "DateScraped";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub verifier: VerifierSettings,
    pub cleaner: CleanerSettings,
    pub summary: SummarySettings,
    pub normalizer: NormalizerSettings,
    pub retry: RetrySettings,
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> AvmResult<Self> {
        let config: PipelineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> AvmResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Reject settings that would make the checks meaningless.
    pub fn validate(&self) -> AvmResult<()> {
        let p = self.verifier.p_value;
        if !(p > 0.0 && p < 1.0) {
            return Err(AvmError::Config(format!(
                "verifier.p_value must lie in (0, 1), got {p}"
            )));
        }
        let deviation = self.verifier.missing_value_deviation;
        if !(0.0..=1.0).contains(&deviation) {
            return Err(AvmError::Config(format!(
                "verifier.missing_value_deviation must lie in [0, 1], got {deviation}"
            )));
        }
        if let Some(days) = self.cleaner.retention_days {
            if days < 0 {
                return Err(AvmError::Config(format!(
                    "cleaner.retention_days must be non-negative, got {days}"
                )));
            }
        }
        let names = &self.cleaner.table_names;
        for (key, value) in [
            ("name_dataset", &names.name_dataset),
            ("name_table_raw_listings", &names.name_table_raw_listings),
            (
                "name_table_raw_listings_master",
                &names.name_table_raw_listings_master,
            ),
            ("summary.dataset", &self.summary.dataset),
            ("cleaner.date_column", &self.cleaner.date_column),
        ] {
            if value.trim().is_empty() {
                return Err(AvmError::Config(format!("{key} must not be empty")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierSettings {
    /// Fields expected to hold free text. Any other text-valued field is
    /// reported as type drift.
    pub string_fields: Vec<String>,
    /// A field fails the t-test when its p-value is at or below this limit.
    pub p_value: f64,
    /// A field fails the missing-value check when its missing rate moved by
    /// at least this much.
    pub missing_value_deviation: f64,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            string_fields: Vec::new(),
            p_value: DEFAULT_P_VALUE,
            missing_value_deviation: DEFAULT_MISSING_VALUE_DEVIATION,
        }
    }
}

// ---------------------------------------------------------------------------
// Cleaner
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub name_dataset: String,
    /// Prefix of the daily snapshot tables (`<prefix>_YYYY_MM_DD`).
    pub name_table_raw_listings: String,
    pub name_table_raw_listings_master: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            name_dataset: "data_listings".to_string(),
            name_table_raw_listings: "raw_listings".to_string(),
            name_table_raw_listings_master: "raw_listings_master".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerSettings {
    /// Incoming column name -> stored column name.
    pub column_names: IndexMap<String, String>,
    pub table_names: TableNames,
    pub date_column: String,
    /// `None` keeps every deduplicated row regardless of age.
    pub retention_days: Option<i64>,
}

impl Default for CleanerSettings {
    fn default() -> Self {
        Self {
            column_names: IndexMap::new(),
            table_names: TableNames::default(),
            date_column: DATE_SCRAPED_FIELD.to_string(),
            retention_days: Some(DEFAULT_RETENTION_DAYS),
        }
    }
}

// ---------------------------------------------------------------------------
// Summary store
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub dataset: String,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            dataset: "data_info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Split one text field into several, e.g. a listing title into city,
/// neighbourhood and street.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitField {
    pub source: String,
    pub separator: String,
    pub targets: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerSettings {
    pub integer_fields: Vec<String>,
    pub float_fields: Vec<String>,
    pub categorical_fields: Vec<String>,
    /// Multi-valued fields expanded into `Field_Item = 1` columns.
    pub list_fields: Vec<String>,
    pub split_fields: Vec<SplitField>,
    pub date_field: String,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            integer_fields: Vec::new(),
            float_fields: Vec::new(),
            categorical_fields: Vec::new(),
            list_fields: Vec::new(),
            split_fields: Vec::new(),
            date_field: DATE_SCRAPED_FIELD.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
