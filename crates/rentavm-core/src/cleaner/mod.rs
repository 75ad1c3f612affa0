//! Dataset merge and retention.
//!
//! One run of the cleaner:
//! 1. `extract` every daily snapshot (`<prefix>_YYYY_MM_DD`) still in the
//!    dataset;
//! 2. `transform` the new batch: rename columns, stack it on the snapshots,
//!    keep the latest scrape of every distinct row and drop rows outside the
//!    retention window;
//! 3. `load` the result into the master table (append, create, or full
//!    rewrite on a schema change), upload it as today's snapshot and delete
//!    the snapshots read in step 1.

pub mod transform;

use chrono::{Local, NaiveDate};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::CleanerSettings;
use crate::errors::{AvmError, AvmResult};
use crate::models::{success_message, Batch, TableRef, WriteMode, WriteOutcome};
use crate::store::tables::TableStore;

pub const ETL_SUCCESS: &str = "Successfully cleaned up the table store.";

/// Snapshots read by [`Cleaner::extract`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extracted {
    pub batch: Batch,
    /// Snapshot table ids, without the dataset prefix.
    pub table_ids: Vec<String>,
}

/// Which of the three master-table paths a load took.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterOutcome {
    Appended,
    /// The master table did not exist and was created from the batch.
    Created,
    /// The batch brought new columns; the master table was read, extended
    /// and written back whole.
    Rewritten,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EtlReport {
    /// `None` when there was nothing to write.
    pub master: Option<MasterOutcome>,
    pub snapshot_table: Option<String>,
    pub deleted_tables: Vec<String>,
    pub rows: usize,
    pub message: String,
}

pub struct Cleaner<'a, T: TableStore> {
    tables: &'a T,
    settings: CleanerSettings,
    today: NaiveDate,
}

impl<'a, T: TableStore> Cleaner<'a, T> {
    pub fn new(tables: &'a T, settings: CleanerSettings) -> Self {
        Self::with_today(tables, settings, Local::now().date_naive())
    }

    /// Cleaner with a fixed notion of "today", for snapshot naming and
    /// retention.
    pub fn with_today(tables: &'a T, settings: CleanerSettings, today: NaiveDate) -> Self {
        Self {
            tables,
            settings,
            today,
        }
    }

    pub fn settings(&self) -> &CleanerSettings {
        &self.settings
    }

    fn dataset(&self) -> &str {
        &self.settings.table_names.name_dataset
    }

    pub fn snapshot_pattern(&self) -> AvmResult<Regex> {
        let prefix = regex::escape(&self.settings.table_names.name_table_raw_listings);
        Ok(Regex::new(&format!(r"^{prefix}_\d{{4}}_\d{{2}}_\d{{2}}$"))?)
    }

    /// Name of today's snapshot table.
    pub fn snapshot_table_name(&self) -> String {
        format!(
            "{}_{}",
            self.settings.table_names.name_table_raw_listings,
            self.today.format("%Y_%m_%d")
        )
    }

    pub fn extract(&self) -> AvmResult<Extracted> {
        info!("Extracting data from the table store.");
        let pattern = self.snapshot_pattern()?;
        let table_ids: Vec<String> = self
            .tables
            .list_tables(self.dataset())?
            .into_iter()
            .filter(|id| pattern.is_match(id))
            .collect();

        let mut batch = Batch::default();
        for id in &table_ids {
            if let Some(snapshot) = self.tables.read(&TableRef::new(self.dataset(), id.as_str()))? {
                batch = batch.concat(snapshot);
            }
        }
        info!("Found these most recent tables: {:?}", table_ids);
        Ok(Extracted { batch, table_ids })
    }

    pub fn transform(&self, previous: Batch, mut batch: Batch) -> AvmResult<Batch> {
        info!("Processing the input data and joining with the most recent snapshots.");
        batch.rename_columns(&self.settings.column_names);
        let stacked = previous.concat(batch);
        let date_column = self.settings.date_column.as_str();

        let mut current = transform::dedup_latest(stacked, date_column)?;
        if let Some(days) = self.settings.retention_days {
            let before = current.len();
            current = transform::apply_retention(current, date_column, self.today, days)?;
            if before > current.len() {
                info!(
                    "Dropped {} rows older than {} days.",
                    before - current.len(),
                    days
                );
            }
        }
        info!("Successfully transformed the data: {} rows.", current.len());
        Ok(current)
    }

    fn write_master(&self, current: &Batch) -> AvmResult<MasterOutcome> {
        let master = TableRef::new(
            self.dataset(),
            self.settings.table_names.name_table_raw_listings_master.as_str(),
        );
        match self.tables.write(&master, current, WriteMode::Append)? {
            WriteOutcome::Written => {
                info!("Appended current dataset to the existing master dataset.");
                Ok(MasterOutcome::Appended)
            }
            WriteOutcome::TableMissing => {
                warn!("No master dataset was found, uploading current data as master dataset.");
                self.replace(&master, current)?;
                Ok(MasterOutcome::Created)
            }
            WriteOutcome::SchemaConflict => {
                warn!("New columns were found, downloading and re-uploading the master dataset.");
                let merged = match self.tables.read(&master)? {
                    Some(existing) => existing.concat(current.clone()),
                    None => current.clone(),
                };
                self.replace(&master, &merged)?;
                Ok(MasterOutcome::Rewritten)
            }
        }
    }

    fn replace(&self, table: &TableRef, batch: &Batch) -> AvmResult<()> {
        match self.tables.write(table, batch, WriteMode::Replace)? {
            WriteOutcome::Written => Ok(()),
            outcome => Err(AvmError::UnexpectedWriteOutcome {
                table: table.qualified(),
                outcome,
            }),
        }
    }

    /// Write `current` to the master table and as today's snapshot, then
    /// delete `previous_ids`. Today's snapshot is never deleted.
    pub fn load(&self, current: &Batch, previous_ids: &[String]) -> AvmResult<EtlReport> {
        let snapshot_name = self.snapshot_table_name();

        let (master, snapshot_table) = if current.is_empty() {
            warn!("No rows left after transforming, skipping the master and snapshot upload.");
            (None, None)
        } else {
            let master = self.write_master(current)?;
            info!("Uploading current daily data.");
            let snapshot = TableRef::new(self.dataset(), snapshot_name.as_str());
            self.replace(&snapshot, current)?;
            (Some(master), Some(snapshot.qualified()))
        };

        let stale: Vec<String> = previous_ids
            .iter()
            .filter(|id| **id != snapshot_name)
            .cloned()
            .collect();
        if !stale.is_empty() {
            info!("Deleting older daily datasets: {:?}.", stale);
            for id in &stale {
                self.tables.delete(&TableRef::new(self.dataset(), id.as_str()))?;
            }
        }

        info!("{ETL_SUCCESS}");
        Ok(EtlReport {
            master,
            snapshot_table,
            deleted_tables: stale,
            rows: current.len(),
            message: success_message(ETL_SUCCESS),
        })
    }

    pub fn etl(&self, batch: Batch) -> AvmResult<EtlReport> {
        let Extracted { batch: previous, table_ids } = self.extract()?;
        let current = self.transform(previous, batch)?;
        self.load(&current, &table_ids)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
