//! One daily run: fetch, normalize, verify, clean.

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info};

use crate::cleaner::{Cleaner, EtlReport};
use crate::config::PipelineConfig;
use crate::errors::AvmResult;
use crate::models::{success_message, Record};
use crate::normalizer::RecordNormalizer;
use crate::retry::with_retries;
use crate::store::summary::TableSummaryStore;
use crate::store::tables::TableStore;
use crate::verifier::{FormatVerifier, VerificationReport};

pub const RUN_SUCCESS: &str = "Successfully scraped, uploaded and verified the data.";

/// The scraper side of a run. `fetch` may fail transiently; the pipeline
/// retries it.
pub trait ListingSource {
    fn source_url(&self) -> &str;
    fn fetch(&mut self) -> AvmResult<Vec<Record>>;
}

/// A source that hands out a fixed set of already scraped listings.
#[derive(Clone, Debug, Default)]
pub struct StaticSource {
    pub url: String,
    pub records: Vec<Record>,
}

impl StaticSource {
    pub fn new(url: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            url: url.into(),
            records,
        }
    }
}

impl ListingSource for StaticSource {
    fn source_url(&self) -> &str {
        &self.url
    }

    fn fetch(&mut self) -> AvmResult<Vec<Record>> {
        Ok(self.records.clone())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub message: String,
    pub verification: VerificationReport,
    pub etl: EtlReport,
}

pub struct Pipeline<'a, T: TableStore> {
    config: PipelineConfig,
    tables: &'a T,
    now: Option<NaiveDateTime>,
}

impl<'a, T: TableStore> Pipeline<'a, T> {
    pub fn new(tables: &'a T, config: PipelineConfig) -> AvmResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tables,
            now: None,
        })
    }

    /// Pin the scrape time instead of reading the local clock.
    pub fn scraped_at(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, source: &mut impl ListingSource) -> AvmResult<RunReport> {
        let now = self.now.unwrap_or_else(|| Local::now().naive_local());
        let url = source.source_url().to_string();

        info!("Started the scraping process for {url}.");
        let raw = with_retries(self.config.retry.max_retries, &url, |attempt| {
            debug!("Fetching listings, attempt {attempt}.");
            source.fetch()
        })?;
        info!("Fetched {} listings.", raw.len());

        let normalizer = RecordNormalizer::new(self.config.normalizer.clone())?;
        let batch = normalizer.normalize_batch(&raw, Some(now));

        let summaries = TableSummaryStore::new(self.tables, self.config.summary.dataset.as_str());
        let verification = FormatVerifier::new(self.config.verifier.clone())
            .verify_and_persist(&summaries, &batch)?;

        let cleaner = Cleaner::with_today(self.tables, self.config.cleaner.clone(), now.date());
        let etl = cleaner.etl(batch)?;

        info!("{RUN_SUCCESS}");
        Ok(RunReport {
            message: success_message(RUN_SUCCESS),
            verification,
            etl,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
