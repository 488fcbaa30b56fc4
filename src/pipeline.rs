//! Fetch, tokenize, bind, report.
//!
//! [`ImportPipeline`] is the only component that talks to a
//! [`SheetFetcher`]. Fetches are awaited through the token's
//! [`guard`](CancelToken::guard), so cancellation is observed on every poll
//! and a canceled or failed fetch never reaches binding.

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::Context;
use clap::ValueEnum;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    binder::RecordBinder,
    csv_table::{CsvTable, Row},
    error::{SheetError, SheetResult},
    future::{AsyncFuture, CancelToken},
    import_log::{ImportLog, LogLevel},
    master::MasterTable,
    output::{self, OutputRules},
    source::{CsvCache, SheetFetcher, SheetLookup, SheetRef, UrlTemplates},
};

/// Outcome of one successful table import.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub table_name: String,
    /// Data rows handed to the binder after filtering.
    pub rows: usize,
    /// Records kept after duplicate-key handling.
    pub imported: usize,
    pub log: ImportLog,
    /// Rendered report, present when the run reached the log threshold.
    pub rendered: Option<String>,
}

impl ImportReport {
    pub fn max_severity(&self) -> Option<LogLevel> {
        self.log.max_severity()
    }
}

/// Where [`ImportPipeline::import`] reads a table's CSV from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ImportSource {
    /// Download the published tab.
    #[default]
    Spreadsheet,
    /// Read the snapshot a [`CsvCache`] holds under the table name.
    Cached,
}

#[derive(Debug, Clone, Default)]
pub struct ImportPipeline {
    csv: CsvTable,
    templates: UrlTemplates,
    lookup: SheetLookup,
    threshold: LogLevel,
    source: ImportSource,
}

impl ImportPipeline {
    pub fn new(csv: CsvTable, templates: UrlTemplates) -> Self {
        Self {
            csv,
            templates,
            lookup: SheetLookup::default(),
            threshold: LogLevel::default(),
            source: ImportSource::default(),
        }
    }

    pub fn with_source(mut self, source: ImportSource) -> Self {
        self.source = source;
        self
    }

    pub fn source(&self) -> ImportSource {
        self.source
    }

    pub fn with_lookup(mut self, lookup: SheetLookup) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_threshold(mut self, threshold: LogLevel) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn csv(&self) -> &CsvTable {
        &self.csv
    }

    pub fn templates(&self) -> &UrlTemplates {
        &self.templates
    }

    pub fn export_url(&self, sheet: &SheetRef) -> String {
        self.templates.export_url(self.lookup, sheet)
    }

    /// Imports CSV text whose first line is the header.
    ///
    /// Empty text is rejected before binding, so the table keeps its
    /// current records.
    pub fn import_from_csv<B: RecordBinder>(
        &self,
        table: &mut MasterTable<B>,
        text: &str,
    ) -> SheetResult<ImportReport> {
        if text.trim().is_empty() {
            warn!("Skipping import of '{}': sheet text is empty", table.name());
            return Err(SheetError::EmptySheet(table.name().to_string()));
        }
        let rows = self.csv.parse(text, true);
        self.import_rows(table, &rows)
    }

    /// Imports already tokenized data rows (header excluded).
    pub fn import_rows<B: RecordBinder>(
        &self,
        table: &mut MasterTable<B>,
        rows: &[Row],
    ) -> SheetResult<ImportReport> {
        let started = Instant::now();
        let mut log = ImportLog::new(table.name(), rows.len(), self.threshold);
        let outcome = table.import(rows, &mut log);
        let rendered = log.export();
        let imported = outcome?;
        debug!(
            "Bound {} row(s) into '{}' in {:.2?}",
            rows.len(),
            table.name(),
            started.elapsed()
        );
        Ok(ImportReport {
            table_name: table.name().to_string(),
            rows: rows.len(),
            imported,
            log,
            rendered,
        })
    }

    /// Imports the snapshot `cache` holds under the table's name.
    pub fn import_from_cache<B: RecordBinder, C: CsvCache>(
        &self,
        table: &mut MasterTable<B>,
        cache: &C,
    ) -> SheetResult<ImportReport> {
        let name = table.name().to_string();
        let text = cache
            .load_cached_text(&name)
            .ok_or_else(|| SheetError::MissingResource(PathBuf::from(&name)))?;
        info!("Importing '{name}' from cached snapshot");
        self.import_from_csv(table, &text)
    }

    /// Imports from the configured [`ImportSource`]: the published tab
    /// through `fetcher`, or the snapshot `cache` holds.
    pub async fn import<B, F, C>(
        &self,
        table: &mut MasterTable<B>,
        fetcher: &F,
        cache: &C,
        cancel: &CancelToken,
    ) -> SheetResult<ImportReport>
    where
        B: RecordBinder,
        F: SheetFetcher,
        C: CsvCache,
    {
        match self.source {
            ImportSource::Spreadsheet => {
                self.import_from_spreadsheet(table, fetcher, cancel).await
            }
            ImportSource::Cached => self.import_from_cache(table, cache),
        }
    }

    /// Downloads the table's tab and imports it.
    pub async fn import_from_spreadsheet<B: RecordBinder, F: SheetFetcher>(
        &self,
        table: &mut MasterTable<B>,
        fetcher: &F,
        cancel: &CancelToken,
    ) -> SheetResult<ImportReport> {
        let sheet = table.sheet_ref();
        let text = self.fetch_text(fetcher, &sheet, cancel).await?;
        info!("Importing '{}' from spreadsheet {}", table.name(), sheet.spreadsheet_id);
        self.import_from_csv(table, &text)
    }

    /// Fetches every table's tab concurrently, then binds each in turn.
    ///
    /// Outcomes are returned in input order; one table failing does not stop
    /// the others.
    pub async fn import_all<B: RecordBinder, F: SheetFetcher>(
        &self,
        tables: &mut [MasterTable<B>],
        fetcher: &F,
        cancel: &CancelToken,
    ) -> Vec<SheetResult<ImportReport>> {
        let futures = tables
            .iter()
            .map(|table| {
                let url = self.export_url(&table.sheet_ref());
                debug!("Queueing fetch of '{}' from {url}", table.name());
                fetcher.fetch(&url, cancel)
            })
            .collect();
        let bodies = match cancel.guard(AsyncFuture::join_all(futures)).await {
            Ok(bodies) => bodies,
            Err(err) => {
                warn!("Batch import stopped: {err}");
                return tables.iter().map(|_| Err(err.clone())).collect();
            }
        };

        tables
            .iter_mut()
            .zip(bodies)
            .map(|(table, body)| {
                if cancel.is_cancelled() {
                    return Err(SheetError::Canceled);
                }
                let text = body.and_then(|body| self.templates.check_body(body))?;
                self.import_from_csv(table, &text)
            })
            .collect()
    }

    /// Fetches a tab and tokenizes it with its header row kept, as the
    /// schema inference path needs.
    pub async fn fetch_rows<F: SheetFetcher>(
        &self,
        fetcher: &F,
        sheet: &SheetRef,
        cancel: &CancelToken,
    ) -> SheetResult<Vec<Row>> {
        let text = self.fetch_text(fetcher, sheet, cancel).await?;
        Ok(self.csv.parse(&text, false))
    }

    /// Downloads a tab and writes it, header included, to
    /// `<dir>/<table_name>.csv` so a [`CsvCache`] over `dir` can import it
    /// later.
    pub async fn export_snapshot<F: SheetFetcher>(
        &self,
        fetcher: &F,
        sheet: &SheetRef,
        cancel: &CancelToken,
        rules: &OutputRules,
        dir: &Path,
        table_name: &str,
    ) -> anyhow::Result<PathBuf> {
        let rows = self
            .fetch_rows(fetcher, sheet, cancel)
            .await
            .with_context(|| format!("Downloading sheet for '{table_name}'"))?;
        if rows.is_empty() {
            return Err(SheetError::EmptySheet(table_name.to_string()).into());
        }
        output::write_snapshot(rules, dir, table_name, &rows)
    }

    async fn fetch_text<F: SheetFetcher>(
        &self,
        fetcher: &F,
        sheet: &SheetRef,
        cancel: &CancelToken,
    ) -> SheetResult<String> {
        let url = self.export_url(sheet);
        debug!("Fetching {url}");
        let body = cancel.guard(fetcher.fetch(&url, cancel)).await?;
        let text = self.templates.check_body(body)?;
        if cancel.is_cancelled() {
            return Err(SheetError::Canceled);
        }
        Ok(text)
    }
}
