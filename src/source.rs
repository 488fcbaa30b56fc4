//! Where sheet text comes from: URL building, the fetch collaborator, and
//! cached CSV snapshots on disk.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Result, anyhow};
use clap::ValueEnum;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::{SheetError, SheetResult},
    future::{AsyncFuture, CancelToken},
};

/// Appears in the body Google serves instead of CSV for unpublished sheets.
pub const SIGN_IN_MARKER: &str = "https://accounts.google.com/v3/signin/";

const EXPORT_BY_ID: &str =
    "https://docs.google.com/spreadsheets/d/{spreadsheet_id}/export?format=csv&gid={sheet_id}";
const EXPORT_BY_NAME: &str =
    "https://docs.google.com/spreadsheets/d/{spreadsheet_id}/gviz/tq?tqx=out:csv&sheet={sheet_name}";
const EDIT: &str = "https://docs.google.com/spreadsheets/d/{spreadsheet_id}/edit?gid={sheet_id}";

/// How a tab is addressed in export URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SheetLookup {
    #[default]
    Id,
    Name,
}

/// Identifies one tab of a spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRef {
    pub spreadsheet_id: String,
    pub sheet_id: String,
    pub sheet_name: String,
}

impl SheetRef {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        sheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
    ) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_id: sheet_id.into(),
            sheet_name: sheet_name.into(),
        }
    }
}

/// URL templates and the sign-in marker, built once and passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplates {
    pub export_by_id: String,
    pub export_by_name: String,
    pub edit: String,
    pub sign_in_marker: String,
}

impl Default for UrlTemplates {
    fn default() -> Self {
        Self {
            export_by_id: EXPORT_BY_ID.to_string(),
            export_by_name: EXPORT_BY_NAME.to_string(),
            edit: EDIT.to_string(),
            sign_in_marker: SIGN_IN_MARKER.to_string(),
        }
    }
}

impl UrlTemplates {
    pub fn export_url(&self, lookup: SheetLookup, sheet: &SheetRef) -> String {
        let template = match lookup {
            SheetLookup::Id => &self.export_by_id,
            SheetLookup::Name => &self.export_by_name,
        };
        fill(template, sheet)
    }

    pub fn edit_url(&self, sheet: &SheetRef) -> String {
        fill(&self.edit, sheet)
    }

    /// Rejects a sign-in page served in place of CSV.
    pub fn check_body(&self, body: String) -> SheetResult<String> {
        if body.contains(self.sign_in_marker.as_str()) {
            Err(SheetError::SignInRequired)
        } else {
            Ok(body)
        }
    }
}

fn fill(template: &str, sheet: &SheetRef) -> String {
    template
        .replace("{spreadsheet_id}", &sheet.spreadsheet_id)
        .replace("{sheet_id}", &sheet.sheet_id)
        .replace("{sheet_name}", &sheet.sheet_name)
}

/// Network collaborator. Implementations resolve the returned future exactly
/// once, with the body or with a fetch error, and should stop early once
/// `cancel` fires.
pub trait SheetFetcher {
    fn fetch(&self, url: &str, cancel: &CancelToken) -> AsyncFuture<String>;
}

/// Synchronous source of previously exported CSV snapshots.
pub trait CsvCache {
    fn load_cached_text(&self, name: &str) -> Option<String>;
}

/// Reads `<root>/<name>.csv`, decoding with the configured encoding unless
/// the file starts with a byte-order mark.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    root: PathBuf,
    encoding: &'static Encoding,
}

impl DirectoryCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            encoding: UTF_8,
        }
    }

    pub fn with_encoding(mut self, label: Option<&str>) -> Result<Self> {
        self.encoding = resolve_encoding(label)?;
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.csv"))
    }
}

impl CsvCache for DirectoryCache {
    fn load_cached_text(&self, name: &str) -> Option<String> {
        let path = self.path_for(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!("No cached snapshot at {path:?}: {err}");
                return None;
            }
        };
        let (text, used, had_errors) = self.encoding.decode(&bytes);
        if had_errors {
            warn!(
                "Cached snapshot {path:?} contained invalid {} sequences",
                used.name()
            );
        }
        Some(text.into_owned())
    }
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(UTF_8),
    }
}

#[cfg(feature = "http")]
pub use http::HttpFetcher;

#[cfg(feature = "http")]
mod http {
    use std::thread;

    use log::info;

    use super::SheetFetcher;
    use crate::{
        error::SheetError,
        future::{AsyncFuture, CancelToken, Promise},
    };

    /// Blocking `reqwest` client driven on a worker thread per request.
    #[derive(Debug, Clone, Default)]
    pub struct HttpFetcher {
        client: reqwest::blocking::Client,
    }

    impl HttpFetcher {
        pub fn new(client: reqwest::blocking::Client) -> Self {
            Self { client }
        }
    }

    impl SheetFetcher for HttpFetcher {
        fn fetch(&self, url: &str, cancel: &CancelToken) -> AsyncFuture<String> {
            let promise = Promise::new();
            let handle = promise.handle();
            let client = self.client.clone();
            let url = url.to_string();
            let cancel = cancel.clone();
            thread::spawn(move || {
                info!("Fetching {url}");
                let outcome = client
                    .get(&url)
                    .send()
                    .and_then(|response| response.error_for_status())
                    .and_then(|response| response.text());
                let _ = if cancel.is_cancelled() {
                    promise.cancel(SheetError::Canceled)
                } else {
                    match outcome {
                        Ok(body) => promise.complete(body),
                        Err(err) => promise.cancel(SheetError::Transport(err.to_string())),
                    }
                };
            });
            handle
        }
    }
}
