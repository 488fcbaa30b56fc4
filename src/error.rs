//! Error taxonomy shared by the import and generation paths.
//!
//! Per-cell decode failures are absent: those are recorded in an
//! [`ImportLog`](crate::import_log::ImportLog) and never surface as `Err`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SheetError {
    /// The sheet answered with a sign-in page instead of CSV.
    #[error("sign-in required: the spreadsheet is not published to anyone with the link")]
    SignInRequired,
    #[error("fetch failed: {0}")]
    Transport(String),
    /// The fetched or cached text was empty; the table is left as it was.
    #[error("sheet text for '{0}' is empty")]
    EmptySheet(String),
    #[error("cached resource not found: {}", .0.display())]
    MissingResource(PathBuf),
    #[error("operation canceled")]
    Canceled,
    #[error("future already resolved ({0})")]
    AlreadyResolved(&'static str),
    #[error("import aborted: {0}")]
    ImportAborted(String),
    #[error("table '{0}' has no key column named 'id'")]
    MissingKeyColumn(String),
    #[error("output directory '{}' contains invalid path characters", .0.display())]
    InvalidOutputPath(PathBuf),
    #[error("file name '{0}' is not a valid file name")]
    InvalidFileName(String),
    #[error("enum type '{0}' is not registered")]
    UnresolvedEnum(String),
}

impl SheetError {
    /// Fetch-side failures that cancel a future without reaching binding.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            SheetError::SignInRequired
                | SheetError::Transport(_)
                | SheetError::EmptySheet(_)
                | SheetError::MissingResource(_)
                | SheetError::Canceled
        )
    }
}

pub type SheetResult<T> = std::result::Result<T, SheetError>;
