//! Custom error types for the rpt-codec crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum RptError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a report container, or its fixed header is damaged.
    #[error("Invalid container format: {0}")]
    Format(String),

    /// A required table could not be located or read.
    #[error("{table} table error: {reason}")]
    Table { table: &'static str, reason: String },

    /// A single page or attachment chunk failed to inflate, or inflated to the wrong size.
    #[error("Decompression failed for {entry}: {reason}")]
    Decompression { entry: String, reason: String },

    /// The builder was handed an inconsistent request.
    #[error("Invalid build request: {0}")]
    Validation(String),

    /// A page selection resolved to nothing.
    #[error("No pages to extract: {0}")]
    NoPagesSelected(String),

    /// None of the requested section ids exist in the container.
    #[error("None of the requested sections {requested:?} exist; known sections: {known}")]
    UnknownSections { requested: Vec<u32>, known: String },

    /// A page number outside `1..=page_count` was requested.
    #[error("Page {page} is out of range (container has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    /// Work was abandoned before it started because the batch was cancelled.
    #[error("Cancelled before processing")]
    Cancelled,
}

impl RptError {
    pub(crate) fn table(table: &'static str, reason: impl Into<String>) -> Self {
        RptError::Table { table, reason: reason.into() }
    }

    pub(crate) fn decompression(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        RptError::Decompression { entry: entry.into(), reason: reason.into() }
    }

    /// Whether processing of the rest of the container can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RptError::Decompression { .. })
    }
}

/// A convenience `Result` type alias using the crate's `RptError` type.
pub type Result<T> = std::result::Result<T, RptError>;
