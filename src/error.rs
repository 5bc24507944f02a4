//! Custom error types for rustarxiv.
//!
//! This module defines all error types used throughout the application.
//! All functions return `Result<T, ArxivError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for rustarxiv operations.
///
/// The first group of variants is what the session layer surfaces to a
/// user; the rest are backend internals that end up inside a job's
/// `success: false` message.
#[derive(Debug, Error)]
pub enum ArxivError {
    /// Form input rejected before any request was made
    #[error("Validation error: {0}")]
    Validation(String),

    /// Job trigger rejected client-side, nothing was sent
    #[error("{0}")]
    Precondition(String),

    /// Server answered with `success: false`
    #[error("{0}")]
    JobFailed(String),

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Rate limited by external API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Error message from API
        message: String,
    },

    /// Malformed upstream content
    #[error("Parse error: {0}")]
    Parse(String),

    /// Atom feed could not be decoded
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::de::DeError),

    /// PDF text extraction failed
    #[error("PDF error: {0}")]
    Pdf(String),

    /// Workbook could not be written
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl ArxivError {
    /// Errors raised before any request left the process.
    pub fn is_client_side(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Precondition(_))
    }
}

/// Result type alias using `ArxivError`
pub type Result<T> = std::result::Result<T, ArxivError>;
