//! Error types for the arXiv harvester.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.

use std::time::Duration;

/// Errors from the HTTP client layer.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// HTTP transport error (connection, DNS, TLS, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Middleware error
    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// Request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The request URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Errors from request validation and the harvesting state machine.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    /// A supplied date string is not a calendar date.
    #[error("Invalid date '{input}': expected YYYY-MM-DD")]
    InvalidDateFormat {
        /// The rejected input
        input: String,
    },

    /// The set identifier is not one of the known OAI sets.
    #[error("Unknown classification set '{input}'")]
    InvalidClassificationSet {
        /// The rejected input
        input: String,
    },

    /// The field list is neither `everything` nor a proper list of names.
    #[error("Invalid field schema: {reason}")]
    InvalidFieldSchema {
        /// Why the schema was rejected
        reason: String,
    },

    /// A fetched page is not well-formed XML.
    #[error("Malformed markup: {0}")]
    MalformedMarkup(String),

    /// A 503 response did not carry a `Retry after <N> seconds` hint.
    #[error("503 response without a retry hint: {body}")]
    MalformedBackoffHint {
        /// Response body as received
        body: String,
    },

    /// Network-level failure; not retried.
    #[error("Transport failure: {0}")]
    TransportFailure(#[from] ClientError),

    /// Extracted records did not fit the result table.
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    /// The caller cancelled the harvest.
    #[error("Harvest cancelled")]
    Cancelled,
}

impl HarvestError {
    /// Create an invalid date error.
    #[must_use]
    pub fn invalid_date(input: impl Into<String>) -> Self {
        Self::InvalidDateFormat { input: input.into() }
    }

    /// Create an invalid classification set error.
    #[must_use]
    pub fn invalid_set(input: impl Into<String>) -> Self {
        Self::InvalidClassificationSet { input: input.into() }
    }

    /// Create an invalid field schema error.
    #[must_use]
    pub fn invalid_schema(reason: impl Into<String>) -> Self {
        Self::InvalidFieldSchema { reason: reason.into() }
    }

    /// Returns true for errors raised while validating a request, before any I/O.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidDateFormat { .. }
                | Self::InvalidClassificationSet { .. }
                | Self::InvalidFieldSchema { .. }
        )
    }
}

/// Errors from the record table and its CSV persistence.
#[derive(thiserror::Error, Debug)]
pub enum TableError {
    /// CSV encoding or decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// List cell encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record's columns differ from the table's.
    #[error("Column mismatch: table has {expected:?}, record has {found:?}")]
    ColumnMismatch {
        /// Table columns
        expected: Vec<String>,
        /// Record columns
        found: Vec<String>,
    },

    /// A new column has a different number of values than the table has rows.
    #[error("Column '{column}' has {found} values for {expected} rows")]
    LengthMismatch {
        /// Column name
        column: String,
        /// Number of rows
        expected: usize,
        /// Number of supplied values
        found: usize,
    },

    /// The row index column is missing or not an integer.
    #[error("Invalid row index on line {line}: '{value}'")]
    InvalidIndex {
        /// 1-based line in the file
        line: u64,
        /// Offending cell
        value: String,
    },
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type alias for harvest operations.
pub type HarvestResult<T> = Result<T, HarvestError>;

/// Result type alias for table operations.
pub type TableResult<T> = Result<T, TableError>;
