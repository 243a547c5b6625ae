//! Error types for case database operations

use thiserror::Error;

/// Errors raised by the case database layer.
///
/// Core errors wrap failures of the storage or native layer. Data errors
/// describe bad input or missing rows and are safe to show to an examiner.
#[derive(Error, Debug)]
pub enum CaseDbError {
    #[error("core error: {0}")]
    Core(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("native error: {0}")]
    Native(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CaseDbError {
    /// True for errors caused by the caller's input rather than the backing store.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            CaseDbError::Data(_) | CaseDbError::NotFound(_) | CaseDbError::InvalidArgument(_)
        )
    }

    pub(crate) fn core(msg: impl Into<String>) -> Self {
        CaseDbError::Core(msg.into())
    }

    pub(crate) fn data(msg: impl Into<String>) -> Self {
        CaseDbError::Data(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CaseDbError::InvalidArgument(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        CaseDbError::NotFound(msg.into())
    }
}

/// Result type for case database operations
pub type Result<T> = std::result::Result<T, CaseDbError>;
