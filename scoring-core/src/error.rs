//! Error types for the scoring engine

use thiserror::Error;

/// Result type for scoring operations
pub type Result<T> = std::result::Result<T, Error>;

/// Scoring errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range input; fix and resubmit
    #[error("Validation error: {0}")]
    Validation(String),

    /// Event violates the required ordering (ledger unchanged)
    #[error("Sequence error: {0}")]
    Sequence(String),

    /// Competing writer for the same match; retry
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Unknown match, innings or player
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON rendering error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Projection could not be derived from the ledger
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Caller-facing classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Fix input and resubmit
    Validation,
    /// Ordering violation
    Sequence,
    /// Retry
    ConcurrentModification,
    /// Unknown entity
    NotFound,
    /// Infrastructure failure
    Internal,
}

impl ErrorKind {
    /// Stable label (metrics, transport mapping)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Sequence => "sequence",
            ErrorKind::ConcurrentModification => "concurrent_modification",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Sequence(_) => ErrorKind::Sequence,
            Error::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            Error::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Internal,
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
