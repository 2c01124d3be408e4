//! Error types for promptpack operations.
//!
//! This module provides the error hierarchy using `thiserror` for all
//! operations: file access, fragment extraction, embedding, vector storage,
//! prompt optimization, and configuration validation.

use crate::index::IndexReport;
use thiserror::Error;

/// Result type alias for promptpack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for promptpack operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File access errors.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Fragment extraction errors.
    #[error("extraction error: {0}")]
    Parse(#[from] ParseError),

    /// Embedding provider errors.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector index errors.
    #[error("vector store error: {0}")]
    VectorDb(#[from] VectorDbError),

    /// Fragment store errors.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Prompt optimization errors.
    #[error("optimization error: {0}")]
    Optimize(#[from] OptimizeError),

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Aggregate indexing failure carrying partial progress.
    #[error(transparent)]
    Indexing(#[from] IndexingFailed),
}

/// File access errors for the `FileSystem` collaborator.
#[derive(Error, Debug)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found.
        path: String,
    },

    /// Failed to read file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to stat file.
    #[error("failed to stat file: {path}: {reason}")]
    StatFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Memory mapping error.
    #[error("memory mapping failed: {path}: {reason}")]
    MmapFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Directory walk error.
    #[error("failed to walk directory: {root}: {reason}")]
    WalkFailed {
        /// Root directory of the walk.
        root: String,
        /// Reason for failure.
        reason: String,
    },
}

/// Fragment extraction errors.
///
/// These are non-fatal during indexing: the offending file is recorded in
/// the run report and the run continues.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Source bytes are not valid UTF-8.
    #[error("invalid UTF-8 in {path} at byte offset {offset}")]
    InvalidUtf8 {
        /// Path of the file.
        path: String,
        /// Byte offset where invalid UTF-8 was found.
        offset: usize,
    },

    /// No extractor exists for the language.
    #[error("unsupported language for {path}")]
    UnsupportedLanguage {
        /// Path of the file.
        path: String,
    },
}

/// Embedding provider errors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Provider returned an error. A batch either fully succeeds or fully
    /// fails; no partial results are surfaced.
    #[error("embedding failed: {reason}")]
    Failed {
        /// Provider-supplied reason.
        reason: String,
    },

    /// Provider did not respond within the per-batch timeout.
    #[error("embedding timed out after {seconds}s")]
    Timeout {
        /// Timeout that elapsed.
        seconds: u64,
    },

    /// Batch exceeds the provider's per-request cap.
    #[error("batch of {size} texts exceeds provider cap {max}")]
    BatchTooLarge {
        /// Requested batch size.
        size: usize,
        /// Provider cap.
        max: usize,
    },

    /// Returned vector has the wrong dimension.
    #[error("embedding dimension {actual} does not match expected {expected}")]
    DimensionMismatch {
        /// Dimension the index was built with.
        expected: usize,
        /// Dimension the provider returned.
        actual: usize,
    },
}

/// Vector index errors.
#[derive(Error, Debug)]
pub enum VectorDbError {
    /// Storage backend failure. A failed insert must not partially commit.
    #[error("vector storage failed: {reason}")]
    Storage {
        /// Backend-supplied reason.
        reason: String,
    },

    /// Inserted or queried vector has the wrong dimension.
    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch {
        /// Dimension the index was built with.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    /// Operation did not complete within the per-call timeout.
    #[error("vector store operation timed out after {seconds}s")]
    Timeout {
        /// Timeout that elapsed.
        seconds: u64,
    },
}

/// Fragment store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),
}

/// Prompt optimization errors.
#[derive(Error, Debug)]
pub enum OptimizeError {
    /// The smallest possible selection (one fragment at the strongest
    /// compression) still exceeds the budget.
    #[error(
        "token budget exceeded: fragment {fragment_id} needs {needed} tokens, budget is {budget}"
    )]
    TokenBudgetExceeded {
        /// Id of the offending fragment.
        fragment_id: String,
        /// Tokens the fragment needs after maximal compression.
        needed: usize,
        /// Available budget.
        budget: usize,
    },

    /// No provider satisfies the routing constraints.
    #[error("model routing failed: {reason}")]
    ModelRoutingFailed {
        /// Why no provider was selectable.
        reason: String,
    },
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Scoring weights must sum to 1.0.
    #[error("scoring weights sum to {sum}, expected 1.0")]
    WeightsSum {
        /// Actual sum of the configured weights.
        sum: f32,
    },

    /// Router thresholds must be strictly increasing.
    #[error("router thresholds out of order: {message}")]
    ThresholdOrder {
        /// Description of the ordering violation.
        message: String,
    },

    /// Embedder and vector index disagree on vector dimension.
    #[error("dimension mismatch: embedder produces {embedder}, index expects {index}")]
    DimensionMismatch {
        /// Embedder output dimension.
        embedder: usize,
        /// Index dimension.
        index: usize,
    },

    /// A configuration value is out of range or malformed.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Why the value is invalid.
        reason: String,
    },
}

/// Aggregate fatal indexing error wrapping partial progress.
///
/// Raised when a batch commit fails after retries, the vector store becomes
/// unavailable, or the embedder fails totally (including its fallback). The
/// wrapped report reflects everything committed before the failure.
#[derive(Error, Debug)]
#[error("indexing failed: {reason} ({} files committed)", partial.files)]
pub struct IndexingFailed {
    /// Why the run was aborted.
    pub reason: String,
    /// Progress committed before the failure.
    pub partial: Box<IndexReport>,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::ReadFailed {
            path: String::new(),
            reason: err.to_string(),
        })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
