//! Error types.
//!
//! Task failures are not errors here: they travel as
//! [`TaskResult::Error`](crate::invoker::TaskResult) values and are
//! accumulated by the coordinator.

use thiserror::Error;

/// A result store call failed.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// The consolidation step failed after at least one task succeeded.
#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("failed to read results for review {review_id}: {source}")]
    Read {
        review_id: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to write consolidated report: {0}")]
    Publish(#[from] std::io::Error),

    #[error("failed to encode consolidated report: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0}")]
    Stage(String),
}

/// Why a review terminated as `failed`.
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("All analyzers failed: {}", .0.join("; "))]
    TotalFailure(Vec<String>),

    #[error("Report generation failed: {0}")]
    Aggregation(#[from] AggregationError),
}
