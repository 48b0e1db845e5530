//! Error types for the queue

use thiserror::Error;

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors surfaced by consumers, partitions and the queue registry
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Consumption started before any partition was assigned
    #[error("No partitions assigned to consumer")]
    NotAssigned,

    /// Manual commit requested on an auto-commit consumer
    #[error("Manual commit is not allowed when auto-commit is enabled")]
    InvalidCommitMode,

    /// Manual commit requested with nothing pulled since the last commit
    #[error("Nothing to commit: no partition is currently being consumed")]
    NothingToCommit,

    /// The consumption stream was cancelled while waiting for data
    #[error("Consumption cancelled")]
    Cancelled,

    /// The consumer has been closed
    #[error("Consumer is closed")]
    Closed,

    /// No partition exists at the given index
    #[error("Partition not found: {0}")]
    PartitionNotFound(usize),

    /// Queue configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
