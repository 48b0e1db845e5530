//! Queue and consumer configuration

use serde::{Deserialize, Serialize};

use super::error::{QueueError, Result};

/// Options a consumer is created with
///
/// Immutable once the consumer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerOptions {
    /// Consumer group the consumer pulls and commits under
    pub group_name: String,

    /// Commit after every successful pull instead of on request
    #[serde(default)]
    pub auto_commit: bool,
}

impl ConsumerOptions {
    /// Create options for the given consumer group (manual commit)
    ///
    /// # Example
    ///
    /// ```
    /// use memqueue::queue::ConsumerOptions;
    ///
    /// let options = ConsumerOptions::new("billing").with_auto_commit(true);
    /// assert_eq!(options.group_name, "billing");
    /// assert!(options.auto_commit);
    /// ```
    pub fn new(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            auto_commit: false,
        }
    }

    /// Set the commit mode (builder pattern)
    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self::new("default")
    }
}

/// Configuration for a [`MessageQueue`](super::MessageQueue)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of partitions the queue is created with
    pub partition_count: usize,
}

impl QueueConfig {
    /// Create a configuration with the given number of partitions
    pub fn new(partition_count: usize) -> Self {
        Self { partition_count }
    }

    /// Check the configuration before building a queue from it
    pub fn validate(&self) -> Result<()> {
        if self.partition_count == 0 {
            return Err(QueueError::InvalidConfig(
                "partition_count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { partition_count: 1 }
    }
}
