//! In-memory partitioned message queue with consumer groups
//!
//! Items are published into a fixed set of partitions. Each partition keeps a
//! read cursor and a committed offset per consumer group. A [`Consumer`] drains
//! the partitions assigned to it as an async stream, waking as soon as any of
//! them receives data.
//!
//! # Quick Start
//!
//! ```
//! use memqueue::queue::{ConsumerOptions, MessageQueue};
//! use futures::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = MessageQueue::with_partitions(4)?;
//!     let consumer = queue.create_consumer(ConsumerOptions::new("workers").with_auto_commit(true));
//!     queue.assign(&consumer, &[0, 1, 2, 3])?;
//!
//!     let producer = queue.clone();
//!     tokio::spawn(async move {
//!         for i in 0..3 {
//!             producer.publish(format!("job-{}", i));
//!         }
//!     });
//!
//!     let jobs: Vec<String> = consumer
//!         .consume(CancellationToken::new())?
//!         .take(3)
//!         .map(|item| item.unwrap())
//!         .collect()
//!         .await;
//!     assert_eq!(jobs.len(), 3);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod partition;
pub mod registry;

// Re-export main types for convenience
pub use config::{ConsumerOptions, QueueConfig};
pub use consumer::{ConsumeStream, Consumer, ConsumerId};
pub use error::{QueueError, Result};
pub use partition::{Partition, PartitionId};
pub use registry::{ConsumerRegistry, MessageQueue};
