/// Consumer side of the queue
///
/// This module provides:
/// - `Consumer`: pulls items from its assigned partitions as a lazy stream
/// - `ConsumeStream`: the stream type returned by `Consumer::consume`
/// - `ConsumerId`: the identifier partitions and the queue know a consumer by
///
/// # Consuming
///
/// Each step of the stream:
///
/// 1. **Pick**: try the partition under the round-robin cursor, then the rest
///    in assignment order
/// 2. **Record**: remember the partition the item came from, auto-commit if
///    configured
/// 3. **Wait**: if every partition is empty, park until one of them receives
///    data, then try that partition
///
/// # Committing
///
/// With manual commit (the default) call `commit()` after handling an item to
/// persist the group's position on the partition it came from. `pause()`
/// holds commits, not pulls, until `resume()`.
///
/// ```
/// use memqueue::queue::{ConsumerOptions, MessageQueue, QueueError};
/// use futures::StreamExt;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), QueueError> {
///     let queue = MessageQueue::with_partitions(2)?;
///     let consumer = queue.create_consumer(ConsumerOptions::new("audit"));
///     queue.assign(&consumer, &[0, 1])?;
///
///     queue.publish("first".to_string());
///
///     let mut items = consumer.consume(CancellationToken::new())?;
///     if let Some(item) = items.next().await {
///         println!("handled {}", item?);
///         consumer.commit().await?;
///     }
///
///     assert_eq!(consumer.commit().await, Err(QueueError::NothingToCommit));
///     Ok(())
/// }
/// ```

pub mod consumer;
mod gate;
pub(crate) mod notifier;

pub use consumer::{ConsumeStream, Consumer, ConsumerId};
pub(crate) use notifier::Notifier;
