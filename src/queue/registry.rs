use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::{
    config::{ConsumerOptions, QueueConfig},
    consumer::{Consumer, ConsumerId},
    error::{QueueError, Result},
    partition::{Partition, PartitionId},
};

/// Owner of a set of consumers
///
/// Consumers hold a weak reference to their registry and call back into it
/// when they close.
pub trait ConsumerRegistry: Send + Sync {
    /// Forget the consumer with the given id
    fn remove_consumer(&self, id: ConsumerId);
}

/// An in-memory, partitioned message queue
///
/// Owns its partitions and the consumers created through it. Cloning the
/// queue yields another handle to the same partitions and consumers.
///
/// # Example
///
/// ```
/// use memqueue::queue::{ConsumerOptions, MessageQueue, QueueConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let queue: MessageQueue<String> = MessageQueue::new(QueueConfig::new(3))?;
///
/// let (partition, offset) = queue.publish("hello".to_string());
/// assert_eq!((partition, offset), (0, 0));
///
/// let consumer = queue.create_consumer(ConsumerOptions::new("readers"));
/// queue.assign(&consumer, &[0, 1, 2])?;
/// assert_eq!(queue.consumer_count(), 1);
///
/// consumer.close();
/// assert_eq!(queue.consumer_count(), 0);
/// # Ok(())
/// # }
/// ```
pub struct MessageQueue<T> {
    inner: Arc<QueueInner<T>>,
}

struct QueueInner<T> {
    partitions: Vec<Arc<Partition<T>>>,
    consumers: Mutex<HashMap<ConsumerId, Consumer<T>>>,
    next_partition: AtomicUsize,
}

impl<T> Clone for MessageQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ConsumerRegistry for QueueInner<T>
where
    T: Send + Sync,
{
    fn remove_consumer(&self, id: ConsumerId) {
        if self.consumers.lock().remove(&id).is_some() {
            debug!(consumer = %id, "removed consumer from queue");
        }
    }
}

impl<T> MessageQueue<T>
where
    T: Send + Sync + 'static,
{
    /// Create a queue from a validated configuration
    pub fn new(config: QueueConfig) -> Result<Self> {
        config.validate()?;

        let partitions = (0..config.partition_count)
            .map(|id| Arc::new(Partition::new(id)))
            .collect();

        debug!(partitions = config.partition_count, "created queue");

        Ok(Self {
            inner: Arc::new(QueueInner {
                partitions,
                consumers: Mutex::new(HashMap::new()),
                next_partition: AtomicUsize::new(0),
            }),
        })
    }

    /// Create a queue with `partition_count` partitions
    pub fn with_partitions(partition_count: usize) -> Result<Self> {
        Self::new(QueueConfig::new(partition_count))
    }

    pub fn partition_count(&self) -> usize {
        self.inner.partitions.len()
    }

    pub fn partitions(&self) -> &[Arc<Partition<T>>] {
        &self.inner.partitions
    }

    /// Look up a partition by index
    pub fn partition(&self, id: PartitionId) -> Result<Arc<Partition<T>>> {
        self.inner
            .partitions
            .get(id)
            .cloned()
            .ok_or(QueueError::PartitionNotFound(id))
    }

    /// Append to the next partition in round-robin order
    ///
    /// Returns the partition index and the item's offset within it.
    pub fn publish(&self, item: T) -> (PartitionId, u64) {
        let id = self.inner.next_partition.fetch_add(1, Ordering::Relaxed) % self.partition_count();
        let offset = self.inner.partitions[id].append(item);
        (id, offset)
    }

    /// Append to a specific partition
    pub fn publish_to(&self, id: PartitionId, item: T) -> Result<u64> {
        Ok(self.partition(id)?.append(item))
    }

    /// Append to the partition `key` hashes to
    ///
    /// Items with equal keys land on the same partition of a given queue, so
    /// they are read back in publish order.
    pub fn publish_keyed<K: Hash + ?Sized>(&self, key: &K, item: T) -> (PartitionId, u64) {
        let id = self.partition_for_key(key);
        let offset = self.inner.partitions[id].append(item);
        (id, offset)
    }

    /// Partition index `key` maps to
    pub fn partition_for_key<K: Hash + ?Sized>(&self, key: &K) -> PartitionId {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partition_count() as u64) as usize
    }

    /// Create a consumer owned by this queue
    ///
    /// The consumer has no partitions until [`assign`](MessageQueue::assign)
    /// or [`Consumer::assign_partitions`] is called.
    pub fn create_consumer(&self, options: ConsumerOptions) -> Consumer<T> {
        let registry: Arc<dyn ConsumerRegistry> = self.inner.clone();
        let consumer = Consumer::with_registry(options, Arc::downgrade(&registry));

        self.inner
            .consumers
            .lock()
            .insert(consumer.id(), consumer.clone());

        debug!(
            consumer = %consumer.id(),
            group = %consumer.group_name(),
            "created consumer"
        );
        consumer
    }

    /// Assign the partitions at `ids`, in that order, to `consumer`
    ///
    /// Replaces whatever the consumer had before. Nothing changes if any index
    /// is out of range.
    pub fn assign(&self, consumer: &Consumer<T>, ids: &[PartitionId]) -> Result<()> {
        let partitions = ids
            .iter()
            .map(|id| self.partition(*id))
            .collect::<Result<Vec<_>>>()?;

        consumer.assign_partitions(partitions);
        Ok(())
    }

    pub fn consumer_count(&self) -> usize {
        self.inner.consumers.lock().len()
    }

    pub fn contains_consumer(&self, id: ConsumerId) -> bool {
        self.inner.consumers.lock().contains_key(&id)
    }

    /// Compact every partition; returns the total number of items dropped
    pub fn compact(&self) -> usize {
        self.inner.partitions.iter().map(|p| p.compact()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_zero_partitions() {
        let result = MessageQueue::<String>::with_partitions(0);
        assert!(matches!(result, Err(QueueError::InvalidConfig(_))));
    }

    #[test]
    fn test_publish_round_robin() {
        let queue = MessageQueue::with_partitions(3).unwrap();
        let placed: Vec<_> = (0..6).map(|i| queue.publish(i)).collect();
        assert_eq!(
            placed,
            vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]
        );
    }

    #[test]
    fn test_publish_to_unknown_partition() {
        let queue = MessageQueue::with_partitions(2).unwrap();
        assert_eq!(queue.publish_to(5, 1), Err(QueueError::PartitionNotFound(5)));
        assert_eq!(queue.publish_to(1, 1), Ok(0));
    }

    #[test]
    fn test_publish_keyed_is_stable() {
        let queue = MessageQueue::with_partitions(4).unwrap();
        let (first, _) = queue.publish_keyed("account-17", 1);
        let (second, offset) = queue.publish_keyed("account-17", 2);

        assert_eq!(first, second);
        assert_eq!(offset, 1);
        assert_eq!(queue.partition_for_key("account-17"), first);
    }

    #[test]
    fn test_consumer_lifecycle_in_registry() {
        let queue: MessageQueue<String> = MessageQueue::with_partitions(2).unwrap();
        let first = queue.create_consumer(ConsumerOptions::new("g1"));
        let second = queue.create_consumer(ConsumerOptions::new("g2"));
        assert_eq!(queue.consumer_count(), 2);

        first.close();
        assert!(!queue.contains_consumer(first.id()));
        assert!(queue.contains_consumer(second.id()));
    }

    #[test]
    fn test_assign_with_bad_index_leaves_assignment_untouched() {
        let queue: MessageQueue<String> = MessageQueue::with_partitions(2).unwrap();
        let consumer = queue.create_consumer(ConsumerOptions::new("g1"));
        queue.assign(&consumer, &[1]).unwrap();

        assert_eq!(
            queue.assign(&consumer, &[0, 9]),
            Err(QueueError::PartitionNotFound(9))
        );
        let ids: Vec<_> = consumer.assigned_partitions().iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_close_after_queue_dropped() {
        let queue: MessageQueue<String> = MessageQueue::with_partitions(1).unwrap();
        let consumer = queue.create_consumer(ConsumerOptions::new("g1"));
        drop(queue);

        // The registry is gone; closing must still work.
        consumer.close();
        assert!(consumer.is_closed());
    }
}
