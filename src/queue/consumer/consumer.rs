use arc_swap::ArcSwap;
use async_stream::stream;
use futures::stream::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

use super::gate::PauseGate;
use super::notifier::Notifier;
use crate::queue::{
    config::ConsumerOptions,
    error::{QueueError, Result},
    partition::Partition,
    registry::ConsumerRegistry,
};

/// Identifier of a consumer, used by partitions and the registry to refer to
/// it without holding it
pub type ConsumerId = Uuid;

/// Lazy, infinite stream of items produced by [`Consumer::consume`]
pub type ConsumeStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Reads items from a set of assigned partitions on behalf of a consumer group
///
/// A `Consumer` is a cheap handle; clones share the same state. One task at a
/// time should drive the stream returned by [`consume`](Consumer::consume),
/// while `pause`, `resume`, `assign_partitions`, `commit` and `close` may be
/// called from anywhere.
///
/// # Example
///
/// ```
/// use memqueue::queue::{ConsumerOptions, MessageQueue};
/// use futures::StreamExt;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let queue = MessageQueue::with_partitions(2)?;
///     let consumer = queue.create_consumer(ConsumerOptions::new("billing"));
///     queue.assign(&consumer, &[0, 1])?;
///
///     queue.publish_to(1, "invoice-42".to_string())?;
///
///     let mut items = consumer.consume(CancellationToken::new())?;
///     let item = items.next().await.unwrap()?;
///     assert_eq!(item, "invoice-42");
///
///     consumer.commit().await?;
///     consumer.close();
///     Ok(())
/// }
/// ```
pub struct Consumer<T> {
    inner: Arc<ConsumerInner<T>>,
}

struct ConsumerInner<T> {
    id: ConsumerId,
    options: ConsumerOptions,
    assigned: ArcSwap<Vec<Arc<Partition<T>>>>,
    round_robin: AtomicUsize,
    being_consumed: Mutex<Option<Arc<Partition<T>>>>,
    gate: PauseGate,
    notifier: Arc<Notifier<T>>,
    closed: AtomicBool,
    registry: Option<Weak<dyn ConsumerRegistry>>,
}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Consumer<T> {
    /// Create a consumer that is not tracked by any registry
    pub fn new(options: ConsumerOptions) -> Self {
        Self::build(options, None)
    }

    pub(crate) fn with_registry(
        options: ConsumerOptions,
        registry: Weak<dyn ConsumerRegistry>,
    ) -> Self {
        Self::build(options, Some(registry))
    }

    fn build(options: ConsumerOptions, registry: Option<Weak<dyn ConsumerRegistry>>) -> Self {
        Self {
            inner: Arc::new(ConsumerInner {
                id: Uuid::new_v4(),
                options,
                assigned: ArcSwap::from_pointee(Vec::new()),
                round_robin: AtomicUsize::new(0),
                being_consumed: Mutex::new(None),
                gate: PauseGate::new(),
                notifier: Arc::new(Notifier::new()),
                closed: AtomicBool::new(false),
                registry,
            }),
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.inner.id
    }

    pub fn group_name(&self) -> &str {
        &self.inner.options.group_name
    }

    pub fn options(&self) -> &ConsumerOptions {
        &self.inner.options
    }

    /// Partition the most recent item came from
    ///
    /// Cleared by a manual commit. Auto-commit leaves it set.
    pub fn partition_being_consumed(&self) -> Option<Arc<Partition<T>>> {
        self.inner.being_consumed.lock().clone()
    }

    /// Whether an item has been pulled since creation or the last manual commit
    pub fn is_consuming(&self) -> bool {
        self.inner.being_consumed.lock().is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.gate.is_paused()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Snapshot of the currently assigned partitions, in assignment order
    pub fn assigned_partitions(&self) -> Arc<Vec<Arc<Partition<T>>>> {
        self.inner.assigned.load_full()
    }

    /// Index into the assigned set that the next step tries first
    pub fn round_robin_cursor(&self) -> usize {
        self.inner.round_robin.load(Ordering::Relaxed)
    }

    pub(crate) fn notifier(&self) -> Weak<Notifier<T>> {
        Arc::downgrade(&self.inner.notifier)
    }

    /// Replace the assigned partition set
    ///
    /// The new set becomes visible to a running stream in one swap. The
    /// consumer registers with every partition in the new set and drops its
    /// registration on partitions that are no longer assigned. The round-robin
    /// cursor and the partition being consumed are left as they are.
    pub fn assign_partitions(&self, partitions: Vec<Arc<Partition<T>>>) {
        if self.is_closed() {
            debug!(consumer = %self.id(), "ignoring assignment on closed consumer");
            return;
        }

        let current = Arc::new(partitions);
        let previous = self.inner.assigned.swap(Arc::clone(&current));

        for partition in current.iter() {
            partition.register_consumer(self);
        }
        for partition in previous.iter() {
            if !current.iter().any(|p| Arc::ptr_eq(p, partition)) {
                partition.deregister_consumer(self.id());
            }
        }

        // A parked stream rescans so it sees data already sitting in new partitions.
        self.inner.notifier.interrupt();

        let ids: Vec<_> = current.iter().map(|p| p.id()).collect();
        debug!(
            consumer = %self.id(),
            group = %self.group_name(),
            partitions = ?ids,
            "assigned partitions"
        );
    }

    /// Hold commits until [`resume`](Consumer::resume). Pulling continues.
    pub fn pause(&self) {
        self.inner.gate.pause();
        debug!(consumer = %self.id(), "paused");
    }

    /// Release commits held by [`pause`](Consumer::pause)
    pub fn resume(&self) {
        self.inner.gate.resume();
        debug!(consumer = %self.id(), "resumed");
    }

    /// Called by a partition when it receives a new item
    ///
    /// Returns `true` if this woke a waiting stream.
    pub fn notify_new_data(&self, partition: Arc<Partition<T>>) -> bool {
        self.inner.notifier.notify(partition)
    }

    /// Commit the group's position on the partition being consumed
    ///
    /// Waits while the consumer is paused. Fails with `InvalidCommitMode` on
    /// an auto-commit consumer and with `NothingToCommit` when nothing was
    /// pulled since the last commit.
    pub async fn commit(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.options.auto_commit {
            return Err(QueueError::InvalidCommitMode);
        }

        let nothing_pulled = inner.being_consumed.lock().is_none();
        if nothing_pulled {
            return Err(QueueError::NothingToCommit);
        }

        inner.gate.wait_open().await?;

        let partition = inner
            .being_consumed
            .lock()
            .take()
            .ok_or(QueueError::NothingToCommit)?;
        let offset = partition.commit(&inner.options.group_name);

        debug!(
            consumer = %inner.id,
            group = %inner.options.group_name,
            partition = partition.id(),
            offset,
            "committed"
        );
        Ok(())
    }

    /// Deregister from the registry and all assigned partitions
    ///
    /// Idempotent. Pending commits fail with `Closed`, and a running stream
    /// ends with `Closed` at its next step.
    pub fn close(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        for partition in inner.assigned.load().iter() {
            partition.deregister_consumer(inner.id);
        }
        inner.gate.close();
        inner.notifier.interrupt();

        if let Some(registry) = inner.registry.as_ref().and_then(Weak::upgrade) {
            registry.remove_consumer(inner.id);
        }

        debug!(consumer = %inner.id, group = %inner.options.group_name, "closed");
    }
}

impl<T> Consumer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Start a lazy stream of items from the assigned partitions
    ///
    /// Fails right away with `NotAssigned` if no partitions are assigned. The
    /// stream never ends on its own: when every partition is empty it parks
    /// until one of them receives data. Cancelling `cancel` while parked ends
    /// the stream with a final `Cancelled` error. Streams cannot be rewound;
    /// call `consume` again for a fresh one.
    pub fn consume(&self, cancel: CancellationToken) -> Result<ConsumeStream<T>> {
        let inner = Arc::clone(&self.inner);
        if inner.is_closed() {
            return Err(QueueError::Closed);
        }
        if inner.assigned.load().is_empty() {
            return Err(QueueError::NotAssigned);
        }

        Ok(Box::pin(stream! {
            loop {
                if inner.is_closed() {
                    yield Err(QueueError::Closed);
                    break;
                }

                let partitions = inner.assigned.load_full();
                if partitions.is_empty() {
                    yield Err(QueueError::NotAssigned);
                    break;
                }

                // Captured before any take so an arrival during the scan is seen.
                let observed = inner.notifier.version();
                let mut taken = inner.take_next(&partitions);

                if taken.is_none() {
                    let Some(pending) = inner.notifier.arm(observed) else {
                        continue;
                    };

                    trace!(consumer = %inner.id, "waiting for data");
                    let wakeup = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        signaled = pending => Some(signaled),
                    };

                    let Some(signaled) = wakeup else {
                        trace!(consumer = %inner.id, "cancelled while waiting");
                        yield Err(QueueError::Cancelled);
                        break;
                    };
                    // Interrupted by reassignment or close.
                    let Ok(partition) = signaled else {
                        continue;
                    };

                    let still_assigned = inner.is_assigned(&partition);
                    if !still_assigned {
                        continue;
                    }
                    taken = partition
                        .attempt_take(&inner.options.group_name)
                        .map(|item| (partition, item));
                }

                if let Some((partition, item)) = taken {
                    let recorded = inner.record_take(partition).await;
                    yield Ok(item);
                    if let Err(err) = recorded {
                        yield Err(err);
                        break;
                    }
                }
            }
        }))
    }
}

impl<T> ConsumerInner<T> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn is_assigned(&self, partition: &Arc<Partition<T>>) -> bool {
        self.assigned
            .load()
            .iter()
            .any(|p| Arc::ptr_eq(p, partition))
    }

    /// Return the cursor position and move it one step forward
    fn advance_cursor(&self, partition_count: usize) -> usize {
        // Only the stream's task writes the cursor.
        let current = self.round_robin.load(Ordering::Relaxed) % partition_count;
        self.round_robin
            .store((current + 1) % partition_count, Ordering::Relaxed);
        current
    }

    /// Remember where the item came from and apply auto-commit
    ///
    /// An auto-commit waits on the pause gate and does not clear the
    /// partition being consumed.
    async fn record_take(&self, partition: Arc<Partition<T>>) -> Result<()> {
        *self.being_consumed.lock() = Some(Arc::clone(&partition));
        trace!(consumer = %self.id, partition = partition.id(), "took item");

        if self.options.auto_commit {
            self.gate.wait_open().await?;
            let offset = partition.commit(&self.options.group_name);
            trace!(consumer = %self.id, partition = partition.id(), offset, "auto-committed");
        }
        Ok(())
    }
}

impl<T: Clone> ConsumerInner<T> {
    /// Try the round-robin candidate first, then every other partition in
    /// assignment order
    fn take_next(&self, partitions: &[Arc<Partition<T>>]) -> Option<(Arc<Partition<T>>, T)> {
        let group = &self.options.group_name;
        let primary = self.advance_cursor(partitions.len());

        if let Some(item) = partitions[primary].attempt_take(group) {
            return Some((Arc::clone(&partitions[primary]), item));
        }

        partitions
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != primary)
            .find_map(|(_, partition)| {
                partition
                    .attempt_take(group)
                    .map(|item| (Arc::clone(partition), item))
            })
    }
}
