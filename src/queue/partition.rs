use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use super::consumer::{Consumer, ConsumerId, Notifier};

/// Index of a partition within its queue
pub type PartitionId = usize;

/// Read position of one consumer group on a partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GroupCursor {
    /// Offset of the next item to hand out
    next: u64,
    /// Offset up to which the group has committed (exclusive)
    committed: u64,
}

struct PartitionState<T> {
    items: VecDeque<T>,
    /// Offset of `items[0]`
    base_offset: u64,
    groups: HashMap<String, GroupCursor>,
}

impl<T> PartitionState<T> {
    fn end_offset(&self) -> u64 {
        self.base_offset + self.items.len() as u64
    }

    fn cursor(&mut self, group: &str) -> &mut GroupCursor {
        let base = self.base_offset;
        self.groups
            .entry(group.to_string())
            .or_insert(GroupCursor {
                next: base,
                committed: base,
            })
    }
}

/// An ordered, in-memory buffer of items with a read cursor per consumer group
///
/// Items are retained until every known group has committed past them and
/// [`compact`](Partition::compact) is called. Consumers register to be told
/// about appends; the partition keeps only weak handles to them.
pub struct Partition<T> {
    id: PartitionId,
    state: Mutex<PartitionState<T>>,
    listeners: Mutex<Vec<(ConsumerId, Weak<Notifier<T>>)>>,
}

impl<T> Partition<T> {
    /// Create an empty partition
    pub fn new(id: PartitionId) -> Self {
        Self {
            id,
            state: Mutex::new(PartitionState {
                items: VecDeque::new(),
                base_offset: 0,
                groups: HashMap::new(),
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    /// Number of retained items
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Offset the next appended item will get
    pub fn end_offset(&self) -> u64 {
        self.state.lock().end_offset()
    }

    /// Committed offset of `group`, if the group has touched this partition
    pub fn committed_offset(&self, group: &str) -> Option<u64> {
        self.state.lock().groups.get(group).map(|c| c.committed)
    }

    /// Offset of the next item `group` would take, if the group has touched
    /// this partition
    pub fn next_offset(&self, group: &str) -> Option<u64> {
        self.state.lock().groups.get(group).map(|c| c.next)
    }

    /// Persist `group`'s position up to the last item it took
    ///
    /// Returns the committed offset.
    pub fn commit(&self, group: &str) -> u64 {
        let mut state = self.state.lock();
        let cursor = state.cursor(group);
        cursor.committed = cursor.next;
        cursor.committed
    }

    /// Drop items every known group has committed past
    ///
    /// Returns the number of items removed. Groups that never touched this
    /// partition do not hold items back.
    pub fn compact(&self) -> usize {
        let mut state = self.state.lock();
        let Some(low_water) = state.groups.values().map(|c| c.committed).min() else {
            return 0;
        };

        let removable = low_water.saturating_sub(state.base_offset) as usize;
        let removed = removable.min(state.items.len());
        state.items.drain(..removed);
        state.base_offset += removed as u64;
        removed
    }

    /// Register `consumer` to be notified of appends
    ///
    /// Registering the same consumer again replaces its entry.
    pub fn register_consumer(&self, consumer: &Consumer<T>) {
        let id = consumer.id();
        let notifier = consumer.notifier();

        let mut listeners = self.listeners.lock();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.push((id, notifier));
    }

    /// Stop notifying the consumer with the given id
    pub fn deregister_consumer(&self, id: ConsumerId) {
        self.listeners.lock().retain(|(registered, _)| *registered != id);
    }

    /// Number of registered consumers that are still alive
    pub fn consumer_count(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|(_, notifier)| notifier.strong_count() > 0)
            .count()
    }

    /// Append an item and notify every registered consumer
    ///
    /// Returns the item's offset. Notifications are sent after the partition
    /// lock is released.
    pub fn append(self: &Arc<Self>, item: T) -> u64 {
        let offset = {
            let mut state = self.state.lock();
            let offset = state.end_offset();
            state.items.push_back(item);
            offset
        };

        let notifiers: Vec<Arc<Notifier<T>>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|(_, notifier)| notifier.strong_count() > 0);
            listeners
                .iter()
                .filter_map(|(_, notifier)| notifier.upgrade())
                .collect()
        };

        for notifier in notifiers {
            if notifier.notify(Arc::clone(self)) {
                tracing::trace!(partition = self.id, offset, "woke waiting consumer");
            }
        }

        offset
    }
}

impl<T: Clone> Partition<T> {
    /// Take the next item for `group` without blocking
    ///
    /// The item stays in the partition for other groups; only `group`'s cursor
    /// moves.
    pub fn attempt_take(&self, group: &str) -> Option<T> {
        let mut state = self.state.lock();
        let base = state.base_offset;
        let end = state.end_offset();

        let cursor = state.cursor(group);
        if cursor.next >= end {
            return None;
        }

        let index = (cursor.next - base) as usize;
        cursor.next += 1;
        state.items.get(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ConsumerOptions;

    fn partition_with(items: &[&str]) -> Arc<Partition<String>> {
        let partition = Arc::new(Partition::new(0));
        for item in items {
            partition.append(item.to_string());
        }
        partition
    }

    #[test]
    fn test_append_assigns_sequential_offsets() {
        let partition = Arc::new(Partition::new(2));
        assert_eq!(partition.append("a".to_string()), 0);
        assert_eq!(partition.append("b".to_string()), 1);
        assert_eq!(partition.len(), 2);
        assert_eq!(partition.end_offset(), 2);
        assert_eq!(partition.id(), 2);
    }

    #[test]
    fn test_attempt_take_is_fifo_per_group() {
        let partition = partition_with(&["a", "b"]);

        assert_eq!(partition.attempt_take("g1"), Some("a".to_string()));
        assert_eq!(partition.attempt_take("g1"), Some("b".to_string()));
        assert_eq!(partition.attempt_take("g1"), None);

        // Another group reads independently from the start.
        assert_eq!(partition.attempt_take("g2"), Some("a".to_string()));
        assert_eq!(partition.next_offset("g1"), Some(2));
        assert_eq!(partition.next_offset("g2"), Some(1));
    }

    #[test]
    fn test_attempt_take_on_empty_partition() {
        let partition: Arc<Partition<String>> = Arc::new(Partition::new(0));
        assert_eq!(partition.attempt_take("g1"), None);
        assert!(partition.is_empty());
    }

    #[test]
    fn test_commit_records_taken_position() {
        let partition = partition_with(&["a", "b", "c"]);
        assert_eq!(partition.committed_offset("g1"), None);

        partition.attempt_take("g1");
        partition.attempt_take("g1");
        assert_eq!(partition.commit("g1"), 2);
        assert_eq!(partition.committed_offset("g1"), Some(2));
    }

    #[test]
    fn test_compact_respects_slowest_group() {
        let partition = partition_with(&["a", "b", "c", "d"]);

        for _ in 0..3 {
            partition.attempt_take("fast");
        }
        partition.commit("fast");
        partition.attempt_take("slow");
        partition.commit("slow");

        assert_eq!(partition.compact(), 1);
        assert_eq!(partition.len(), 3);

        // Offsets survive compaction.
        assert_eq!(partition.attempt_take("slow"), Some("b".to_string()));
        assert_eq!(partition.attempt_take("fast"), Some("d".to_string()));
        assert_eq!(partition.append("e".to_string()), 4);
    }

    #[test]
    fn test_new_group_after_compaction_starts_at_oldest_retained() {
        let partition = partition_with(&["a", "b"]);
        partition.attempt_take("g1");
        partition.commit("g1");
        assert_eq!(partition.compact(), 1);

        assert_eq!(partition.attempt_take("late"), Some("b".to_string()));
    }

    #[test]
    fn test_compact_without_groups_keeps_everything() {
        let partition = partition_with(&["a"]);
        assert_eq!(partition.compact(), 0);
        assert_eq!(partition.len(), 1);
    }

    #[test]
    fn test_registration_is_weak_and_replaceable() {
        let partition: Arc<Partition<String>> = Arc::new(Partition::new(0));
        let consumer = Consumer::new(ConsumerOptions::new("g1"));

        partition.register_consumer(&consumer);
        partition.register_consumer(&consumer);
        assert_eq!(partition.consumer_count(), 1);

        drop(consumer);
        assert_eq!(partition.consumer_count(), 0);

        // Appending prunes the dead registration.
        partition.append("a".to_string());
        assert_eq!(partition.listeners.lock().len(), 0);
    }

    #[test]
    fn test_deregister_consumer() {
        let partition: Arc<Partition<String>> = Arc::new(Partition::new(0));
        let consumer = Consumer::new(ConsumerOptions::new("g1"));

        partition.register_consumer(&consumer);
        partition.deregister_consumer(consumer.id());
        assert_eq!(partition.consumer_count(), 0);
    }
}
