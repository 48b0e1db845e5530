use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::queue::partition::Partition;

/// Receiving half of a pending notification, completed with the partition
/// that received new data
pub type PendingNotification<T> = oneshot::Receiver<Arc<Partition<T>>>;

/// Version-counted single-slot wakeup for one consumer
///
/// Every arrival bumps `version`. A waiter captures the version before it
/// scans its partitions and only parks if the version is still unchanged under
/// the slot lock, so an arrival that races with the scan is never lost.
///
/// `armed` is stored before the version check and read after the increment,
/// both `SeqCst`: either the waiter sees the new version, or the notifier sees
/// the waiter armed and goes through the lock.
pub struct Notifier<T> {
    version: AtomicU64,
    armed: AtomicBool,
    slot: Mutex<Option<oneshot::Sender<Arc<Partition<T>>>>>,
}

impl<T> Notifier<T> {
    pub fn new() -> Self {
        Self {
            version: AtomicU64::new(0),
            armed: AtomicBool::new(false),
            slot: Mutex::new(None),
        }
    }

    /// Current notification version
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Install a pending notification if nothing arrived since `observed`
    ///
    /// Returns `None` when the version moved, meaning data may already be
    /// available and the caller should scan again. Any previous pending
    /// notification is replaced, so at most one exists at a time.
    pub fn arm(&self, observed: u64) -> Option<PendingNotification<T>> {
        let mut slot = self.slot.lock();
        self.armed.store(true, Ordering::SeqCst);

        if self.version.load(Ordering::SeqCst) != observed {
            self.armed.store(false, Ordering::SeqCst);
            *slot = None;
            return None;
        }

        let (tx, rx) = oneshot::channel();
        *slot = Some(tx);
        Some(rx)
    }

    /// Record an arrival on `partition` and wake the pending waiter, if any
    ///
    /// Returns `true` only for the call that completed a live waiter.
    pub fn notify(&self, partition: Arc<Partition<T>>) -> bool {
        self.version.fetch_add(1, Ordering::SeqCst);

        if !self.armed.load(Ordering::SeqCst) {
            return false;
        }

        let sender = {
            let mut slot = self.slot.lock();
            self.armed.store(false, Ordering::SeqCst);
            slot.take()
        };

        match sender {
            // Fails only if the waiter was cancelled and dropped its receiver.
            Some(tx) => tx.send(partition).is_ok(),
            None => false,
        }
    }

    /// Bump the version and drop any pending notification without a payload
    ///
    /// A parked waiter wakes with a closed channel, and a waiter about to arm
    /// sees the version move; either way it rescans. Used when the assigned
    /// set changes or the consumer closes.
    pub fn interrupt(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);

        let mut slot = self.slot.lock();
        self.armed.store(false, Ordering::SeqCst);
        slot.take();
    }

    #[cfg(test)]
    fn has_pending(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl<T> Default for Notifier<T> {
    fn default() -> Self {
        Self::new()
    }
}
