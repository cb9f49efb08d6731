//! Bounded FIFO handing motor actions from interrupt context to the consumer task.
//!
//! Producers (the button interrupt and the remote-command path) use
//! [`ActionQueue::try_push`], which never blocks: when the queue is full the
//! entry is discarded and `false` is returned. The consumer task blocks in
//! [`ActionQueue::recv`].
//!
//! ```rust
//! use rs_gate::queue::{ActionQueue, ActionSource, BoundedActionQueue, QueuedAction};
//! use rs_gate::MotorAction;
//!
//! let queue: BoundedActionQueue = BoundedActionQueue::new();
//! let item = QueuedAction::new(MotorAction::Clockwise, ActionSource::Button, 1);
//!
//! assert!(queue.try_push(item));
//! assert_eq!(queue.try_recv(), Some(item));
//! assert!(queue.is_empty());
//! ```

use crate::direction::MotorAction;

#[cfg(feature = "std")]
use heapless::Deque;
#[cfg(feature = "std")]
use std::sync::{Condvar, Mutex, PoisonError};

/// Number of actions the queue holds before dropping new ones.
pub const ACTION_QUEUE_CAPACITY: usize = 10;

/// Who produced a queued action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ActionSource {
    /// Button interrupt. The motor has not been driven yet.
    Button,
    /// Remote command. The motor was already driven synchronously.
    Remote,
    /// Sensor trip that raced another writer; outputs need re-deriving.
    Limit,
}

/// Snapshot of a transition taken when it was enqueued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueuedAction {
    /// Action the producer selected.
    pub action: MotorAction,
    /// Producer of the action.
    pub source: ActionSource,
    /// Direction cell generation right after the producer's transition.
    pub generation: u32,
}

impl QueuedAction {
    /// Create a queue entry.
    pub const fn new(action: MotorAction, source: ActionSource, generation: u32) -> Self {
        Self {
            action,
            source,
            generation,
        }
    }
}

/// Interrupt-safe bounded FIFO of [`QueuedAction`]s.
pub trait ActionQueue: Send + Sync {
    /// Append without blocking. Returns `false` and drops `item` when full.
    #[must_use]
    fn try_push(&self, item: QueuedAction) -> bool;

    /// Block until an item is available.
    ///
    /// Returns `None` only once the queue has been closed and drained.
    fn recv(&self) -> Option<QueuedAction>;

    /// Take the oldest item if one is waiting.
    fn try_recv(&self) -> Option<QueuedAction>;

    /// Number of waiting items.
    fn len(&self) -> usize;

    /// True when nothing is waiting.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wake the consumer and make `recv` return `None` once drained.
    ///
    /// Queues that live for the whole process may ignore this.
    fn close(&self) {}
}

#[cfg(feature = "std")]
impl<Q: ActionQueue + ?Sized> ActionQueue for std::sync::Arc<Q> {
    fn try_push(&self, item: QueuedAction) -> bool {
        (**self).try_push(item)
    }

    fn recv(&self) -> Option<QueuedAction> {
        (**self).recv()
    }

    fn try_recv(&self) -> Option<QueuedAction> {
        (**self).try_recv()
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn close(&self) {
        (**self).close()
    }
}

// ============================================================================
// Std Implementation
// ============================================================================

#[cfg(feature = "std")]
#[derive(Debug)]
struct QueueInner<const N: usize> {
    items: Deque<QueuedAction, N>,
    closed: bool,
}

/// [`ActionQueue`] backed by a fixed-capacity `heapless::Deque`.
///
/// Used on desktop and in tests. The ESP32 build uses a FreeRTOS queue
/// instead because a mutex cannot be taken from an interrupt handler.
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct BoundedActionQueue<const N: usize = ACTION_QUEUE_CAPACITY> {
    inner: Mutex<QueueInner<N>>,
    ready: Condvar,
}

#[cfg(feature = "std")]
impl<const N: usize> BoundedActionQueue<N> {
    /// Create an empty, open queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: Deque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Fixed capacity.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Copy of the waiting items, oldest first.
    pub fn pending(&self) -> Vec<QueuedAction> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.items.iter().copied().collect()
    }
}

#[cfg(feature = "std")]
impl<const N: usize> Default for BoundedActionQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl<const N: usize> ActionQueue for BoundedActionQueue<N> {
    fn try_push(&self, item: QueuedAction) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed || inner.items.push_back(item).is_err() {
            return false;
        }
        drop(inner);
        self.ready.notify_one();
        true
    }

    fn recv(&self) -> Option<QueuedAction> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            inner = self
                .ready
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn try_recv(&self) -> Option<QueuedAction> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .pop_front()
    }

    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    fn close(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
        self.ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn item(n: u32) -> QueuedAction {
        QueuedAction::new(MotorAction::Clockwise, ActionSource::Button, n)
    }

    #[test]
    fn fifo_order() {
        let queue: BoundedActionQueue = BoundedActionQueue::new();
        for n in 0..3 {
            assert!(queue.try_push(item(n)));
        }
        assert_eq!(queue.try_recv().map(|i| i.generation), Some(0));
        assert_eq!(queue.try_recv().map(|i| i.generation), Some(1));
        assert_eq!(queue.try_recv().map(|i| i.generation), Some(2));
        assert_eq!(queue.try_recv(), None);
    }

    #[test]
    fn eleventh_push_is_dropped() {
        let queue: BoundedActionQueue = BoundedActionQueue::new();
        let accepted = (0..11).filter(|&n| queue.try_push(item(n))).count();

        assert_eq!(accepted, ACTION_QUEUE_CAPACITY);
        assert_eq!(queue.len(), 10);
        let kept: Vec<u32> = queue.pending().iter().map(|i| i.generation).collect();
        assert_eq!(kept, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn space_frees_after_recv() {
        let queue: BoundedActionQueue<2> = BoundedActionQueue::new();
        assert!(queue.try_push(item(0)));
        assert!(queue.try_push(item(1)));
        assert!(!queue.try_push(item(2)));
        queue.try_recv();
        assert!(queue.try_push(item(3)));
        assert_eq!(queue.capacity(), 2);
    }

    #[test]
    fn recv_blocks_until_push() {
        let queue: Arc<BoundedActionQueue> = Arc::new(BoundedActionQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.recv())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(queue.try_push(item(7)));
        assert_eq!(consumer.join().unwrap().map(|i| i.generation), Some(7));
    }

    #[test]
    fn close_drains_then_ends() {
        let queue: BoundedActionQueue = BoundedActionQueue::new();
        assert!(queue.try_push(item(1)));
        queue.close();
        assert!(!queue.try_push(item(2)));
        assert_eq!(queue.recv().map(|i| i.generation), Some(1));
        assert_eq!(queue.recv(), None);
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let queue: Arc<BoundedActionQueue> = Arc::new(BoundedActionQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.recv())
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
    }
}
