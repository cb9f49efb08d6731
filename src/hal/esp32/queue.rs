//! Action queue backed by a FreeRTOS queue.
//!
//! `Queue::send_back` switches to the `FromISR` variant when called from
//! interrupt context, so the button handler can push without blocking.

use esp_idf_hal::delay::{BLOCK, NON_BLOCK};
use esp_idf_hal::sys::uxQueueMessagesWaiting;
use esp_idf_hal::task::queue::Queue;

use crate::queue::{ActionQueue, QueuedAction, ACTION_QUEUE_CAPACITY};

/// FreeRTOS queue of [`QueuedAction`]s.
pub struct Esp32ActionQueue {
    queue: Queue<QueuedAction>,
}

impl Esp32ActionQueue {
    /// Allocate a queue holding [`ACTION_QUEUE_CAPACITY`] entries.
    pub fn new() -> Self {
        Self {
            queue: Queue::new(ACTION_QUEUE_CAPACITY),
        }
    }
}

impl Default for Esp32ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionQueue for Esp32ActionQueue {
    fn try_push(&self, item: QueuedAction) -> bool {
        matches!(self.queue.send_back(item, NON_BLOCK), Ok(_))
    }

    fn recv(&self) -> Option<QueuedAction> {
        // Never closed: wait forever.
        loop {
            if let Some((item, _)) = self.queue.recv_front(BLOCK) {
                return Some(item);
            }
        }
    }

    fn try_recv(&self) -> Option<QueuedAction> {
        self.queue.recv_front(NON_BLOCK).map(|(item, _)| item)
    }

    fn len(&self) -> usize {
        unsafe { uxQueueMessagesWaiting(self.queue.as_raw()) as usize }
    }
}
