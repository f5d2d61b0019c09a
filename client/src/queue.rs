//! Outgoing message queue between the simulation and the network session
//!
//! Combat, chat and bullet announcements are pushed here from the simulation
//! thread; the network session drains it once per publish cycle. The queue is
//! bounded: when it is full, the oldest message is dropped so a stalled
//! connection cannot grow memory without limit.

use log::warn;
use parking_lot::Mutex;
use shared::Message;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct OutgoingQueue {
    messages: Mutex<VecDeque<Message>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl OutgoingQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Queues a message, evicting the oldest one if the queue is full.
    ///
    /// Returns the evicted message, if any.
    pub fn push(&self, message: Message) -> Option<Message> {
        let mut messages = self.messages.lock();
        let evicted = if messages.len() >= self.capacity {
            messages.pop_front()
        } else {
            None
        };
        messages.push_back(message);
        drop(messages);

        if let Some(old) = &evicted {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "Outgoing queue full, dropped oldest {} message ({} dropped so far)",
                old.kind(),
                total
            );
        }
        evicted
    }

    /// Takes every queued message in FIFO order
    pub fn drain(&self) -> Vec<Message> {
        self.messages.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
