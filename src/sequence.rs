use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};

/// Highest message id handed out before wrapping back to 1. The wire field is
/// a single byte.
pub const MAX_MESSAGE_ID: u8 = 120;

/// Source of message ids shared by every request path.
///
/// Ids wrap after [`MAX_MESSAGE_ID`]. A wrapped id can collide with an id
/// still outstanding from an earlier full-update batch if more than
/// `MAX_MESSAGE_ID` requests are issued while that batch is pending;
/// [`PendingRequests::track`] reports the collision.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    counter: AtomicU8,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u8 {
        let previous = self
            .counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(if current >= MAX_MESSAGE_ID { 1 } else { current + 1 })
            })
            .unwrap_or_default();
        if previous >= MAX_MESSAGE_ID { 1 } else { previous + 1 }
    }

    /// Last id handed out, 0 before the first call.
    pub fn current(&self) -> u8 {
        self.counter.load(Ordering::Acquire)
    }
}

/// Received flags for the ids of one full-update batch.
#[derive(Debug, Clone, Default)]
pub struct PendingRequests {
    received: HashMap<u8, bool>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.received.clear();
    }

    /// Start tracking `id`. Returns false when `id` was already outstanding,
    /// which means the sequencer wrapped onto a live request.
    pub fn track(&mut self, id: u8) -> bool {
        !matches!(self.received.insert(id, false), Some(false))
    }

    /// Mark `id` received. Returns false for ids outside this batch.
    pub fn mark_received(&mut self, id: u8) -> bool {
        match self.received.get_mut(&id) {
            Some(flag) => {
                *flag = true;
                true
            }
            None => false,
        }
    }

    pub fn is_outstanding(&self, id: u8) -> bool {
        self.received.get(&id) == Some(&false)
    }

    pub fn is_empty(&self) -> bool {
        self.received.is_empty()
    }

    pub fn len(&self) -> usize {
        self.received.len()
    }

    pub fn outstanding(&self) -> usize {
        self.received.values().filter(|r| !**r).count()
    }

    /// True once a batch is tracked and every id in it has been received.
    pub fn all_received(&self) -> bool {
        !self.received.is_empty() && self.received.values().all(|r| *r)
    }
}
