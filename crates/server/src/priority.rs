//! Priority send-queue for per-peer egress backpressure.
//!
//! Queued messages are kept in a single `Vec` ordered by descending
//! priority with FIFO order preserved within a priority tier — an
//! unsorted linear-scan insert, correct but `O(n)` per insert (a binary
//! heap keyed by `(-priority, enqueued_at)` is the drop-in improvement
//! noted for a future pass, not needed at the queue depths this core
//! targets).

use std::collections::VecDeque;

/// Send priority. `Ord` follows declaration order, so `Critical > High >
/// Normal > Low` exactly matches the wire-level intent: higher variants
/// sort first in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// One queued outbound frame awaiting a flush.
pub struct QueuedMessage {
    pub bytes: Vec<u8>,
    pub priority: Priority,
    pub enqueued_at_ms: u64,
}

/// Priority-ordered, FIFO-within-priority send queue with a capacity cap.
#[derive(Default)]
pub struct PriorityQueue {
    entries: VecDeque<QueuedMessage>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `message`, scanning from the front and placing it just
    /// before the first strictly-lower-priority entry (so equal
    /// priorities retain FIFO order). If the queue is at `max_size` after
    /// the insert, drop the oldest entry among the lowest priority
    /// present.
    pub fn enqueue(&mut self, message: QueuedMessage, max_size: usize) {
        let index = self
            .entries
            .iter()
            .position(|existing| existing.priority < message.priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(index, message);

        if self.entries.len() > max_size {
            self.drop_lowest_priority();
        }
    }

    fn drop_lowest_priority(&mut self) {
        let Some(min_priority) = self.entries.iter().map(|m| m.priority).min() else {
            return;
        };
        if let Some(index) = self.entries.iter().position(|m| m.priority == min_priority) {
            self.entries.remove(index);
        }
    }

    /// Pop up to `cap` entries in priority-then-FIFO order for a flush
    /// pass. The caller is expected to stop early (by not calling this
    /// again) if backpressure reasserts mid-flush.
    pub fn pop_up_to(&mut self, cap: usize) -> Vec<QueuedMessage> {
        let take = cap.min(self.entries.len());
        self.entries.drain(0..take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(priority: Priority, at: u64) -> QueuedMessage {
        QueuedMessage {
            bytes: vec![1],
            priority,
            enqueued_at_ms: at,
        }
    }

    #[test]
    fn equal_priority_entries_preserve_fifo_order() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(msg(Priority::Normal, 1), 100);
        queue.enqueue(msg(Priority::Normal, 2), 100);
        queue.enqueue(msg(Priority::Normal, 3), 100);
        let popped = queue.pop_up_to(10);
        let order: Vec<u64> = popped.iter().map(|m| m.enqueued_at_ms).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn higher_priority_is_placed_ahead_of_lower() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(msg(Priority::Low, 1), 100);
        queue.enqueue(msg(Priority::Critical, 2), 100);
        queue.enqueue(msg(Priority::Normal, 3), 100);
        let popped = queue.pop_up_to(10);
        let order: Vec<Priority> = popped.iter().map(|m| m.priority).collect();
        assert_eq!(order, vec![Priority::Critical, Priority::Normal, Priority::Low]);
    }

    #[test]
    fn overflow_drops_the_oldest_lowest_priority_entry() {
        let mut queue = PriorityQueue::new();
        queue.enqueue(msg(Priority::Low, 1), 2);
        queue.enqueue(msg(Priority::Low, 2), 2);
        // third insert overflows a cap of 2; the new Critical message
        // should survive and exactly one Low entry should be dropped.
        queue.enqueue(msg(Priority::Critical, 3), 2);
        assert_eq!(queue.len(), 2);
        let popped = queue.pop_up_to(10);
        let priorities: Vec<Priority> = popped.iter().map(|m| m.priority).collect();
        assert_eq!(priorities, vec![Priority::Critical, Priority::Low]);
        assert_eq!(popped[1].enqueued_at_ms, 2, "oldest Low entry should remain");
    }

    #[test]
    fn pop_up_to_caps_how_many_entries_are_drained() {
        let mut queue = PriorityQueue::new();
        for i in 0..5 {
            queue.enqueue(msg(Priority::Normal, i), 100);
        }
        let popped = queue.pop_up_to(3);
        assert_eq!(popped.len(), 3);
        assert_eq!(queue.len(), 2);
    }
}
