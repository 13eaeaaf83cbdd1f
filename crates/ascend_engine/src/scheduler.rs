//! # Delay Queue
//!
//! Deadline-ordered task queue polled by `Engine::tick`. Replaces free-running
//! timers: nothing fires unless the owner asks what is due.
//!
//! ```text
//! schedule(t+30s, Flush) ─┐
//! schedule(t+1h,  Motivation) ─┼──► min-heap by deadline ──► due(now) ─► [Flush]
//! schedule(t+30s, Flush) ─┘          (FIFO on equal deadlines)
//! ```

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

/// Recurring work the engine schedules for itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScheduledTask {
    /// Write dirty state slices to the store.
    Flush,
    /// Push a motivational notification.
    Motivation,
}

struct Entry<T> {
    at: DateTime<Utc>,
    seq: u64,
    task: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

/// Min-heap of tasks keyed by deadline.
pub struct DelayQueue<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    next_seq: u64,
}

impl<T> DelayQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Queues `task` to become due at `at`.
    pub fn schedule(&mut self, at: DateTime<Utc>, task: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry { at, seq, task }));
    }

    /// Removes and returns every task whose deadline is at or before `now`,
    /// earliest first.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<T> {
        let mut ready = Vec::new();
        while self.heap.peek().is_some_and(|Reverse(entry)| entry.at <= now) {
            if let Some(Reverse(entry)) = self.heap.pop() {
                ready.push(entry.task);
            }
        }
        ready
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse(entry)| entry.at)
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for DelayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_only_due_tasks_are_returned() {
        let mut queue = DelayQueue::new();
        queue.schedule(t0() + Duration::seconds(60), ScheduledTask::Motivation);
        queue.schedule(t0() + Duration::seconds(10), ScheduledTask::Flush);

        assert!(queue.due(t0()).is_empty());
        assert_eq!(queue.due(t0() + Duration::seconds(10)), vec![ScheduledTask::Flush]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_deadline(), Some(t0() + Duration::seconds(60)));
        assert_eq!(queue.due(t0() + Duration::hours(1)), vec![ScheduledTask::Motivation]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_equal_deadlines_are_fifo() {
        let mut queue = DelayQueue::new();
        for n in 0..5 {
            queue.schedule(t0(), n);
        }
        queue.schedule(t0() - Duration::seconds(1), 99);

        assert_eq!(queue.due(t0()), vec![99, 0, 1, 2, 3, 4]);
    }
}
