use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::TaskError;

use super::PoolPermit;

/// Admission rank; lower values are dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(u8);

impl Priority {
    pub const HIGH: Priority = Priority(0);
    pub const NORMAL: Priority = Priority(5);
    pub const LOW: Priority = Priority(9);

    pub fn new(rank: u8) -> Self {
        Self(rank)
    }

    pub fn rank(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

pub(crate) type Resolution = oneshot::Sender<Result<PoolPermit, TaskError>>;

pub(crate) struct QueueEntry {
    pub priority: Priority,
    pub seq: u64,
    pub enqueued_at: Instant,
    pub tx: Resolution,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // BinaryHeap is a max-heap: the "greatest" entry is the lowest rank,
    // then the earliest sequence number.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending admissions for one provider, ordered by priority then FIFO.
#[derive(Default)]
pub(crate) struct AdmissionQueue {
    heap: BinaryHeap<QueueEntry>,
}

impl AdmissionQueue {
    pub fn push(&mut self, entry: QueueEntry) {
        self.heap.push(entry);
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Removes entries whose waiter has gone away.
    pub fn prune_cancelled(&mut self) -> usize {
        let before = self.heap.len();
        self.heap.retain(|e| !e.tx.is_closed());
        before - self.heap.len()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = QueueEntry> + '_ {
        self.heap.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(priority: Priority, seq: u64) -> QueueEntry {
        let (tx, _rx) = oneshot::channel();
        QueueEntry {
            priority,
            seq,
            enqueued_at: Instant::now(),
            tx,
        }
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut q = AdmissionQueue::default();
        q.push(entry(Priority::LOW, 0));
        q.push(entry(Priority::NORMAL, 1));
        q.push(entry(Priority::HIGH, 2));
        q.push(entry(Priority::NORMAL, 3));
        q.push(entry(Priority::HIGH, 4));

        let order: Vec<u64> = std::iter::from_fn(|| q.pop()).map(|e| e.seq).collect();
        assert_eq!(order, vec![2, 4, 1, 3, 0]);
    }

    #[test]
    fn test_prune_cancelled() {
        let mut q = AdmissionQueue::default();
        let (tx, rx) = oneshot::channel();
        q.push(QueueEntry {
            priority: Priority::NORMAL,
            seq: 0,
            enqueued_at: Instant::now(),
            tx,
        });
        q.push(entry(Priority::NORMAL, 1));
        let (tx_live, _rx_live) = oneshot::channel();
        q.push(QueueEntry {
            priority: Priority::NORMAL,
            seq: 2,
            enqueued_at: Instant::now(),
            tx: tx_live,
        });
        drop(rx);

        assert_eq!(q.prune_cancelled(), 2);
        assert_eq!(q.len(), 1);
    }
}
