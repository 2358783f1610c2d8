//! Admission queue ordered by descending confidence

use async_trait::async_trait;
use common::{Signal, SignalSink};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Queue entry. Higher confidence pops first; equal confidence pops in
/// insertion order.
#[derive(Debug)]
struct ScheduledItem {
    seq: u64,
    signal: Signal,
}

impl PartialEq for ScheduledItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledItem {}

impl PartialOrd for ScheduledItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.signal
            .confidence
            .total_cmp(&other.signal.confidence)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
pub struct PriorityScheduler {
    heap: Mutex<BinaryHeap<ScheduledItem>>,
    next_seq: AtomicU64,
}

impl PriorityScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn heap(&self) -> MutexGuard<'_, BinaryHeap<ScheduledItem>> {
        // The heap stays consistent even if a holder panicked
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, signal: Signal) {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        debug!(
            "Queued {} {} at confidence {:.4}",
            signal.symbol, signal.direction, signal.confidence
        );
        self.heap().push(ScheduledItem { seq, signal });
    }

    pub fn dequeue(&self) -> Option<Signal> {
        self.heap().pop().map(|item| item.signal)
    }

    pub fn len(&self) -> usize {
        self.heap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap().is_empty()
    }
}

#[async_trait]
impl SignalSink for PriorityScheduler {
    async fn submit(&self, signal: Signal) -> anyhow::Result<()> {
        self.enqueue(signal);
        Ok(())
    }
}
