// Handoff queue between the reader task and the consumer
//
// Unbounded lock-free FIFO (crossbeam's SegQueue). The queue itself never
// drops a sample; backlog is bounded only by how often the consumer drains.

use crate::types::SampleTuple;
use crossbeam::queue::SegQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Metrics for queue monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub total_pushed: u64,
    pub total_drained: u64,
    pub total_discarded: u64,
    pub current_size: usize,
    pub peak_size: usize,
}

struct QueueInner {
    queue: SegQueue<SampleTuple>,
    total_pushed: AtomicU64,
    total_drained: AtomicU64,
    total_discarded: AtomicU64,
    peak_size: AtomicUsize,
}

/// FIFO of sample tuples shared by one producer and one consumer
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct HandoffQueue {
    inner: Arc<QueueInner>,
}

impl HandoffQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                queue: SegQueue::new(),
                total_pushed: AtomicU64::new(0),
                total_drained: AtomicU64::new(0),
                total_discarded: AtomicU64::new(0),
                peak_size: AtomicUsize::new(0),
            }),
        }
    }

    /// Append a tuple at the back
    pub fn push(&self, sample: SampleTuple) {
        self.inner.queue.push(sample);
        self.inner.total_pushed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .peak_size
            .fetch_max(self.inner.queue.len(), Ordering::Relaxed);
    }

    /// Take every tuple queued at call time, oldest first
    ///
    /// Tuples pushed while the drain is in progress stay queued for the next call.
    pub fn drain(&self) -> Vec<SampleTuple> {
        let queued = self.inner.queue.len();
        let mut items = Vec::with_capacity(queued);

        for _ in 0..queued {
            match self.inner.queue.pop() {
                Some(sample) => items.push(sample),
                None => break,
            }
        }

        self.inner
            .total_drained
            .fetch_add(items.len() as u64, Ordering::Relaxed);
        items
    }

    /// Discard everything queued; returns how many tuples were dropped
    pub fn clear(&self) -> usize {
        let mut discarded = 0;
        while self.inner.queue.pop().is_some() {
            discarded += 1;
        }
        self.inner
            .total_discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
        discarded
    }

    pub fn len(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue.is_empty()
    }

    pub fn get_metrics(&self) -> QueueMetrics {
        QueueMetrics {
            total_pushed: self.inner.total_pushed.load(Ordering::Relaxed),
            total_drained: self.inner.total_drained.load(Ordering::Relaxed),
            total_discarded: self.inner.total_discarded.load(Ordering::Relaxed),
            current_size: self.inner.queue.len(),
            peak_size: self.inner.peak_size.load(Ordering::Relaxed),
        }
    }

    /// Reset metrics for a new session
    pub fn reset_metrics(&self) {
        self.inner.total_pushed.store(0, Ordering::Relaxed);
        self.inner.total_drained.store(0, Ordering::Relaxed);
        self.inner.total_discarded.store(0, Ordering::Relaxed);
        self.inner.peak_size.store(0, Ordering::Relaxed);
    }
}

impl Default for HandoffQueue {
    fn default() -> Self {
        Self::new()
    }
}
