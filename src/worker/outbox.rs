use std::collections::VecDeque;
use std::sync::Mutex;

use crate::db::models::{SwapEvent, TransferEvent};

/// The two outbound channels fed by the live pipeline.
#[derive(Default)]
pub struct Outbox {
    pub transfers: BatchQueue<TransferEvent>,
    pub swaps: BatchQueue<SwapEvent>,
}

/// Unbounded FIFO drained in capped batches by the emitter.
///
/// Producers never block: when blocks arrive faster than the emitter
/// ticks, the queue grows and every tick takes at most `max` items.
pub struct BatchQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Default for BatchQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> BatchQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
    }

    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        self.lock().extend(items);
    }

    /// Take up to `max` of the oldest items.
    pub fn drain(&self, max: usize) -> Vec<T> {
        let mut items = self.lock();
        let take = max.min(items.len());
        items.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
