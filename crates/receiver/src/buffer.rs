//! Bounded in-memory span buffer.
//!
//! Producers [`push`](SpanBuffer::push) finished spans as they arrive; each
//! collection pass [`drain`](SpanBuffer::drain)s everything accumulated since
//! the previous pass. When the buffer is full the oldest span is evicted so
//! memory stays bounded between passes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use skmonitor_core::TraceRecord;

use crate::collector::Collector;
use crate::error::CollectError;
use crate::scheduler::TickEvent;
use crate::signal::ShutdownSignal;

#[derive(Debug)]
struct Inner {
    spans: VecDeque<TraceRecord>,
    capacity: usize,
    dropped: u64,
}

/// Cloneable handle to a shared, bounded span queue.
#[derive(Debug, Clone)]
pub struct SpanBuffer {
    inner: Arc<Mutex<Inner>>,
}

impl SpanBuffer {
    /// Create a buffer holding at most `capacity` spans (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                spans: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                dropped: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a span, evicting the oldest if at capacity.
    ///
    /// Returns `false` when a span had to be evicted.
    pub fn push(&self, span: TraceRecord) -> bool {
        let mut inner = self.lock();
        let evicted = if inner.spans.len() == inner.capacity {
            inner.spans.pop_front();
            inner.dropped += 1;
            true
        } else {
            false
        };
        inner.spans.push_back(span);
        !evicted
    }

    /// Append several spans in order.
    pub fn extend(&self, spans: impl IntoIterator<Item = TraceRecord>) {
        for span in spans {
            self.push(span);
        }
    }

    /// Take every buffered span in insertion order, leaving the buffer empty.
    pub fn drain(&self) -> Vec<TraceRecord> {
        let mut inner = self.lock();
        std::mem::take(&mut inner.spans).into()
    }

    pub fn len(&self) -> usize {
        self.lock().spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().spans.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Total spans evicted because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

#[async_trait]
impl Collector for SpanBuffer {
    async fn collect(
        &self,
        _tick: &TickEvent,
        _cancel: &ShutdownSignal,
    ) -> Result<Vec<TraceRecord>, CollectError> {
        Ok(self.drain())
    }

    fn name(&self) -> &str {
        "span-buffer"
    }
}
