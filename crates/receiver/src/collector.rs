//! Collector capability: what a pass calls to gather spans.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use skmonitor_core::TraceRecord;

use crate::error::CollectError;
use crate::scheduler::TickEvent;
use crate::signal::ShutdownSignal;

/// Gathers the spans for one collection pass.
///
/// Implementations may block for as long as they need; only the current pass
/// waits, never the timer. Long-running collectors should watch `cancel` and
/// return [`CollectError::Cancelled`] once it fires so shutdown is not held up.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(
        &self,
        tick: &TickEvent,
        cancel: &ShutdownSignal,
    ) -> Result<Vec<TraceRecord>, CollectError>;

    /// Human-readable name used in logging.
    fn name(&self) -> &str {
        "collector"
    }
}

#[async_trait]
impl<T: Collector + ?Sized> Collector for Arc<T> {
    async fn collect(
        &self,
        tick: &TickEvent,
        cancel: &ShutdownSignal,
    ) -> Result<Vec<TraceRecord>, CollectError> {
        (**self).collect(tick, cancel).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Boxed future returned by a collection closure.
pub type CollectFuture =
    Pin<Box<dyn Future<Output = Result<Vec<TraceRecord>, CollectError>> + Send>>;

type CollectFn = Box<dyn Fn(TickEvent, ShutdownSignal) -> CollectFuture + Send + Sync>;

/// Adapts an async closure into a [`Collector`].
///
/// # Example
/// ```ignore
/// let collector = FnCollector::new("static", |_tick, _cancel| async {
///     Ok(vec![TraceRecord::new("t1", "s1", "poll")])
/// });
/// ```
pub struct FnCollector {
    name: String,
    f: CollectFn,
}

impl FnCollector {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(TickEvent, ShutdownSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<TraceRecord>, CollectError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(move |tick, cancel| Box::pin(f(tick, cancel))),
        }
    }
}

#[async_trait]
impl Collector for FnCollector {
    async fn collect(
        &self,
        tick: &TickEvent,
        cancel: &ShutdownSignal,
    ) -> Result<Vec<TraceRecord>, CollectError> {
        (self.f)(tick.clone(), cancel.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Instant;

    fn tick(seq: u64) -> TickEvent {
        TickEvent {
            seq,
            scheduled_at: Instant::now(),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fn_collector_receives_tick() {
        let collector = FnCollector::new("echo", |tick: TickEvent, _cancel| async move {
            Ok(vec![TraceRecord::new("t", format!("s{}", tick.seq), "echo")])
        });
        let spans = collector
            .collect(&tick(4), &ShutdownSignal::never())
            .await
            .unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].span_id, "s4");
        assert_eq!(collector.name(), "echo");
    }

    #[tokio::test]
    async fn fn_collector_propagates_errors() {
        let collector = FnCollector::new("broken", |_tick, _cancel| async {
            Err(CollectError::Source("upstream down".into()))
        });
        let err = collector
            .collect(&tick(1), &ShutdownSignal::never())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("upstream down"));
    }

    #[tokio::test]
    async fn arc_collector_delegates() {
        let inner = Arc::new(FnCollector::new("shared", |_tick, _cancel| async {
            Ok(Vec::new())
        }));
        let collector: Arc<dyn Collector> = inner;
        assert_eq!(collector.name(), "shared");
        assert!(collector
            .collect(&tick(1), &ShutdownSignal::never())
            .await
            .unwrap()
            .is_empty());
    }
}
