//! Delivery of collection results to the downstream consumer.
//!
//! [`TraceConsumer`] is the contract a downstream stage implements.
//! [`SinkAdapter`] wraps one consumer with the receiver's delivery policy:
//! a send blocks the current pass until the consumer answers, rejected
//! results are handed back to the caller instead of being buffered, and a
//! send still running when shutdown begins gets a bounded drain grace.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use skmonitor_core::{CollectionResult, SinkConfig};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{ConsumerError, RejectReason, SinkRejectedError};
use crate::signal::ShutdownSignal;

/// Downstream stage receiving collection results.
#[async_trait]
pub trait TraceConsumer: Send + Sync {
    /// Accept or reject one result. May block to apply backpressure.
    async fn consume(&self, result: &CollectionResult) -> Result<(), ConsumerError>;
}

#[async_trait]
impl<T: TraceConsumer + ?Sized> TraceConsumer for Arc<T> {
    async fn consume(&self, result: &CollectionResult) -> Result<(), ConsumerError> {
        (**self).consume(result).await
    }
}

// ── Provided consumers ───────────────────────────────────────────────

/// Forwards results into a bounded tokio channel.
///
/// A full channel makes `consume` wait, which propagates backpressure into
/// the pass. A closed channel is reported as [`ConsumerError::Unavailable`].
#[derive(Debug, Clone)]
pub struct ChannelConsumer {
    tx: mpsc::Sender<CollectionResult>,
}

impl ChannelConsumer {
    /// Create a consumer and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<CollectionResult>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TraceConsumer for ChannelConsumer {
    async fn consume(&self, result: &CollectionResult) -> Result<(), ConsumerError> {
        self.tx
            .send(result.clone())
            .await
            .map_err(|_| ConsumerError::Unavailable("result channel closed".into()))
    }
}

type ConsumeFn = Box<dyn Fn(&CollectionResult) -> Result<(), ConsumerError> + Send + Sync>;

/// Adapts a synchronous closure into a [`TraceConsumer`].
pub struct FnConsumer {
    f: ConsumeFn,
}

impl FnConsumer {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&CollectionResult) -> Result<(), ConsumerError> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl TraceConsumer for FnConsumer {
    async fn consume(&self, result: &CollectionResult) -> Result<(), ConsumerError> {
        (self.f)(result)
    }
}

// ── SinkAdapter ──────────────────────────────────────────────────────

enum Delivery {
    Done(Result<(), ConsumerError>),
    Abandoned,
}

/// Applies the delivery policy around a [`TraceConsumer`].
#[derive(Clone)]
pub struct SinkAdapter {
    consumer: Arc<dyn TraceConsumer>,
    drain_grace: Duration,
}

impl SinkAdapter {
    pub fn new(consumer: Arc<dyn TraceConsumer>, config: &SinkConfig) -> Self {
        Self {
            consumer,
            drain_grace: config.drain_grace(),
        }
    }

    /// Deliver `result`, waiting for the consumer to answer.
    ///
    /// On success ownership of the result has passed downstream and the
    /// number of delivered records is returned. On rejection the original
    /// result comes back inside the error. Once `cancel` fires the consumer
    /// has at most the drain grace left before the send is abandoned.
    pub async fn send(
        &self,
        result: CollectionResult,
        cancel: &ShutdownSignal,
    ) -> Result<usize, SinkRejectedError> {
        let delivery = {
            let consume = self.consumer.consume(&result);
            tokio::pin!(consume);

            tokio::select! {
                biased;
                res = &mut consume => Delivery::Done(res),
                _ = cancel.cancelled() => {
                    match tokio::time::timeout(self.drain_grace, &mut consume).await {
                        Ok(res) => Delivery::Done(res),
                        Err(_) => Delivery::Abandoned,
                    }
                }
            }
        };

        match delivery {
            Delivery::Done(Ok(())) => Ok(result.len()),
            Delivery::Done(Err(e)) => Err(SinkRejectedError::new(result, RejectReason::Consumer(e))),
            Delivery::Abandoned => {
                warn!(
                    pass = result.pass_id,
                    records = result.len(),
                    grace = ?self.drain_grace,
                    "abandoning send still in flight at shutdown"
                );
                Err(SinkRejectedError::new(
                    result,
                    RejectReason::Abandoned(self.drain_grace),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use skmonitor_core::TraceRecord;
    use std::time::Instant;

    use crate::signal::shutdown_channel;

    fn result(pass_id: u64, n: usize) -> CollectionResult {
        let records = (0..n)
            .map(|i| TraceRecord::new("t", format!("s{i}"), "op"))
            .collect();
        CollectionResult::new(pass_id, Utc::now(), records)
    }

    fn sink(consumer: impl TraceConsumer + 'static, grace_ms: u64) -> SinkAdapter {
        SinkAdapter::new(
            Arc::new(consumer),
            &SinkConfig {
                drain_grace_ms: grace_ms,
            },
        )
    }

    /// Consumer that never answers within any test's patience.
    struct StuckConsumer;

    #[async_trait]
    impl TraceConsumer for StuckConsumer {
        async fn consume(&self, _result: &CollectionResult) -> Result<(), ConsumerError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn accepted_send_returns_record_count() {
        let (consumer, mut rx) = ChannelConsumer::new(4);
        let adapter = sink(consumer, 100);

        let delivered = adapter
            .send(result(1, 3), &ShutdownSignal::never())
            .await
            .unwrap();
        assert_eq!(delivered, 3);

        let got = rx.recv().await.unwrap();
        assert_eq!(got.pass_id, 1);
        assert_eq!(got.len(), 3);
    }

    #[tokio::test]
    async fn rejection_returns_original_result() {
        let adapter = sink(
            FnConsumer::new(|_r| Err(ConsumerError::Rejected("quota".into()))),
            100,
        );

        let err = adapter
            .send(result(9, 2), &ShutdownSignal::never())
            .await
            .unwrap_err();
        assert_eq!(err.pass_id, 9);
        assert!(matches!(err.reason, RejectReason::Consumer(ConsumerError::Rejected(_))));
        assert!(err.to_string().contains("quota"));
        assert_eq!(err.into_result().len(), 2);
    }

    #[tokio::test]
    async fn closed_channel_is_unavailable() {
        let (consumer, rx) = ChannelConsumer::new(1);
        drop(rx);
        let adapter = sink(consumer, 100);

        let err = adapter
            .send(result(1, 1), &ShutdownSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(
            err.reason,
            RejectReason::Consumer(ConsumerError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn full_channel_blocks_until_drained() {
        let (consumer, mut rx) = ChannelConsumer::new(1);
        let adapter = sink(consumer, 100);
        adapter
            .send(result(1, 1), &ShutdownSignal::never())
            .await
            .unwrap();

        let second = {
            let adapter = adapter.clone();
            tokio::spawn(async move { adapter.send(result(2, 1), &ShutdownSignal::never()).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!second.is_finished(), "send should wait for channel capacity");

        assert_eq!(rx.recv().await.unwrap().pass_id, 1);
        assert_eq!(second.await.unwrap().unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap().pass_id, 2);
    }

    #[tokio::test]
    async fn stuck_send_abandoned_after_drain_grace() {
        let adapter = sink(StuckConsumer, 50);
        let (trigger, signal) = shutdown_channel();

        let started = Instant::now();
        let handle = tokio::spawn(async move { adapter.send(result(3, 4), &signal).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger();

        let err = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("send should give up after the grace period")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err.reason, RejectReason::Abandoned(_)));
        assert_eq!(err.result.len(), 4);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn send_started_after_cancel_still_completes_within_grace() {
        let (consumer, mut rx) = ChannelConsumer::new(1);
        let adapter = sink(consumer, 200);
        let (trigger, signal) = shutdown_channel();
        trigger.trigger();

        assert_eq!(adapter.send(result(5, 2), &signal).await.unwrap(), 2);
        assert_eq!(rx.recv().await.unwrap().pass_id, 5);
    }
}
