//! The trace receiver: lifecycle and the single-flight ingestion loop.
//!
//! [`TraceReceiver::start`] spawns one background task that owns the
//! [`Scheduler`] and the handle of at most one in-flight collection pass.
//! Both are polled from the same `select!` loop, so a slow pass never delays
//! the timer and a tick that fires while a pass is running is dropped
//! (reported as `TickSkipped`) instead of queued. Passes run on their own
//! task, so a panic inside one is reported as `PassFailed` and the next tick
//! proceeds normally.
//!
//! Shutdown is cooperative. [`TraceReceiver::shutdown`] (or the host's
//! shutdown signal) stops the scheduler, lets the in-flight pass finish and
//! waits for the task, bounded by the configured shutdown timeout.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use skmonitor_core::{CollectionResult, ReceiverConfig};
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::collector::Collector;
use crate::error::ReceiverError;
use crate::lifecycle::{LifecycleState, StateCell};
use crate::metrics::{MetricsSnapshot, ReceiverMetrics};
use crate::observer::{Observer, Observers, PipelineEvent, TracingObserver};
use crate::scheduler::{Scheduler, TickEvent};
use crate::signal::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
use crate::sink::{SinkAdapter, TraceConsumer};

// ── Host boundary ────────────────────────────────────────────────────

/// The runtime hosting a component.
pub trait Host: Send + Sync {
    /// Signal fired when the host wants its components to stop.
    fn shutdown_signal(&self) -> Option<ShutdownSignal> {
        None
    }
}

/// Host that never asks components to stop on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHost;

impl Host for NoopHost {}

/// Host whose shutdown is driven by a [`ShutdownSignal`].
#[derive(Debug, Clone)]
pub struct SignalHost {
    signal: ShutdownSignal,
}

impl SignalHost {
    pub fn new(signal: ShutdownSignal) -> Self {
        Self { signal }
    }
}

impl Host for SignalHost {
    fn shutdown_signal(&self) -> Option<ShutdownSignal> {
        Some(self.signal.clone())
    }
}

/// Lifecycle hooks a host invokes on a component.
#[async_trait]
pub trait Component: Send + Sync {
    /// Start background work and return promptly.
    async fn start(&self, host: &dyn Host) -> Result<(), ReceiverError>;

    /// Stop background work, waiting a bounded time for it to drain.
    async fn shutdown(&self) -> Result<(), ReceiverError>;
}

// ── Status ───────────────────────────────────────────────────────────

/// JSON-serializable view of a receiver.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiverStatus {
    pub receiver: String,
    pub id: Uuid,
    pub state: LifecycleState,
    pub uptime_secs: f64,
    pub metrics: MetricsSnapshot,
}

// ── TraceReceiver ────────────────────────────────────────────────────

/// Periodically collects spans and delivers them to a consumer.
pub struct TraceReceiver {
    id: Uuid,
    config: ReceiverConfig,
    collector: Arc<dyn Collector>,
    sink: SinkAdapter,
    metrics: Arc<ReceiverMetrics>,
    observers: Observers,
    state: Arc<StateCell>,
    cancel: ShutdownTrigger,
    task: Mutex<Option<JoinHandle<()>>>,
    created: Instant,
}

impl TraceReceiver {
    pub fn new(
        config: ReceiverConfig,
        collector: Arc<dyn Collector>,
        consumer: Arc<dyn TraceConsumer>,
    ) -> Self {
        let metrics = Arc::new(ReceiverMetrics::new());
        let mut observers = Observers::default();
        observers.push(metrics.clone());
        observers.push(Arc::new(TracingObserver));
        let (cancel, _) = shutdown_channel();

        Self {
            id: Uuid::new_v4(),
            sink: SinkAdapter::new(consumer, &config.sink),
            config,
            collector,
            metrics,
            observers,
            state: Arc::new(StateCell::new()),
            cancel,
            task: Mutex::new(None),
            created: Instant::now(),
        }
    }

    /// Attach an extra observer. Only observers attached before `start`
    /// see loop events.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.state.load()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn status(&self) -> ReceiverStatus {
        ReceiverStatus {
            receiver: self.config.name.clone(),
            id: self.id,
            state: self.state(),
            uptime_secs: self.created.elapsed().as_secs_f64(),
            metrics: self.metrics(),
        }
    }

    /// Move `Idle → Running` and spawn the ingestion loop.
    ///
    /// Fails with [`ReceiverError::InvalidInterval`] (staying `Idle`) if the
    /// interval is zero, and with [`ReceiverError::AlreadyStarted`] if the
    /// receiver has left `Idle`. Neither failure spawns anything.
    pub async fn start(&self, host: &dyn Host) -> Result<(), ReceiverError> {
        let mut scheduler = Scheduler::new();
        scheduler.start(self.config.interval())?;

        // Held across the transition so a concurrent shutdown always finds the handle.
        let mut task = self.task.lock().await;
        if let Err(current) = self
            .state
            .transition(LifecycleState::Idle, LifecycleState::Running)
        {
            return Err(ReceiverError::AlreadyStarted(current));
        }

        let name: Arc<str> = Arc::from(self.config.name.as_str());
        let runner = Arc::new(PassRunner {
            name: name.clone(),
            collector: self.collector.clone(),
            sink: self.sink.clone(),
            observers: self.observers.clone(),
            cancel: self.cancel.subscribe(),
        });
        let ingest = IngestLoop {
            name,
            runner,
            state: self.state.clone(),
            observers: self.observers.clone(),
            trigger: self.cancel.clone(),
            cancel: self.cancel.subscribe(),
            host: host.shutdown_signal(),
        };

        *task = Some(tokio::spawn(ingest.run(scheduler)));
        info!(
            receiver = %self.config.name,
            id = %self.id,
            collector = self.collector.name(),
            interval = ?self.config.interval(),
            "receiver started"
        );
        Ok(())
    }

    /// Stop the receiver and wait for the in-flight pass to finish.
    ///
    /// Idempotent: once `Stopped`, further calls return `Ok` immediately.
    /// Returns [`ReceiverError::ShutdownTimeout`] if the pass outlives the
    /// shutdown timeout; the receiver is `Stopped` either way.
    pub async fn shutdown(&self) -> Result<(), ReceiverError> {
        loop {
            match self.state.load() {
                LifecycleState::Stopped => return Ok(()),
                LifecycleState::Idle => {
                    if self
                        .state
                        .transition(LifecycleState::Idle, LifecycleState::Stopped)
                        .is_ok()
                    {
                        debug!(receiver = %self.config.name, "receiver stopped before start");
                        return Ok(());
                    }
                }
                LifecycleState::Running => {
                    if self
                        .state
                        .transition(LifecycleState::Running, LifecycleState::ShuttingDown)
                        .is_ok()
                    {
                        self.observers
                            .emit(&self.config.name, &PipelineEvent::ShutdownStarted);
                        break;
                    }
                }
                LifecycleState::ShuttingDown => break,
            }
        }

        self.cancel.trigger();

        let mut task = self.task.lock().await;
        let Some(mut handle) = task.take() else {
            // Another caller already joined the loop.
            return Ok(());
        };

        let grace = self.config.shutdown_timeout();
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(receiver = %self.config.name, error = %e, "ingestion loop terminated abnormally");
                self.mark_stopped(false);
                Ok(())
            }
            Err(_) => {
                error!(
                    receiver = %self.config.name,
                    timeout = ?grace,
                    "shutdown timed out waiting for in-flight pass"
                );
                self.mark_stopped(true);
                warn!(receiver = %self.config.name, "abandoning ingestion loop task");
                drop(handle);
                Err(ReceiverError::ShutdownTimeout(grace))
            }
        }
    }

    fn mark_stopped(&self, timed_out: bool) {
        if self
            .state
            .transition(LifecycleState::ShuttingDown, LifecycleState::Stopped)
            .is_ok()
        {
            self.observers.emit(
                &self.config.name,
                &PipelineEvent::ShutdownCompleted { timed_out },
            );
        }
    }
}

impl Drop for TraceReceiver {
    fn drop(&mut self) {
        // Let a still-running loop wind down instead of ticking forever.
        self.cancel.trigger();
    }
}

#[async_trait]
impl Component for TraceReceiver {
    async fn start(&self, host: &dyn Host) -> Result<(), ReceiverError> {
        TraceReceiver::start(self, host).await
    }

    async fn shutdown(&self) -> Result<(), ReceiverError> {
        TraceReceiver::shutdown(self).await
    }
}

// ── Collection pass ──────────────────────────────────────────────────

/// Everything one pass needs, shared by every pass of a receiver.
struct PassRunner {
    name: Arc<str>,
    collector: Arc<dyn Collector>,
    sink: SinkAdapter,
    observers: Observers,
    cancel: ShutdownSignal,
}

impl PassRunner {
    fn emit(&self, event: PipelineEvent) {
        self.observers.emit(&self.name, &event);
    }

    /// Collect, then send. Failures are reported, never propagated.
    async fn run_pass(self: Arc<Self>, tick: TickEvent) {
        let pass = tick.seq;
        let started = Instant::now();
        self.emit(PipelineEvent::PassStarted { pass });

        let records = match self.collector.collect(&tick, &self.cancel).await {
            Ok(records) => records,
            Err(e) => {
                self.emit(PipelineEvent::PassFailed {
                    pass,
                    error: e.to_string(),
                });
                return;
            }
        };

        let result = CollectionResult::new(pass, tick.at, records);
        let records = result.len();
        let delivered = match self.sink.send(result, &self.cancel).await {
            Ok(_) => true,
            Err(rejected) => {
                self.emit(PipelineEvent::ResultDropped {
                    pass,
                    records: rejected.result.len(),
                    reason: rejected.reason.to_string(),
                });
                false
            }
        };

        self.emit(PipelineEvent::PassCompleted {
            pass,
            records,
            delivered,
            elapsed: started.elapsed(),
        });
    }
}

// ── Ingestion loop ───────────────────────────────────────────────────

/// State owned by the background task.
struct IngestLoop {
    name: Arc<str>,
    runner: Arc<PassRunner>,
    state: Arc<StateCell>,
    observers: Observers,
    trigger: ShutdownTrigger,
    cancel: ShutdownSignal,
    host: Option<ShutdownSignal>,
}

impl IngestLoop {
    async fn run(self, mut scheduler: Scheduler) {
        let mut in_flight: Option<JoinHandle<()>> = None;
        let mut in_flight_pass = 0u64;
        let mut draining = false;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled(), if !draining => {
                    draining = true;
                    self.begin_drain(&mut scheduler, "shutdown requested");
                    if in_flight.is_none() {
                        break;
                    }
                }
                _ = wait_host(&self.host), if !draining => {
                    draining = true;
                    self.trigger.trigger();
                    self.begin_drain(&mut scheduler, "host cancellation");
                    if in_flight.is_none() {
                        break;
                    }
                }
                joined = drive(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    if let Err(e) = joined {
                        self.pass_aborted(in_flight_pass, e);
                    }
                    if draining {
                        break;
                    }
                }
                Some(tick) = scheduler.tick(), if !draining => {
                    if in_flight.is_some() {
                        self.observers.emit(
                            &self.name,
                            &PipelineEvent::TickSkipped { tick: tick.seq, in_flight: in_flight_pass },
                        );
                    } else {
                        in_flight_pass = tick.seq;
                        in_flight = Some(tokio::spawn(self.runner.clone().run_pass(tick)));
                    }
                }
                else => break,
            }
        }

        scheduler.stop();
        self.finish();
    }

    fn pass_aborted(&self, pass: u64, e: JoinError) {
        let error = if e.is_panic() {
            format!("pass panicked: {e}")
        } else {
            format!("pass task aborted: {e}")
        };
        self.observers
            .emit(&self.name, &PipelineEvent::PassFailed { pass, error });
    }

    fn begin_drain(&self, scheduler: &mut Scheduler, reason: &str) {
        scheduler.stop();
        if self
            .state
            .transition(LifecycleState::Running, LifecycleState::ShuttingDown)
            .is_ok()
        {
            self.observers.emit(&self.name, &PipelineEvent::ShutdownStarted);
        }
        debug!(receiver = %self.name, reason, "ingestion loop draining");
    }

    fn finish(&self) {
        // Covers exits that bypassed begin_drain.
        let _ = self
            .state
            .transition(LifecycleState::Running, LifecycleState::ShuttingDown);

        match self
            .state
            .transition(LifecycleState::ShuttingDown, LifecycleState::Stopped)
        {
            Ok(()) => self.observers.emit(
                &self.name,
                &PipelineEvent::ShutdownCompleted { timed_out: false },
            ),
            Err(_) => {
                warn!(receiver = %self.name, "abandoned ingestion loop finished after shutdown timeout");
            }
        }
    }
}

async fn drive(pass: &mut Option<JoinHandle<()>>) -> Result<(), JoinError> {
    match pass {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn wait_host(host: &Option<ShutdownSignal>) {
    match host {
        Some(signal) => signal.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::FnCollector;
    use crate::sink::ChannelConsumer;
    use skmonitor_core::TraceRecord;
    use std::time::Duration;

    fn receiver(interval_ms: u64) -> (TraceReceiver, tokio::sync::mpsc::Receiver<CollectionResult>) {
        let collector = FnCollector::new("one", |tick: TickEvent, _cancel| async move {
            Ok(vec![TraceRecord::new("t", format!("s{}", tick.seq), "op")])
        });
        let (consumer, rx) = ChannelConsumer::new(64);
        let config = ReceiverConfig::default()
            .with_name("unit")
            .with_interval(Duration::from_millis(interval_ms))
            .with_shutdown_timeout(Duration::from_secs(2));
        (
            TraceReceiver::new(config, Arc::new(collector), Arc::new(consumer)),
            rx,
        )
    }

    #[tokio::test]
    async fn zero_interval_keeps_receiver_idle() {
        let (rx, _results) = receiver(0);
        let err = rx.start(&NoopHost).await.unwrap_err();
        assert!(matches!(err, ReceiverError::InvalidInterval(_)));
        assert_eq!(rx.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn start_runs_and_shutdown_stops() {
        let (rx, mut results) = receiver(20);
        rx.start(&NoopHost).await.unwrap();
        assert_eq!(rx.state(), LifecycleState::Running);

        let first = tokio::time::timeout(Duration::from_secs(1), results.recv())
            .await
            .expect("a pass should deliver")
            .unwrap();
        assert_eq!(first.pass_id, 1);

        rx.shutdown().await.unwrap();
        assert_eq!(rx.state(), LifecycleState::Stopped);
        assert_eq!(rx.metrics().shutdowns_completed, 1);
    }

    #[tokio::test]
    async fn shutdown_before_start_stops_without_events() {
        let (rx, _results) = receiver(20);
        rx.shutdown().await.unwrap();
        assert_eq!(rx.state(), LifecycleState::Stopped);
        assert_eq!(rx.metrics(), MetricsSnapshot::default());

        let err = rx.start(&NoopHost).await.unwrap_err();
        assert!(matches!(
            err,
            ReceiverError::AlreadyStarted(LifecycleState::Stopped)
        ));
    }

    #[tokio::test]
    async fn status_reports_name_and_state() {
        let (rx, _results) = receiver(20);
        let status = rx.status();
        assert_eq!(status.receiver, "unit");
        assert_eq!(status.state, LifecycleState::Idle);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "idle");
        assert_eq!(json["metrics"]["passes_started"], 0);
    }
}
