//! Receiver counters and their optional HTTP exposure.
//!
//! [`ReceiverMetrics`] is an [`Observer`] that counts pipeline events.
//! [`spawn_metrics_server`] serves the receiver's status as JSON on
//! `GET /metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::observer::{Observer, PipelineEvent};
use crate::receiver::{ReceiverStatus, TraceReceiver};
use crate::signal::ShutdownSignal;

// ── Counters ─────────────────────────────────────────────────────────

/// Lock-free event counters for one receiver.
#[derive(Debug, Default)]
pub struct ReceiverMetrics {
    passes_started: AtomicU64,
    passes_completed: AtomicU64,
    passes_failed: AtomicU64,
    ticks_skipped: AtomicU64,
    results_dropped: AtomicU64,
    records_delivered: AtomicU64,
    records_dropped: AtomicU64,
    shutdowns_completed: AtomicU64,
}

/// Point-in-time copy of [`ReceiverMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub passes_started: u64,
    pub passes_completed: u64,
    pub passes_failed: u64,
    pub ticks_skipped: u64,
    pub results_dropped: u64,
    pub records_delivered: u64,
    pub records_dropped: u64,
    pub shutdowns_completed: u64,
}

impl ReceiverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            passes_started: self.passes_started.load(Ordering::Relaxed),
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            passes_failed: self.passes_failed.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            shutdowns_completed: self.shutdowns_completed.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl Observer for ReceiverMetrics {
    fn on_event(&self, _receiver: &str, event: &PipelineEvent) {
        match event {
            PipelineEvent::PassStarted { .. } => bump(&self.passes_started, 1),
            PipelineEvent::PassCompleted {
                records, delivered, ..
            } => {
                bump(&self.passes_completed, 1);
                if *delivered {
                    bump(&self.records_delivered, *records as u64);
                }
            }
            PipelineEvent::PassFailed { .. } => bump(&self.passes_failed, 1),
            PipelineEvent::TickSkipped { .. } => bump(&self.ticks_skipped, 1),
            PipelineEvent::ResultDropped { records, .. } => {
                bump(&self.results_dropped, 1);
                bump(&self.records_dropped, *records as u64);
            }
            PipelineEvent::ShutdownStarted => {}
            PipelineEvent::ShutdownCompleted { .. } => bump(&self.shutdowns_completed, 1),
        }
    }
}

// ── HTTP server ──────────────────────────────────────────────────────

/// Spawn the metrics HTTP server on the given port.
///
/// Returns a `JoinHandle` that resolves when `shutdown` fires.
pub fn spawn_metrics_server(
    port: u16,
    receiver: Arc<TraceReceiver>,
    shutdown: ShutdownSignal,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = axum::Router::new()
            .route("/metrics", axum::routing::get(metrics_handler))
            .with_state(receiver);

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(port, error = %e, "failed to bind metrics HTTP server");
                return;
            }
        };

        tracing::info!(port, "metrics HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .ok();

        tracing::info!("metrics HTTP server stopped");
    })
}

/// Axum handler: `GET /metrics` → JSON status.
async fn metrics_handler(
    axum::extract::State(receiver): axum::extract::State<Arc<TraceReceiver>>,
) -> axum::Json<ReceiverStatus> {
    axum::Json(receiver.status())
}

// ── Tests ────────────────────────────────────────────────────────────
