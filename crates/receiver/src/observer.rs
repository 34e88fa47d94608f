//! Observability boundary: pipeline events and their observers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

/// Something that happened inside the ingestion loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    PassStarted {
        pass: u64,
    },
    PassCompleted {
        pass: u64,
        records: usize,
        delivered: bool,
        elapsed: Duration,
    },
    PassFailed {
        pass: u64,
        error: String,
    },
    /// A tick fired while `in_flight` was still running and was dropped.
    TickSkipped {
        tick: u64,
        in_flight: u64,
    },
    ResultDropped {
        pass: u64,
        records: usize,
        reason: String,
    },
    ShutdownStarted,
    ShutdownCompleted {
        timed_out: bool,
    },
}

impl PipelineEvent {
    /// Stable short name, handy for assertions and log filtering.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PassStarted { .. } => "pass_started",
            Self::PassCompleted { .. } => "pass_completed",
            Self::PassFailed { .. } => "pass_failed",
            Self::TickSkipped { .. } => "tick_skipped",
            Self::ResultDropped { .. } => "result_dropped",
            Self::ShutdownStarted => "shutdown_started",
            Self::ShutdownCompleted { .. } => "shutdown_completed",
        }
    }
}

/// Receives every [`PipelineEvent`] a receiver emits.
///
/// Called inline on the receiver's task, so implementations must be quick
/// and must not block.
pub trait Observer: Send + Sync {
    fn on_event(&self, receiver: &str, event: &PipelineEvent);
}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, receiver: &str, event: &PipelineEvent) {
        match event {
            PipelineEvent::PassStarted { pass } => {
                debug!(receiver, pass, "collection pass started");
            }
            PipelineEvent::PassCompleted {
                pass,
                records,
                delivered,
                elapsed,
            } => {
                info!(receiver, pass, records, delivered, elapsed = ?elapsed, "collection pass completed");
            }
            PipelineEvent::PassFailed { pass, error } => {
                error!(receiver, pass, error = %error, "collection pass failed");
            }
            PipelineEvent::TickSkipped { tick, in_flight } => {
                warn!(receiver, tick, in_flight, "tick skipped, previous pass still running");
            }
            PipelineEvent::ResultDropped {
                pass,
                records,
                reason,
            } => {
                warn!(receiver, pass, records, reason = %reason, "sink rejected result, dropping it");
            }
            PipelineEvent::ShutdownStarted => {
                info!(receiver, "shutdown started");
            }
            PipelineEvent::ShutdownCompleted { timed_out } => {
                if *timed_out {
                    warn!(receiver, "shutdown completed, background task abandoned");
                } else {
                    info!(receiver, "shutdown completed");
                }
            }
        }
    }
}

/// Fan-out over every attached observer.
#[derive(Clone, Default)]
pub(crate) struct Observers {
    list: Vec<Arc<dyn Observer>>,
}

impl Observers {
    pub(crate) fn push(&mut self, observer: Arc<dyn Observer>) {
        self.list.push(observer);
    }

    pub(crate) fn emit(&self, receiver: &str, event: &PipelineEvent) {
        for observer in &self.list {
            observer.on_event(receiver, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, &'static str)>>,
    }

    impl Observer for Recorder {
        fn on_event(&self, receiver: &str, event: &PipelineEvent) {
            self.seen
                .lock()
                .unwrap()
                .push((receiver.to_string(), event.kind()));
        }
    }

    #[test]
    fn emit_reaches_every_observer_in_order() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let mut observers = Observers::default();
        observers.push(a.clone());
        observers.push(Arc::new(TracingObserver));
        observers.push(b.clone());

        observers.emit("rx", &PipelineEvent::PassStarted { pass: 1 });
        observers.emit("rx", &PipelineEvent::ShutdownStarted);

        let expected = vec![
            ("rx".to_string(), "pass_started"),
            ("rx".to_string(), "shutdown_started"),
        ];
        assert_eq!(*a.seen.lock().unwrap(), expected);
        assert_eq!(*b.seen.lock().unwrap(), expected);
    }

    #[test]
    fn kinds_are_distinct() {
        let events = [
            PipelineEvent::PassStarted { pass: 1 },
            PipelineEvent::PassCompleted {
                pass: 1,
                records: 0,
                delivered: true,
                elapsed: Duration::ZERO,
            },
            PipelineEvent::PassFailed {
                pass: 1,
                error: "x".into(),
            },
            PipelineEvent::TickSkipped { tick: 2, in_flight: 1 },
            PipelineEvent::ResultDropped {
                pass: 1,
                records: 0,
                reason: "x".into(),
            },
            PipelineEvent::ShutdownStarted,
            PipelineEvent::ShutdownCompleted { timed_out: false },
        ];
        let mut kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), events.len());
    }
}
