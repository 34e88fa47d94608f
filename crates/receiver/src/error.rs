use std::time::Duration;

use skmonitor_core::{CollectionResult, ConfigError};
use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Errors returned by the receiver's lifecycle methods.
#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("invalid tick interval {0:?}: must be greater than zero")]
    InvalidInterval(Duration),

    #[error("receiver already started (state: {0})")]
    AlreadyStarted(LifecycleState),

    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Failure of a single collection pass. Never fatal to the receiver.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("collector source error: {0}")]
    Source(String),

    #[error("collection cancelled")]
    Cancelled,

    #[error("collector I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Returned by a downstream consumer that did not take a result.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("consumer rejected result: {0}")]
    Rejected(String),

    #[error("consumer unavailable: {0}")]
    Unavailable(String),
}

/// Why the sink gave a result back instead of delivering it.
#[derive(Debug, Error)]
pub enum RejectReason {
    #[error(transparent)]
    Consumer(#[from] ConsumerError),

    #[error("send abandoned after {0:?} drain grace")]
    Abandoned(Duration),
}

/// A result the sink could not deliver. Carries the original result so the
/// caller decides what happens to it.
#[derive(Debug, Error)]
#[error("sink rejected pass {pass_id}: {reason}")]
pub struct SinkRejectedError {
    pub pass_id: u64,
    pub reason: RejectReason,
    pub result: CollectionResult,
}

impl SinkRejectedError {
    pub fn new(result: CollectionResult, reason: RejectReason) -> Self {
        Self {
            pass_id: result.pass_id,
            reason,
            result,
        }
    }

    pub fn into_result(self) -> CollectionResult {
        self.result
    }
}
