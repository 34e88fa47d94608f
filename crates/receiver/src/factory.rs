//! Registration entry point for hosts that build receivers by type name.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use skmonitor_core::ReceiverConfig;

use crate::collector::Collector;
use crate::error::ReceiverError;
use crate::receiver::TraceReceiver;
use crate::sink::TraceConsumer;

/// Type name hosts use to select this receiver.
pub const TYPE_NAME: &str = "skmonitor";

/// Maturity of a component as advertised to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityLevel {
    Development,
    Alpha,
    Beta,
    Stable,
}

impl fmt::Display for StabilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Development => "development",
            Self::Alpha => "alpha",
            Self::Beta => "beta",
            Self::Stable => "stable",
        };
        f.write_str(s)
    }
}

/// Builds [`TraceReceiver`]s from validated configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiverFactory;

impl ReceiverFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    pub fn stability(&self) -> StabilityLevel {
        StabilityLevel::Alpha
    }

    pub fn default_config(&self) -> ReceiverConfig {
        ReceiverConfig::default()
    }

    /// Validate `config` and build an idle receiver.
    ///
    /// The interval is not checked here; a zero interval fails on `start`.
    pub fn create(
        &self,
        config: ReceiverConfig,
        collector: Arc<dyn Collector>,
        consumer: Arc<dyn TraceConsumer>,
    ) -> Result<TraceReceiver, ReceiverError> {
        config.validate()?;
        tracing::debug!(
            receiver = %config.name,
            kind = TYPE_NAME,
            stability = %self.stability(),
            "creating trace receiver"
        );
        Ok(TraceReceiver::new(config, collector, consumer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SpanBuffer;
    use crate::lifecycle::LifecycleState;
    use crate::sink::FnConsumer;

    fn parts() -> (Arc<dyn Collector>, Arc<dyn TraceConsumer>) {
        (
            Arc::new(SpanBuffer::new(8)),
            Arc::new(FnConsumer::new(|_| Ok(()))),
        )
    }

    #[test]
    fn advertises_type_and_stability() {
        let factory = ReceiverFactory::new();
        assert_eq!(factory.type_name(), "skmonitor");
        assert_eq!(factory.stability(), StabilityLevel::Alpha);
        assert_eq!(factory.stability().to_string(), "alpha");
    }

    #[test]
    fn default_config_matches_receiver_defaults() {
        let config = ReceiverFactory::new().default_config();
        assert_eq!(config.name, "skmonitor");
        assert_eq!(config.interval_ms, 60_000);
    }

    #[test]
    fn create_returns_idle_receiver() {
        let (collector, consumer) = parts();
        let config = ReceiverFactory::new().default_config().with_name("factory-made");
        let receiver = ReceiverFactory::new()
            .create(config, collector, consumer)
            .unwrap();
        assert_eq!(receiver.name(), "factory-made");
        assert_eq!(receiver.state(), LifecycleState::Idle);
    }

    #[test]
    fn create_rejects_invalid_config() {
        let (collector, consumer) = parts();
        let config = ReceiverConfig::default().with_name("  ");
        let err = ReceiverFactory::new()
            .create(config, collector, consumer)
            .err()
            .unwrap();
        assert!(matches!(err, ReceiverError::Config(_)));
    }
}
