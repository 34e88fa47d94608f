use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration for one trace receiver instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Component name used in logs and metrics.
    #[serde(default = "default_name")]
    pub name: String,

    /// Milliseconds between collection passes. Must be positive.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Maximum time `shutdown()` waits for an in-flight pass.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Optional port for the JSON metrics endpoint.
    pub metrics_port: Option<u16>,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub buffer: BufferConfig,
}

fn default_name() -> String {
    "skmonitor".into()
}

fn default_interval_ms() -> u64 {
    60_000
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            interval_ms: default_interval_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            metrics_port: None,
            sink: SinkConfig::default(),
            buffer: BufferConfig::default(),
        }
    }
}

impl ReceiverConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Set the tick interval. A non-zero sub-millisecond interval rounds up
    /// to 1 ms so only a zero interval is rejected on start.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = ceil_millis(interval);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = ceil_millis(timeout);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.sink.drain_grace_ms = ceil_millis(grace);
        self
    }
}

/// Whole milliseconds in `d`, rounded up and saturating at `u64::MAX`.
fn ceil_millis(d: Duration) -> u64 {
    let millis = d.as_millis() + u128::from(d.subsec_nanos() % 1_000_000 != 0);
    u64::try_from(millis).unwrap_or(u64::MAX)
}

// ── Section configs ─────────────────────────────────────────────────

/// Sink section: delivery to the downstream consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// How long a send already in flight may keep running once shutdown
    /// has begun before it is abandoned.
    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,
}

fn default_drain_grace_ms() -> u64 {
    2_000
}

impl SinkConfig {
    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            drain_grace_ms: default_drain_grace_ms(),
        }
    }
}

/// Buffer section: the in-memory span buffer drained by each pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Maximum spans held between passes. The oldest span is dropped when full.
    #[serde(default = "default_buffer_capacity")]
    pub capacity: usize,
}

fn default_buffer_capacity() -> usize {
    10_000
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_buffer_capacity(),
        }
    }
}
