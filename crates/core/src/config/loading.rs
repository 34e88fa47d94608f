use std::path::Path;

use crate::error::ConfigError;

use super::types::ReceiverConfig;

/// Load a `.env` file if one exists.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

impl ReceiverConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults with environment overrides applied, for running without a file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Log the effective settings at startup.
    pub fn log_summary(&self) {
        tracing::info!(
            name = %self.name,
            interval_ms = self.interval_ms,
            shutdown_timeout_ms = self.shutdown_timeout_ms,
            drain_grace_ms = self.sink.drain_grace_ms,
            buffer_capacity = self.buffer.capacity,
            metrics_port = ?self.metrics_port,
            "receiver config loaded"
        );
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `SKMONITOR_SECTION_KEY` overrides `section.key`.
    /// - `SKMONITOR_NAME` -> `name`
    /// - `SKMONITOR_INTERVAL_MS` -> `interval_ms`
    /// - `SKMONITOR_SHUTDOWN_TIMEOUT_MS` -> `shutdown_timeout_ms`
    /// - `SKMONITOR_METRICS_PORT` -> `metrics_port`
    /// - `SKMONITOR_SINK_DRAIN_GRACE_MS` -> `sink.drain_grace_ms`
    /// - `SKMONITOR_BUFFER_CAPACITY` -> `buffer.capacity`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SKMONITOR_NAME") {
            self.name = v;
        }
        if let Some(ms) = env_parse::<u64>("SKMONITOR_INTERVAL_MS") {
            self.interval_ms = ms;
        }
        if let Some(ms) = env_parse::<u64>("SKMONITOR_SHUTDOWN_TIMEOUT_MS") {
            self.shutdown_timeout_ms = ms;
        }
        if let Some(port) = env_parse::<u16>("SKMONITOR_METRICS_PORT") {
            self.metrics_port = Some(port);
        }
        if let Some(ms) = env_parse::<u64>("SKMONITOR_SINK_DRAIN_GRACE_MS") {
            self.sink.drain_grace_ms = ms;
        }
        if let Some(capacity) = env_parse::<usize>("SKMONITOR_BUFFER_CAPACITY") {
            self.buffer.capacity = capacity;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
