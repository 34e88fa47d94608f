use super::types::ReceiverConfig;
use crate::error::ConfigError;

impl ReceiverConfig {
    /// Validate everything except the interval, which is checked on start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("receiver name must not be empty".into()));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "shutdown_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.buffer.capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer.capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
