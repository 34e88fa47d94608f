pub mod config;
pub mod error;
pub mod trace;

pub use config::{BufferConfig, ReceiverConfig, SinkConfig};
pub use error::ConfigError;
pub use trace::*;
