//! Receiver configuration.
//!
//! Parsed from `skmonitor.toml` with support for `SKMONITOR_*` environment
//! variable overrides. The tick interval is deliberately not validated here:
//! a zero interval is reported when the receiver is started.

mod loading;
mod types;
mod validation;


pub use loading::load_dotenv;
pub use types::{BufferConfig, ReceiverConfig, SinkConfig};
