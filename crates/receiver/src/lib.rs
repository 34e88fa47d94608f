pub mod buffer;
pub mod collector;
pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod metrics;
pub mod observer;
pub mod receiver;
pub mod scheduler;
pub mod signal;
pub mod sink;

pub use buffer::SpanBuffer;
pub use collector::{Collector, FnCollector};
pub use error::{CollectError, ConsumerError, ReceiverError, RejectReason, SinkRejectedError};
pub use factory::{ReceiverFactory, StabilityLevel, TYPE_NAME};
pub use lifecycle::LifecycleState;
pub use metrics::{MetricsSnapshot, ReceiverMetrics};
pub use observer::{Observer, PipelineEvent, TracingObserver};
pub use receiver::{Component, Host, NoopHost, ReceiverStatus, SignalHost, TraceReceiver};
pub use scheduler::{Scheduler, TickEvent};
pub use signal::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use sink::{ChannelConsumer, FnConsumer, SinkAdapter, TraceConsumer};

pub use skmonitor_core::{CollectionResult, ReceiverConfig, TraceRecord};
