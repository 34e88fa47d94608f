//! skmonitor-receiver: standalone trace receiver.
//!
//! Reads finished spans as JSON lines from stdin (or a file) into a bounded
//! span buffer. Every interval a collection pass drains the buffer and writes
//! the resulting batch to stdout as one JSON line.
//!
//! Stops on SIGINT/SIGTERM or when the input ends. Spans still buffered at
//! that point are flushed as a final batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{info, warn};

use skmonitor_core::config::load_dotenv;
use skmonitor_receiver::metrics::spawn_metrics_server;
use skmonitor_receiver::{
    shutdown_channel, CollectionResult, ConsumerError, ReceiverConfig, ReceiverFactory,
    ShutdownTrigger, SignalHost, SpanBuffer, TraceConsumer, TraceRecord,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Scheduled trace receiver: JSON-lines spans in, batched JSON lines out.
#[derive(Parser, Debug)]
#[command(name = "skmonitor-receiver", version, about)]
struct Cli {
    /// Path to skmonitor.toml config file.
    #[arg(long, env = "SKMONITOR_CONFIG", default_value = "config/skmonitor.toml")]
    config: String,

    /// Span input file, or `-` for stdin.
    #[arg(long, default_value = "-")]
    input: String,

    /// Override the collection interval in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,
}

// ── Output ──────────────────────────────────────────────────────────

/// Writes each result as one JSON line to stdout.
struct JsonLinesConsumer {
    out: Mutex<tokio::io::Stdout>,
}

impl JsonLinesConsumer {
    fn stdout() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

#[async_trait]
impl TraceConsumer for JsonLinesConsumer {
    async fn consume(&self, result: &CollectionResult) -> Result<(), ConsumerError> {
        let mut line = serde_json::to_string(result)
            .map_err(|e| ConsumerError::Rejected(format!("serialize: {e}")))?;
        line.push('\n');

        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes())
            .await
            .map_err(|e| ConsumerError::Unavailable(format!("stdout: {e}")))?;
        out.flush()
            .await
            .map_err(|e| ConsumerError::Unavailable(format!("stdout: {e}")))
    }
}

// ── Input ───────────────────────────────────────────────────────────

async fn open_input(input: &str) -> anyhow::Result<Box<dyn AsyncRead + Unpin + Send>> {
    if input == "-" {
        return Ok(Box::new(tokio::io::stdin()));
    }
    let file = tokio::fs::File::open(input).await?;
    Ok(Box::new(file))
}

/// Feed parsed spans into `buffer` until the input ends, then request shutdown.
async fn read_spans(
    reader: Box<dyn AsyncRead + Unpin + Send>,
    buffer: SpanBuffer,
    shutdown: ShutdownTrigger,
) {
    let mut lines = BufReader::new(reader).lines();
    let mut line_no = 0u64;
    let mut accepted = 0u64;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                line_no += 1;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<TraceRecord>(line) {
                    Ok(span) => {
                        if !buffer.push(span) {
                            warn!(line = line_no, "span buffer full, evicted oldest span");
                        }
                        accepted += 1;
                    }
                    Err(e) => warn!(line = line_no, error = %e, "skipping malformed span"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "input read failed");
                break;
            }
        }
    }

    info!(lines = line_no, spans = accepted, "input exhausted");
    shutdown.trigger();
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
            }
            _ => {
                warn!("failed to register signal handlers, falling back to ctrl_c");
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = match ReceiverConfig::from_file(&cli.config) {
        Ok(cfg) => {
            info!(path = %cli.config, "loaded receiver config");
            cfg
        }
        Err(e) => {
            warn!(
                error = %e,
                path = %cli.config,
                "failed to load config, using defaults"
            );
            ReceiverConfig::from_env()?
        }
    };
    if let Some(ms) = cli.interval_ms {
        config = config.with_interval(Duration::from_millis(ms));
    }
    config.log_summary();

    let buffer = SpanBuffer::new(config.buffer.capacity);
    let consumer = Arc::new(JsonLinesConsumer::stdout());
    let metrics_port = config.metrics_port;

    let receiver = Arc::new(ReceiverFactory::new().create(
        config,
        Arc::new(buffer.clone()),
        consumer.clone(),
    )?);

    let (trigger, signal) = shutdown_channel();
    let input = open_input(&cli.input).await?;
    tokio::spawn(read_spans(input, buffer.clone(), trigger.clone()));

    let metrics = metrics_port.map(|port| spawn_metrics_server(port, receiver.clone(), signal.clone()));

    receiver.start(&SignalHost::new(signal.clone())).await?;
    info!("skmonitor-receiver running");

    tokio::select! {
        _ = os_signal() => info!("signal received, shutting down"),
        _ = signal.cancelled() => {}
    }
    trigger.trigger();

    let result = receiver.shutdown().await;

    let leftover = buffer.drain();
    if !leftover.is_empty() {
        let last = receiver.metrics().passes_started + 1;
        let batch = CollectionResult::new(last, Utc::now(), leftover);
        info!(records = batch.len(), "flushing remaining spans");
        if let Err(e) = consumer.consume(&batch).await {
            warn!(error = %e, records = batch.len(), "final flush failed");
        }
    }

    if let Some(handle) = metrics {
        handle.await.ok();
    }

    result?;
    info!("skmonitor-receiver exited cleanly");
    Ok(())
}
