//! Fixed-interval tick source for collection passes.
//!
//! The [`Scheduler`] owns a single tokio timer. Ticks are pulled with
//! [`Scheduler::tick`], which is cancel-safe, so a `select!` loop can race it
//! against an in-flight pass without ever blocking the timer. Ticks missed
//! because the runtime stalled are skipped rather than delivered in a burst.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

use crate::error::ReceiverError;

/// A scheduled collection instant.
#[derive(Debug, Clone)]
pub struct TickEvent {
    /// Strictly increasing, starting at 1 for the first tick after `start`.
    pub seq: u64,
    /// Monotonic instant the tick was scheduled for.
    pub scheduled_at: Instant,
    /// Wall-clock time the tick was observed.
    pub at: DateTime<Utc>,
}

/// Emits a [`TickEvent`] every configured interval until stopped.
#[derive(Debug, Default)]
pub struct Scheduler {
    ticker: Option<Interval>,
    seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin ticking. The first tick fires one `interval` from now.
    ///
    /// Restarting a running scheduler replaces its timer; the sequence keeps
    /// counting so ticks stay monotonic.
    pub fn start(&mut self, interval: Duration) -> Result<(), ReceiverError> {
        if interval.is_zero() {
            return Err(ReceiverError::InvalidInterval(interval));
        }
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        debug!(interval = ?interval, "scheduler started");
        Ok(())
    }

    /// Wait for the next tick. Returns `None` once stopped (or before start).
    pub async fn tick(&mut self) -> Option<TickEvent> {
        let ticker = self.ticker.as_mut()?;
        let scheduled_at = ticker.tick().await;
        self.seq += 1;
        Some(TickEvent {
            seq: self.seq,
            scheduled_at: scheduled_at.into_std(),
            at: Utc::now(),
        })
    }

    /// Stop ticking and release the timer. Safe to call repeatedly or before
    /// `start`. Returns whether a timer was actually running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.ticker.take().is_some();
        if was_running {
            debug!(ticks = self.seq, "scheduler stopped");
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Number of ticks emitted so far.
    pub fn ticks_emitted(&self) -> u64 {
        self.seq
    }
}
