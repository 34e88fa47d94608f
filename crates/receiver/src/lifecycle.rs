//! Receiver lifecycle state and its lock-free cell.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Lifecycle of a receiver: `Idle → Running → ShuttingDown → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LifecycleState {
    Idle = 0,
    Running = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Atomic holder for a [`LifecycleState`].
///
/// Every change goes through [`StateCell::transition`], so two call sites
/// can never both win the same transition.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Idle as u8))
    }

    pub(crate) fn load(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move from `from` to `to`. On failure returns the actual current state.
    pub(crate) fn transition(
        &self,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), LifecycleState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(LifecycleState::from_u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        assert_eq!(StateCell::new().load(), LifecycleState::Idle);
    }

    #[test]
    fn transition_succeeds_from_expected_state() {
        let cell = StateCell::new();
        assert!(cell
            .transition(LifecycleState::Idle, LifecycleState::Running)
            .is_ok());
        assert_eq!(cell.load(), LifecycleState::Running);
    }

    #[test]
    fn transition_reports_actual_state_on_mismatch() {
        let cell = StateCell::new();
        let err = cell
            .transition(LifecycleState::Running, LifecycleState::ShuttingDown)
            .unwrap_err();
        assert_eq!(err, LifecycleState::Idle);
        assert_eq!(cell.load(), LifecycleState::Idle);
    }

    #[test]
    fn display_is_snake_case() {
        assert_eq!(LifecycleState::ShuttingDown.to_string(), "shutting_down");
        assert_eq!(
            serde_json::to_string(&LifecycleState::ShuttingDown).unwrap(),
            "\"shutting_down\""
        );
    }
}
