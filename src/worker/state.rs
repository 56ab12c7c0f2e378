//! Worker lifecycle state machine.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// ```text
/// Running ──interrupt──▶ Closing ──serve returns──▶ Stopped
/// Running ──serve returns Ok──▶ Stopped
/// Running ──serve returns Err──▶ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Running = 0,
    Closing = 1,
    Stopped = 2,
    Failed = 3,
}

impl WorkerState {
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Running, Closing) | (Running, Stopped) | (Running, Failed) | (Closing, Stopped)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Stopped | WorkerState::Failed)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Running,
            1 => WorkerState::Closing,
            2 => WorkerState::Stopped,
            _ => WorkerState::Failed,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Running => "running",
            WorkerState::Closing => "closing",
            WorkerState::Stopped => "stopped",
            WorkerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Shared, lock-free holder of the current [`WorkerState`].
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Running as u8))
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Move to `next` if the state machine allows it from the current state.
    /// Returns the state that was replaced, or the current state on refusal.
    pub fn transition(&self, next: WorkerState) -> Result<WorkerState, WorkerState> {
        let mut current = self.0.load(Ordering::SeqCst);
        loop {
            let from = WorkerState::from_u8(current);
            if !from.can_transition_to(next) {
                return Err(from);
            }
            match self.0.compare_exchange(
                current,
                next as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    tracing::debug!(from = %from, to = %next, "Worker state changed");
                    return Ok(from);
                }
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graceful_path() {
        let state = StateCell::new();
        assert_eq!(state.get(), WorkerState::Running);
        assert_eq!(state.transition(WorkerState::Closing), Ok(WorkerState::Running));
        assert_eq!(state.transition(WorkerState::Stopped), Ok(WorkerState::Closing));
        assert!(state.get().is_terminal());
    }

    #[test]
    fn closing_cannot_fail() {
        let state = StateCell::new();
        state.transition(WorkerState::Closing).unwrap();
        assert_eq!(
            state.transition(WorkerState::Failed),
            Err(WorkerState::Closing)
        );
    }

    #[test]
    fn terminal_states_are_final() {
        let state = StateCell::new();
        state.transition(WorkerState::Failed).unwrap();
        for next in [
            WorkerState::Running,
            WorkerState::Closing,
            WorkerState::Stopped,
        ] {
            assert_eq!(state.transition(next), Err(WorkerState::Failed));
        }
    }

    #[test]
    fn second_interrupt_does_not_reenter_closing() {
        let state = StateCell::new();
        state.transition(WorkerState::Closing).unwrap();
        assert!(state.transition(WorkerState::Closing).is_err());
    }
}
