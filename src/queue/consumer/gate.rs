use tokio::sync::watch;

use crate::queue::error::{QueueError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Open,
    Paused,
    Closed,
}

/// Binary gate held shut by `pause` and released by `resume`
///
/// Any number of tasks may wait on the gate; reopening it releases all of
/// them. Closing the gate for good releases waiters with `Closed`.
pub struct PauseGate {
    state: watch::Sender<GateState>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::Open);
        Self { state }
    }

    /// Shut the gate. Idempotent; has no effect once closed.
    pub fn pause(&self) {
        self.state.send_if_modified(|state| {
            if *state == GateState::Open {
                *state = GateState::Paused;
                true
            } else {
                false
            }
        });
    }

    /// Reopen the gate. Idempotent; has no effect once closed.
    pub fn resume(&self) {
        self.state.send_if_modified(|state| {
            if *state == GateState::Paused {
                *state = GateState::Open;
                true
            } else {
                false
            }
        });
    }

    /// Close the gate permanently, releasing every waiter
    pub fn close(&self) {
        self.state.send_replace(GateState::Closed);
    }

    pub fn is_paused(&self) -> bool {
        *self.state.borrow() == GateState::Paused
    }

    /// Wait until the gate is open
    pub async fn wait_open(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|state| *state != GateState::Paused)
            .await
            .map_err(|_| QueueError::Closed)?;

        match *state {
            GateState::Closed => Err(QueueError::Closed),
            _ => Ok(()),
        }
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, assert_ready_err, assert_ready_ok, task};

    #[test]
    fn test_open_gate_passes_immediately() {
        let gate = PauseGate::new();
        let mut wait = task::spawn(gate.wait_open());
        assert_ready_ok!(wait.poll());
    }

    #[test]
    fn test_pause_and_resume_are_idempotent() {
        let gate = PauseGate::new();
        gate.pause();
        gate.pause();
        assert!(gate.is_paused());

        gate.resume();
        gate.resume();
        assert!(!gate.is_paused());
    }

    #[test]
    fn test_resume_releases_all_waiters() {
        let gate = PauseGate::new();
        gate.pause();

        let mut first = task::spawn(gate.wait_open());
        let mut second = task::spawn(gate.wait_open());
        assert_pending!(first.poll());
        assert_pending!(second.poll());

        gate.resume();

        assert!(first.is_woken());
        assert!(second.is_woken());
        assert_ready_ok!(first.poll());
        assert_ready_ok!(second.poll());
    }

    #[test]
    fn test_close_releases_waiters_with_error() {
        let gate = PauseGate::new();
        gate.pause();

        let mut wait = task::spawn(gate.wait_open());
        assert_pending!(wait.poll());

        gate.close();
        assert_eq!(assert_ready_err!(wait.poll()), QueueError::Closed);

        // A closed gate cannot be reopened.
        gate.resume();
        assert!(assert_ready!(task::spawn(gate.wait_open()).poll()).is_err());
    }
}
