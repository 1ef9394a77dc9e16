//! Supervisor-side record of the managed process.
//!
//! The record only moves forward through [`LifecycleState`], one step at a
//! time, and only on evidence the supervisor has observed.

use mcr_common::error::{McrError, Result};
use mcr_common::types::{ExitStatus, LifecycleState};

/// The container process as seen by its supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedProcess {
    pid: Option<u32>,
    state: LifecycleState,
    status: Option<ExitStatus>,
}

impl Default for ManagedProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagedProcess {
    /// Creates a record in the `Created` state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pid: None,
            state: LifecycleState::Created,
            status: None,
        }
    }

    /// Child pid, once forked.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Terminal exit status, once reaped.
    #[must_use]
    pub const fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Records the forked child's pid.
    pub const fn set_pid(&mut self, pid: u32) {
        self.pid = Some(pid);
    }

    /// Moves to `next`, which must directly follow the current state.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::Config`] for any skipped or backward transition.
    pub fn advance(&mut self, next: LifecycleState) -> Result<()> {
        if successor(self.state) != Some(next) || next == LifecycleState::Exited {
            return Err(invalid_transition(self.state, next));
        }
        self.state = next;
        Ok(())
    }

    /// Records the terminal status and moves to `Exited`.
    ///
    /// # Errors
    ///
    /// Returns [`McrError::Config`] unless the process was `Executing`.
    pub fn exit(&mut self, status: ExitStatus) -> Result<()> {
        if self.state != LifecycleState::Executing {
            return Err(invalid_transition(self.state, LifecycleState::Exited));
        }
        self.state = LifecycleState::Exited;
        self.status = Some(status);
        Ok(())
    }

    /// Marks the launch as failed, keeping any status already observed.
    pub fn fail(&mut self, status: Option<ExitStatus>) {
        if !self.state.is_terminal() {
            self.state = LifecycleState::Failed;
            self.status = status;
        }
    }
}

const fn successor(state: LifecycleState) -> Option<LifecycleState> {
    match state {
        LifecycleState::Created => Some(LifecycleState::Isolating),
        LifecycleState::Isolating => Some(LifecycleState::RootConfined),
        LifecycleState::RootConfined => Some(LifecycleState::AwaitingRelease),
        LifecycleState::AwaitingRelease => Some(LifecycleState::Executing),
        LifecycleState::Executing => Some(LifecycleState::Exited),
        LifecycleState::Exited | LifecycleState::Failed => None,
    }
}

fn invalid_transition(from: LifecycleState, to: LifecycleState) -> McrError {
    McrError::config(format!("invalid lifecycle transition {from} -> {to}"))
}
