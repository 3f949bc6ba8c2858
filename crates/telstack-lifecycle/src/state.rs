//! Per-invocation lifecycle state machine.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Phase of the telephony stack within one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The base module is not loaded.
    Unloaded,
    /// Teardown in progress.
    Stopping,
    /// Teardown finished.
    Stopped,
    /// Hardware discovery in progress.
    Discovering,
    /// Span assignment in progress.
    Assigning,
    /// Configuration reconciliation in progress.
    Configuring,
    /// Bring-up in progress.
    Starting,
    /// The stack and the PBX are up.
    Running,
    /// The invocation failed; terminal.
    Failed,
}

impl Phase {
    /// Lower-case phase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Discovering => "discovering",
            Self::Assigning => "assigning",
            Self::Configuring => "configuring",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Failed => "failed",
        }
    }

    /// Whether `next` may follow this phase.
    #[must_use]
    pub const fn allows(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Running | Self::Unloaded | Self::Stopped, Self::Stopping)
                | (Self::Stopping, Self::Stopped)
                | (Self::Stopped | Self::Unloaded, Self::Discovering)
                | (Self::Discovering, Self::Assigning)
                | (Self::Assigning, Self::Configuring)
                | (Self::Configuring, Self::Starting)
                | (Self::Starting, Self::Running)
        ) || (!matches!(self, Self::Failed) && matches!(next, Self::Failed))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Rejected phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal lifecycle transition from {from} to {to}")]
pub struct StateError {
    /// Phase before the attempted change.
    pub from: Phase,
    /// Requested phase.
    pub to: Phase,
}

/// Current phase and the path taken to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleState {
    phase: Phase,
    history: Vec<Phase>,
}

impl LifecycleState {
    /// State starting at the observed `phase`.
    #[must_use]
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            history: vec![phase],
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase visited, starting with the observed one.
    #[must_use]
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns a [`StateError`] when `next` may not follow the current phase.
    pub fn advance(&mut self, next: Phase) -> Result<(), StateError> {
        if !self.phase.allows(next) {
            return Err(StateError {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    /// Moves to [`Phase::Failed`] and returns the phase that failed.
    pub fn fail(&mut self) -> Phase {
        let failed = self.phase;
        if failed != Phase::Failed {
            self.phase = Phase::Failed;
            self.history.push(Phase::Failed);
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn start_path_is_linear() {
        let mut state = LifecycleState::new(Phase::Stopped);
        for phase in [
            Phase::Discovering,
            Phase::Assigning,
            Phase::Configuring,
            Phase::Starting,
            Phase::Running,
        ] {
            state.advance(phase).expect("legal transition");
        }
        assert_eq!(state.phase(), Phase::Running);
        assert_eq!(state.history().len(), 6);
    }

    #[rstest]
    #[case::skip_discovery(Phase::Stopped, Phase::Starting)]
    #[case::start_while_running(Phase::Running, Phase::Discovering)]
    #[case::stop_mid_start(Phase::Configuring, Phase::Stopping)]
    #[case::leave_failed(Phase::Failed, Phase::Stopping)]
    #[case::fail_twice(Phase::Failed, Phase::Failed)]
    fn rejects_illegal_transitions(#[case] from: Phase, #[case] to: Phase) {
        let mut state = LifecycleState::new(from);
        assert_eq!(state.advance(to), Err(StateError { from, to }));
        assert_eq!(state.phase(), from);
    }

    #[test]
    fn failure_records_the_failed_phase() {
        let mut state = LifecycleState::new(Phase::Running);
        state.advance(Phase::Stopping).expect("legal transition");
        assert_eq!(state.fail(), Phase::Stopping);
        assert_eq!(state.phase(), Phase::Failed);
        assert_eq!(state.fail(), Phase::Failed);
        assert_eq!(
            state.history(),
            [Phase::Running, Phase::Stopping, Phase::Failed]
        );
    }

    #[test]
    fn phases_render_in_lower_case() {
        assert_eq!(Phase::Configuring.to_string(), "configuring");
    }
}
