//! Service unit control through an LSB-style `service` tool.

use std::fmt;

use serde::Serialize;
use telstack_exec::CommandRunner;

use super::{ToolError, ToolSet, run_bounded, run_checked, run_query};

/// Observed state of a service unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// `status` exited 0.
    Running,
    /// `status` exited 1, 2, or 3.
    Stopped,
    /// `status` exited 4: the unit does not exist on this host.
    NotInstalled,
    /// Any other status code.
    Unknown(Option<i32>),
}

impl ServiceState {
    /// Maps an LSB `status` exit code to a state.
    #[must_use]
    pub const fn from_status_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Self::Running,
            Some(1..=3) => Self::Stopped,
            Some(4) => Self::NotInstalled,
            other => Self::Unknown(other),
        }
    }

    /// Whether the unit may be running and must be stopped.
    #[must_use]
    pub const fn may_be_running(self) -> bool {
        matches!(self, Self::Running | Self::Unknown(_))
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => formatter.write_str("running"),
            Self::Stopped => formatter.write_str("stopped"),
            Self::NotInstalled => formatter.write_str("not installed"),
            Self::Unknown(Some(code)) => write!(formatter, "unknown (status {code})"),
            Self::Unknown(None) => formatter.write_str("unknown"),
        }
    }
}

/// Starts, stops, and queries service units.
#[derive(Debug)]
pub struct ServiceControl<'a, R: ?Sized> {
    runner: &'a R,
    tools: &'a ToolSet,
}

impl<'a, R: CommandRunner + ?Sized> ServiceControl<'a, R> {
    /// Adapter running commands through `runner`.
    #[must_use]
    pub const fn new(runner: &'a R, tools: &'a ToolSet) -> Self {
        Self { runner, tools }
    }

    /// Queries the unit's state, asking again after a timeout.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] when the tool cannot run or keeps timing out.
    pub fn status(&self, unit: &str) -> Result<ServiceState, ToolError> {
        let request = self
            .tools
            .request(&self.tools.service)
            .args([unit, "status"]);
        let output = run_query(self.runner, &request)?;
        Ok(ServiceState::from_status_code(output.exit_code))
    }

    /// Starts the unit.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] when the tool fails.
    pub fn start(&self, unit: &str) -> Result<(), ToolError> {
        let request = self
            .tools
            .request(&self.tools.service)
            .args([unit, "start"]);
        run_checked(self.runner, &request).map(drop)
    }

    /// Stops the unit. A non-zero exit is tolerated; callers confirm with
    /// [`Self::status`].
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] when the tool cannot run or times out.
    pub fn stop(&self, unit: &str) -> Result<(), ToolError> {
        let request = self
            .tools
            .request(&self.tools.service)
            .args([unit, "stop"]);
        run_bounded(self.runner, &request).map(drop)
    }
}
