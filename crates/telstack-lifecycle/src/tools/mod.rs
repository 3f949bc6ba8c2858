//! Typed adapters over the host's control tools.
//!
//! Each adapter is the single place where one tool's command line and output
//! format are known. Callers receive typed records and decide what an exit
//! status means for the lifecycle.

mod modules;
mod pbx;
mod services;

use std::time::Duration;

use telstack_config::Config;
use telstack_exec::{CommandOutput, CommandRequest, CommandRunner, ExecError};
use thiserror::Error;
use tracing::warn;

use crate::error::FailureClass;

pub use self::modules::{LoadedModule, LoadedModules, ModuleControl};
pub use self::pbx::{PbxChannels, PbxConsole};
pub use self::services::{ServiceControl, ServiceState};

const TOOLS_TARGET: &str = "telstack_lifecycle::tools";

/// Attempts given to a read-only query that times out.
pub const QUERY_ATTEMPTS: u32 = 2;

/// Tool names and the time bounds applied to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSet {
    /// Module control tool.
    pub module: String,
    /// Loaded module listing tool.
    pub lsmod: String,
    /// Service control tool.
    pub service: String,
    /// Hardware inventory tool.
    pub inventory: String,
    /// Channel configuration generator.
    pub genconf: String,
    /// Channel configuration apply tool.
    pub cfg: String,
    /// Span assignment tool.
    pub span: String,
    /// PBX remote console.
    pub pbx: String,
    /// Bound for ordinary tool invocations.
    pub command_timeout: Duration,
    /// Bound for each generator attempt.
    pub genconf_timeout: Duration,
    /// Grace interval between `SIGTERM` and `SIGKILL`.
    pub kill_grace: Duration,
}

impl ToolSet {
    /// Tool names and bounds taken from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            module: config.module_tool().to_owned(),
            lsmod: config.lsmod_tool().to_owned(),
            service: config.service_tool().to_owned(),
            inventory: config.inventory_tool().to_owned(),
            genconf: config.genconf_tool().to_owned(),
            cfg: config.cfg_tool().to_owned(),
            span: config.span_tool().to_owned(),
            pbx: config.pbx_tool().to_owned(),
            command_timeout: config.command_timeout(),
            genconf_timeout: config.genconf_timeout(),
            kill_grace: config.kill_grace(),
        }
    }

    /// Bounded request for `program` using the ordinary timeout.
    #[must_use]
    pub fn request(&self, program: &str) -> CommandRequest {
        CommandRequest::new(program)
            .with_timeout(self.command_timeout)
            .with_grace(self.kill_grace)
    }
}

/// Failures reported by tool adapters.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// The tool could not be run at all.
    #[error(transparent)]
    Exec(#[from] ExecError),
    /// The tool exceeded its time bound and was killed.
    #[error("'{command}' timed out and was killed")]
    TimedOut {
        /// Rendered command line.
        command: String,
    },
    /// The tool exited unsuccessfully where success was required.
    #[error("'{command}' failed with exit code {}", exit_label(.exit_code))]
    Failed {
        /// Rendered command line.
        command: String,
        /// Exit code, when the tool exited normally.
        exit_code: Option<i32>,
        /// Trailing standard error.
        stderr: String,
    },
    /// The tool's output did not match its known format.
    #[error("unexpected output from {tool}: {reason} in line '{line}'")]
    Parse {
        /// Tool producing the output.
        tool: String,
        /// Offending line.
        line: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl ToolError {
    /// Failure class of the error.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::TimedOut { .. } => FailureClass::Retryable,
            Self::Exec(_) | Self::Failed { .. } | Self::Parse { .. } => FailureClass::Fatal,
        }
    }

    /// Returns `true` when the tool is absent from the host.
    #[must_use]
    pub const fn is_tool_missing(&self) -> bool {
        matches!(self, Self::Exec(error) if error.is_tool_missing())
    }
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "none (signalled)".to_owned(), |code| code.to_string())
}

/// Runs `request`, treating a timeout as an error but passing any exit status
/// through.
pub(crate) fn run_bounded<R: CommandRunner + ?Sized>(
    runner: &R,
    request: &CommandRequest,
) -> Result<CommandOutput, ToolError> {
    let output = runner.run(request)?;
    if output.timed_out {
        return Err(ToolError::TimedOut {
            command: request.to_string(),
        });
    }
    Ok(output)
}

/// Runs a read-only `request` like [`run_bounded`], repeating it up to
/// [`QUERY_ATTEMPTS`] times while it times out.
pub(crate) fn run_query<R: CommandRunner + ?Sized>(
    runner: &R,
    request: &CommandRequest,
) -> Result<CommandOutput, ToolError> {
    let mut attempt = 1;
    loop {
        match run_bounded(runner, request) {
            Err(ToolError::TimedOut { command }) if attempt < QUERY_ATTEMPTS => {
                warn!(
                    target: TOOLS_TARGET,
                    %command,
                    attempt,
                    "query timed out; retrying"
                );
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}

/// Runs `request` and requires a zero exit status.
pub(crate) fn run_checked<R: CommandRunner + ?Sized>(
    runner: &R,
    request: &CommandRequest,
) -> Result<CommandOutput, ToolError> {
    require_success(request, run_bounded(runner, request)?)
}

fn require_success(
    request: &CommandRequest,
    output: CommandOutput,
) -> Result<CommandOutput, ToolError> {
    if output.success() {
        Ok(output)
    } else {
        Err(ToolError::Failed {
            command: request.to_string(),
            exit_code: output.exit_code,
            stderr: output.stderr_tail(5),
        })
    }
}
