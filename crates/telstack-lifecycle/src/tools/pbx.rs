//! Request/response console of the running PBX (`asterisk -rx <command>`).

use serde::Serialize;
use telstack_exec::{CommandOutput, CommandRequest, CommandRunner};

use super::{ToolError, ToolSet, run_bounded, run_query};

const UNREACHABLE_MARKER: &str = "Unable to connect to remote";
const NO_SUCH_COMMAND: &str = "No such command";

/// Hardware channels listed by the PBX.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PbxChannels {
    /// Numbered hardware channels.
    pub numbered: Vec<u32>,
    /// Whether the pseudo channel is present.
    pub pseudo: bool,
}

impl PbxChannels {
    /// Parses `dahdi show channels` output.
    ///
    /// ```text
    ///    Chan Extension  Context         Language   MOH Interpret        Blocked    State
    ///  pseudo            default                    default                         In Service
    ///       1            from-pstn                  default                         In Service
    /// ```
    ///
    /// Output from a PBX without the channel driver lists nothing.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut channels = Self::default();
        if text.contains(NO_SUCH_COMMAND) {
            return channels;
        }
        for token in text.lines().filter_map(|line| line.split_whitespace().next()) {
            if token == "pseudo" {
                channels.pseudo = true;
            } else if let Ok(number) = token.parse::<u32>() {
                channels.numbered.push(number);
            }
        }
        channels
    }
}

/// PBX remote console adapter.
#[derive(Debug)]
pub struct PbxConsole<'a, R: ?Sized> {
    runner: &'a R,
    tools: &'a ToolSet,
}

impl<'a, R: CommandRunner + ?Sized> PbxConsole<'a, R> {
    /// Adapter running commands through `runner`.
    #[must_use]
    pub const fn new(runner: &'a R, tools: &'a ToolSet) -> Self {
        Self { runner, tools }
    }

    fn request(&self, command: &str) -> CommandRequest {
        self.tools.request(&self.tools.pbx).args(["-rx", command])
    }

    fn console(&self, command: &str) -> Result<CommandOutput, ToolError> {
        run_bounded(self.runner, &self.request(command))
    }

    fn query(&self, command: &str) -> Result<CommandOutput, ToolError> {
        run_query(self.runner, &self.request(command))
    }

    /// Whether the console answers.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] when the console binary cannot run. A console
    /// that times out is reported as unreachable without a second attempt;
    /// callers waiting for the PBX poll this instead.
    pub fn is_reachable(&self) -> Result<bool, ToolError> {
        match self.console("core show version") {
            Ok(output) => Ok(output.success() && !mentions_unreachable(&output)),
            Err(ToolError::TimedOut { .. }) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Whether `module` is loaded into the PBX. The query is repeated once
    /// after a timeout.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] when the console cannot run or keeps timing
    /// out.
    pub fn module_loaded(&self, module: &str) -> Result<bool, ToolError> {
        let output = self.query(&format!("module show like {module}"))?;
        if !output.success() || mentions_unreachable(&output) {
            return Ok(false);
        }
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .any(|name| name == module))
    }

    /// Asks the PBX to unload `module`; returns whether it accepted.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] when the console cannot run or times out.
    pub fn unload_module(&self, module: &str) -> Result<bool, ToolError> {
        let output = self.console(&format!("module unload {module}"))?;
        Ok(accepted(&output))
    }

    /// Asks the PBX to load `module`; returns whether it accepted.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] when the console cannot run or times out.
    pub fn load_module(&self, module: &str) -> Result<bool, ToolError> {
        let output = self.console(&format!("module load {module}"))?;
        Ok(accepted(&output))
    }

    /// Hardware channels the PBX currently exposes.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] when the console cannot run or keeps timing
    /// out.
    pub fn channels(&self) -> Result<PbxChannels, ToolError> {
        let output = self.query("dahdi show channels")?;
        if mentions_unreachable(&output) {
            return Ok(PbxChannels::default());
        }
        Ok(PbxChannels::parse(&output.stdout))
    }
}

fn mentions_unreachable(output: &CommandOutput) -> bool {
    output.stdout.contains(UNREACHABLE_MARKER) || output.stderr.contains(UNREACHABLE_MARKER)
}

fn accepted(output: &CommandOutput) -> bool {
    output.success()
        && !mentions_unreachable(output)
        && !output.stdout.contains("Unable to")
        && !output.stdout.contains(NO_SUCH_COMMAND)
}
