//! Command requests and captured outcomes.

use std::fmt;
use std::time::Duration;

/// Grace interval between `SIGTERM` and `SIGKILL` when a request does not
/// specify one.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// A single external command invocation.
///
/// Requests are built fluently and are cheap to clone, so tool adapters keep a
/// template request per tool and extend it per call.
///
/// ```
/// use std::time::Duration;
///
/// use telstack_exec::CommandRequest;
///
/// let request = CommandRequest::new("modprobe")
///     .arg("-r")
///     .arg("wanpipe")
///     .with_timeout(Duration::from_secs(30));
/// assert_eq!(request.to_string(), "modprobe -r wanpipe");
/// assert_eq!(request.timeout(), Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    timeout: Option<Duration>,
    grace: Duration,
}

impl CommandRequest {
    /// Creates a request for `program` with no arguments and no timeout.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            timeout: None,
            grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, argument: impl Into<String>) -> Self {
        self.args.push(argument.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(arguments.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable for the child only.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Bounds the run time of the command.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the interval between the graceful and the forced termination
    /// signal once the timeout expires.
    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Extra environment variables for the child.
    #[must_use]
    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    /// Looks up an environment override by key.
    #[must_use]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .rev()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }

    /// Configured timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Configured grace interval.
    #[must_use]
    pub const fn grace(&self) -> Duration {
        self.grace
    }
}

impl fmt::Display for CommandRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.program)?;
        for argument in &self.args {
            if argument.is_empty() || argument.contains(char::is_whitespace) {
                write!(formatter, " \"{argument}\"")?;
            } else {
                write!(formatter, " {argument}")?;
            }
        }
        Ok(())
    }
}

/// Outcome of a command that ran to completion or was killed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the watchdog terminated the process.
    pub timed_out: bool,
    /// Wall-clock run time.
    pub elapsed: Duration,
}

impl CommandOutput {
    /// Builds the outcome of a command that exited on its own.
    #[must_use]
    pub fn exited(code: i32, stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Builds the outcome of a command the watchdog had to kill.
    #[must_use]
    pub fn killed_after(elapsed: Duration) -> Self {
        Self {
            timed_out: true,
            elapsed,
            ..Self::default()
        }
    }

    /// Replaces the captured standard error.
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Returns `true` for a zero exit without a timeout.
    #[must_use]
    pub const fn success(&self) -> bool {
        !self.timed_out && matches!(self.exit_code, Some(0))
    }

    /// Last `lines` non-empty lines of standard error.
    #[must_use]
    pub fn stderr_tail(&self, lines: usize) -> String {
        let collected: Vec<&str> = self
            .stderr
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .collect();
        let skip = collected.len().saturating_sub(lines);
        collected
            .get(skip..)
            .map(|tail| tail.join("\n"))
            .unwrap_or_default()
    }
}
