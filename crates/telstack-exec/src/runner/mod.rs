//! The runner seam and the journaling wrapper used for failure reports.
//!
//! Tool adapters depend only on [`CommandRunner`], so tests drive them with a
//! scripted double while production uses
//! [`SystemRunner`](crate::process::SystemRunner).

use std::cell::RefCell;

use crate::error::ExecError;
use crate::request::{CommandOutput, CommandRequest};

/// Number of stderr lines kept in a [`JournalEntry`].
const STDERR_TAIL_LINES: usize = 5;

/// Trait abstracting external command execution for testability.
///
/// # Example
///
/// ```
/// use telstack_exec::{CommandOutput, CommandRequest, CommandRunner, ExecError};
///
/// struct AlwaysEmpty;
///
/// impl CommandRunner for AlwaysEmpty {
///     fn run(&self, _request: &CommandRequest) -> Result<CommandOutput, ExecError> {
///         Ok(CommandOutput::exited(0, ""))
///     }
/// }
///
/// let output = AlwaysEmpty.run(&CommandRequest::new("lsmod")).unwrap();
/// assert!(output.success());
/// ```
pub trait CommandRunner {
    /// Runs the command to completion, or until its timeout forces it down.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecError`] when the command cannot be started or
    /// supervised. A non-zero exit status is reported through
    /// [`CommandOutput::exit_code`], never as an error.
    fn run(&self, request: &CommandRequest) -> Result<CommandOutput, ExecError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, request: &CommandRequest) -> Result<CommandOutput, ExecError> {
        (**self).run(request)
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for Box<R> {
    fn run(&self, request: &CommandRequest) -> Result<CommandOutput, ExecError> {
        (**self).run(request)
    }
}

/// Summary of the most recent command seen by a [`CommandJournal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Rendered command line.
    pub command: String,
    /// Exit code when the command completed.
    pub exit_code: Option<i32>,
    /// Whether the watchdog killed the command.
    pub timed_out: bool,
    /// Trailing lines of standard error, or the execution error message.
    pub stderr_tail: String,
}

/// Runner wrapper remembering the last command and how it ended.
///
/// The orchestrator runs single-threaded, so the journal uses a `RefCell`
/// rather than a lock.
#[derive(Debug)]
pub struct CommandJournal<R> {
    inner: R,
    last: RefCell<Option<JournalEntry>>,
}

impl<R> CommandJournal<R> {
    /// Wraps `inner`.
    #[must_use]
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            last: RefCell::new(None),
        }
    }

    /// Returns the most recent journal entry.
    #[must_use]
    pub fn last(&self) -> Option<JournalEntry> {
        self.last.borrow().clone()
    }

    /// Returns the wrapped runner.
    #[must_use]
    pub const fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: CommandRunner> CommandRunner for CommandJournal<R> {
    fn run(&self, request: &CommandRequest) -> Result<CommandOutput, ExecError> {
        let result = self.inner.run(request);
        let entry = match &result {
            Ok(output) => JournalEntry {
                command: request.to_string(),
                exit_code: output.exit_code,
                timed_out: output.timed_out,
                stderr_tail: output.stderr_tail(STDERR_TAIL_LINES),
            },
            Err(error) => JournalEntry {
                command: request.to_string(),
                exit_code: None,
                timed_out: false,
                stderr_tail: error.to_string(),
            },
        };
        *self.last.borrow_mut() = Some(entry);
        result
    }
}
