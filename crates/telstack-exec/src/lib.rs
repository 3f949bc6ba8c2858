//! Bounded external command execution for the telstack orchestrator.
//!
//! Every interaction with the host's hardware, service, and PBX tooling goes
//! through a [`CommandRunner`]. The runner reports exit status and captured
//! output without treating a non-zero exit as an error: callers inspect the
//! [`CommandOutput`] and decide what the status means for their tool.
//!
//! [`SystemRunner`] is the production implementation. Each child runs in its
//! own process group and, when the [`CommandRequest`] carries a timeout, a
//! watchdog thread escalates from `SIGTERM` to `SIGKILL` across the whole
//! group once the deadline and the grace interval have passed.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use telstack_exec::{CommandRequest, CommandRunner, SystemRunner};
//!
//! let request = CommandRequest::new("lsmod").with_timeout(Duration::from_secs(5));
//! let output = SystemRunner.run(&request)?;
//! if output.success() {
//!     println!("{}", output.stdout);
//! }
//! # Ok::<(), telstack_exec::ExecError>(())
//! ```

pub mod error;
pub mod process;
pub mod request;
pub mod runner;

#[cfg(test)]
mod tests;

pub use self::error::ExecError;
pub use self::process::SystemRunner;
pub use self::request::{CommandOutput, CommandRequest, DEFAULT_KILL_GRACE};
pub use self::runner::{CommandJournal, CommandRunner, JournalEntry};
