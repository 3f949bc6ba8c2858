//! Errors raised while spawning or supervising external commands.
//!
//! A command that runs and exits with a non-zero status is not an error here;
//! only failures to start, observe, or signal the child are. I/O errors are
//! wrapped in `Arc` so the enum stays cloneable and small.

use std::io;
use std::sync::Arc;

use nix::errno::Errno;
use thiserror::Error;

/// Errors arising from command execution.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// The program does not exist on the host.
    #[error("required tool '{program}' is not installed or not on PATH")]
    ToolMissing {
        /// Program that could not be found.
        program: String,
    },

    /// The program exists but the child process could not be started.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Waiting on the child or collecting its output failed.
    #[error("I/O error while supervising '{program}': {source}")]
    Io {
        /// Program being supervised.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The child's process identifier does not fit the platform's pid type.
    #[error("'{program}' reported an unusable process id {pid}")]
    InvalidPid {
        /// Program being supervised.
        program: String,
        /// Raw process identifier.
        pid: u32,
    },

    /// A drain thread for the child's output panicked.
    #[error("output reader for '{program}' terminated abnormally")]
    OutputReader {
        /// Program being supervised.
        program: String,
    },

    /// Signalling the child's process group failed for a reason other than
    /// the group having already exited.
    #[error("failed to signal process group {pgid} of '{program}': {source}")]
    Signal {
        /// Program being supervised.
        program: String,
        /// Process group that was targeted.
        pgid: i32,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
}

impl ExecError {
    /// Classifies a spawn failure, separating a missing binary from other
    /// start-up problems.
    #[must_use]
    pub fn from_spawn(program: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::ToolMissing {
                program: program.to_owned(),
            }
        } else {
            Self::Spawn {
                program: program.to_owned(),
                source: Arc::new(source),
            }
        }
    }

    /// Returns `true` when the failure means the tool is absent from the host.
    #[must_use]
    pub const fn is_tool_missing(&self) -> bool {
        matches!(self, Self::ToolMissing { .. })
    }

    /// Program associated with the failure.
    #[must_use]
    pub fn program(&self) -> &str {
        match self {
            Self::ToolMissing { program }
            | Self::Spawn { program, .. }
            | Self::Io { program, .. }
            | Self::InvalidPid { program, .. }
            | Self::OutputReader { program }
            | Self::Signal { program, .. } => program,
        }
    }
}
