//! CLI entrypoint for the telstack orchestrator.
//!
//! The binary delegates to [`telstack_cli::run`], which loads configuration,
//! parses the lifecycle command, and drives the orchestrator against the
//! host's real tooling.

use std::io::{self, IsTerminal, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let stdout_is_terminal = io::stdout().is_terminal();
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    telstack_cli::run(
        std::env::args_os(),
        &mut stdout,
        &mut stderr,
        stdout_is_terminal,
    )
}
