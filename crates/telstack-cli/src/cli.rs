//! CLI argument definitions for the telstack orchestrator.

use clap::{Parser, Subcommand, ValueEnum};
use telstack_lifecycle::{Intent, StopMode};

/// Output format selection for reports written to standard output.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Selects `human` for terminal output and `json` for redirected output.
    #[default]
    Auto,
    /// Always render human-readable output.
    Human,
    /// Always emit JSON reports.
    Json,
}

/// Output format after terminal detection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolvedOutputFormat {
    /// Human-readable text.
    Human,
    /// One JSON document.
    Json,
}

impl OutputFormat {
    /// Resolves `auto` against whether standard output is a terminal.
    #[must_use]
    pub const fn resolve(self, stdout_is_terminal: bool) -> ResolvedOutputFormat {
        match self {
            Self::Auto if stdout_is_terminal => ResolvedOutputFormat::Human,
            Self::Auto | Self::Json => ResolvedOutputFormat::Json,
            Self::Human => ResolvedOutputFormat::Human,
        }
    }
}

/// Lifecycle control for the kernel telephony stack and its PBX.
///
/// Invocations are not serialised against each other; run one at a time per
/// host.
#[derive(Parser, Debug)]
#[command(name = "telstack", disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Controls how reports are rendered.
    #[arg(long, value_enum, default_value_t = OutputFormat::Auto)]
    pub(crate) output: OutputFormat,
    /// Lifecycle command to run.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Lifecycle commands.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Stops the stack, detaching the PBX from the hardware.
    Stop {
        /// Stops the PBX process instead of unloading its channel module.
        #[arg(long)]
        force: bool,
    },
    /// Discovers hardware, validates the configuration, and brings the stack up.
    Start,
    /// Stops and then starts the stack.
    Restart {
        /// Stops the PBX process instead of unloading its channel module.
        #[arg(long)]
        force: bool,
    },
    /// Restarts while keeping the PBX process alive.
    RestartLight,
    /// Reports the observed state without changing it.
    Status,
    /// Runs discovery, span assignment, and reconciliation without changes.
    Check,
}

impl CliCommand {
    /// Intent for commands that change the stack.
    pub(crate) const fn intent(self) -> Option<Intent> {
        match self {
            Self::Stop { force } => Some(Intent::Stop(stop_mode(force))),
            Self::Start => Some(Intent::Start),
            Self::Restart { force } => Some(Intent::Restart(stop_mode(force))),
            Self::RestartLight => Some(Intent::Restart(StopMode::Light)),
            Self::Status | Self::Check => None,
        }
    }
}

const fn stop_mode(force: bool) -> StopMode {
    if force { StopMode::Full } else { StopMode::Light }
}
