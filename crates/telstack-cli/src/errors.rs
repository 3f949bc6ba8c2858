//! Error types for the CLI runtime.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use telstack_config::ConfigError;
use telstack_lifecycle::LifecycleError;
use telstack_lifecycle::telemetry::TelemetryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to install signal handlers: {0}")]
    Signals(io::Error),
    #[error("failed to serialise report: {0}")]
    SerialiseReport(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    WriteOutput(#[from] io::Error),
    #[error("{0}")]
    Inspect(#[from] LifecycleError),
}

impl AppError {
    /// Exit status for the error: clap's own status for usage errors, which
    /// is zero for `--help` and `--version`.
    pub(crate) fn exit_code(&self) -> ExitCode {
        match self {
            Self::CliUsage(error) => {
                ExitCode::from(u8::try_from(error.exit_code()).unwrap_or(1))
            }
            _ => ExitCode::FAILURE,
        }
    }
}
