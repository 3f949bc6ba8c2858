//! Config reconciliation: comparing the channel configuration the generator
//! would produce for the current hardware against the active one.
//!
//! The generator always writes into a fresh scratch directory; the active
//! configuration is only ever read.

mod census;
mod diff;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use telstack_exec::{CommandOutput, CommandRequest, CommandRunner};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::FailureClass;
use crate::host::{HostContext, HostError};
use crate::spans::SpanPlan;
use crate::tools::{ToolError, ToolSet};

pub use self::census::{Census, CensusError, MAX_CHANNEL};
pub use self::diff::{DeltaKind, DeltaLine};

const RECONCILE_TARGET: &str = "telstack_lifecycle::reconcile";

/// Generator attempts before a hang is fatal.
pub const GENERATOR_ATTEMPTS: u32 = 2;

/// Environment variable naming the generator's output file.
pub const GENERATOR_OUTPUT_ENV: &str = "DAHDI_CONF_FILE";

const SCRATCH_PREFIX: &str = "telstack-genconf-";
const SCRATCH_FILE: &str = "system.conf";

/// How far the active configuration is from the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftClass {
    /// No difference.
    Clean,
    /// Differences that leave spans and channel roles unchanged.
    BenignDrift,
    /// Differences that change spans or channel roles.
    DangerousDrift,
}

impl std::fmt::Display for DriftClass {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(match self {
            Self::Clean => "clean",
            Self::BenignDrift => "benign drift",
            Self::DangerousDrift => "dangerous drift",
        })
    }
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    /// Configuration the generator produced; empty without hardware.
    pub expected_config: String,
    /// Configuration currently installed; empty when absent.
    pub active_config: String,
    /// Changed lines.
    pub delta: Vec<DeltaLine>,
    /// Drift classification.
    pub classification: DriftClass,
    /// Conditions noted while classifying.
    pub warnings: Vec<String>,
}

impl ReconciliationResult {
    /// Whether bring-up must not proceed.
    #[must_use]
    pub fn is_dangerous(&self) -> bool {
        self.classification == DriftClass::DangerousDrift
    }

    /// Channels the expected configuration places in a role, when countable.
    #[must_use]
    pub fn expected_channel_total(&self) -> Option<usize> {
        Census::parse(&self.expected_config)
            .ok()
            .map(|census| census.channel_total())
    }
}

/// Reconciliation failures. All of them stop the start sequence.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// The scratch directory could not be created or read.
    #[error("scratch area '{}' is unusable: {source}", path.display())]
    Scratch {
        /// Scratch path involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The generator could not be run.
    #[error("configuration generator could not run: {0}")]
    Generator(#[source] ToolError),
    /// The generator hung on every attempt.
    #[error("configuration generator hung on all {attempts} attempts")]
    GeneratorHung {
        /// Attempts made.
        attempts: u32,
    },
    /// The generator exited unsuccessfully.
    #[error("configuration generator exited with {exit_code:?}: {stderr}")]
    GeneratorFailed {
        /// Exit code, when it exited normally.
        exit_code: Option<i32>,
        /// Trailing standard error.
        stderr: String,
    },
    /// The generator succeeded without writing its output.
    #[error("configuration generator wrote nothing to '{}'", path.display())]
    GeneratorOutputMissing {
        /// Expected output file.
        path: PathBuf,
    },
    /// The active configuration could not be read.
    #[error(transparent)]
    ReadActive(#[from] HostError),
}

impl ReconcileError {
    /// Failure class of the error.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        FailureClass::Fatal
    }
}

/// Generates the expected configuration for `plan` and classifies the drift
/// of the active configuration from it.
///
/// Planning warnings, such as devices left unassigned, turn an otherwise
/// clean result into benign drift.
///
/// # Errors
///
/// Returns a [`ReconcileError`] when generation fails or the active
/// configuration cannot be read.
pub fn reconcile<R: CommandRunner + ?Sized>(
    runner: &R,
    tools: &ToolSet,
    host: &HostContext,
    plan: &SpanPlan,
) -> Result<ReconciliationResult, ReconcileError> {
    let expected_config = if plan.is_empty() {
        debug!(
            target: RECONCILE_TARGET,
            "no spans assigned; skipping configuration generation"
        );
        String::new()
    } else {
        generate(runner, tools, host)?
    };
    let active_config = host.read_active_config()?;
    let result = compare(expected_config, active_config, &plan.warnings);
    info!(
        target: RECONCILE_TARGET,
        classification = %result.classification,
        changed_lines = result.delta.len(),
        "configuration reconciled"
    );
    Ok(result)
}

/// Classifies `active` against `expected`.
#[must_use]
pub fn compare(expected: String, active: String, plan_warnings: &[String]) -> ReconciliationResult {
    let delta = diff::line_delta(&expected, &active);
    let mut warnings: Vec<String> = plan_warnings.to_vec();
    let classification = if delta.is_empty() {
        if warnings.is_empty() {
            DriftClass::Clean
        } else {
            DriftClass::BenignDrift
        }
    } else if delta.iter().all(DeltaLine::is_comment_or_blank) {
        DriftClass::BenignDrift
    } else {
        match (Census::parse(&expected), Census::parse(&active)) {
            (Ok(wanted), Ok(found)) if wanted == found => DriftClass::BenignDrift,
            (Ok(_), Ok(_)) => DriftClass::DangerousDrift,
            (Err(error), _) | (_, Err(error)) => {
                warnings.push(error.to_string());
                DriftClass::DangerousDrift
            }
        }
    };
    ReconciliationResult {
        expected_config: expected,
        active_config: active,
        delta,
        classification,
        warnings,
    }
}

fn generate<R: CommandRunner + ?Sized>(
    runner: &R,
    tools: &ToolSet,
    host: &HostContext,
) -> Result<String, ReconcileError> {
    let scratch = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir_in(host.scratch_root())
        .map_err(|source| ReconcileError::Scratch {
            path: host.scratch_root().as_std_path().to_path_buf(),
            source: Arc::new(source),
        })?;
    let target = scratch.path().join(SCRATCH_FILE);
    let request = CommandRequest::new(&tools.genconf)
        .arg("system")
        .env(GENERATOR_OUTPUT_ENV, target.to_string_lossy())
        .with_timeout(tools.genconf_timeout)
        .with_grace(tools.kill_grace);

    for attempt in 1..=GENERATOR_ATTEMPTS {
        let output = runner
            .run(&request)
            .map_err(|error| ReconcileError::Generator(error.into()))?;
        if output.timed_out {
            warn!(
                target: RECONCILE_TARGET,
                attempt,
                command = %request,
                "configuration generator hung and was killed"
            );
            continue;
        }
        return read_generated(&output, target);
    }
    Err(ReconcileError::GeneratorHung {
        attempts: GENERATOR_ATTEMPTS,
    })
}

fn read_generated(output: &CommandOutput, target: PathBuf) -> Result<String, ReconcileError> {
    if !output.success() {
        return Err(ReconcileError::GeneratorFailed {
            exit_code: output.exit_code,
            stderr: output.stderr_tail(5),
        });
    }
    match fs::read_to_string(&target) {
        Ok(text) => Ok(text),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            Err(ReconcileError::GeneratorOutputMissing { path: target })
        }
        Err(error) => Err(ReconcileError::Scratch {
            path: target,
            source: Arc::new(error),
        }),
    }
}
