//! Lifecycle error taxonomy.

use std::fmt;

use serde::Serialize;
use telstack_exec::JournalEntry;
use thiserror::Error;

use crate::discovery::DiscoveryError;
use crate::graph::GraphError;
use crate::host::HostError;
use crate::reconcile::{ReconcileError, ReconciliationResult};
use crate::spans::PolicyError;
use crate::state::{Phase, StateError};
use crate::tools::ToolError;

/// How the orchestrator treats a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Handled locally with a fixed retry bound.
    Retryable,
    /// The run continues with reduced capability.
    Degradable,
    /// The channel configuration would change spans or channel roles.
    DangerousDrift,
    /// The invocation stops.
    Fatal,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Retryable => "retryable",
            Self::Degradable => "degradable",
            Self::DangerousDrift => "dangerous drift",
            Self::Fatal => "fatal",
        })
    }
}

/// Errors that end a lifecycle invocation.
#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    /// The configured stack layout is inconsistent.
    #[error("invalid stack layout: {0}")]
    Graph(#[from] GraphError),
    /// A host tool failed.
    #[error(transparent)]
    Tool(#[from] ToolError),
    /// A declared dependent is still live when its provider must go.
    #[error("cannot remove '{unit}': dependent '{dependent}' is still loaded")]
    OrderingViolation {
        /// Unit being removed.
        unit: String,
        /// Live dependent.
        dependent: String,
    },
    /// A module outside the stack holds a module being removed.
    #[error("cannot remove '{unit}': it is held by '{holder}', which this stack does not manage")]
    UnknownHolder {
        /// Unit being removed.
        unit: String,
        /// Unmanaged holder.
        holder: String,
    },
    /// A module stayed loaded after every unload attempt.
    #[error("module '{unit}' is still loaded after {attempts} unload attempts")]
    UnloadFailed {
        /// Module being removed.
        unit: String,
        /// Attempts made.
        attempts: u32,
    },
    /// A module did not appear after loading it.
    #[error("module '{unit}' is not loaded after modprobe: {stderr}")]
    LoadFailed {
        /// Module being loaded.
        unit: String,
        /// Trailing standard error of the load.
        stderr: String,
    },
    /// A service kept running after being stopped.
    #[error("service '{unit}' is still running after stop")]
    ServiceStuck {
        /// Service unit.
        unit: String,
    },
    /// Discovery failed where degradation was not possible.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    /// The span declaration is unusable.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// A host file could not be read.
    #[error(transparent)]
    Host(#[from] HostError),
    /// Reconciliation failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    /// The active configuration differs in spans or channel roles.
    #[error("active channel configuration differs dangerously from the generated one ({} changed lines)", .result.delta.len())]
    DangerousDrift {
        /// Reconciliation that blocked bring-up.
        result: Box<ReconciliationResult>,
    },
    /// `start` was requested while the stack is running.
    #[error("the telephony stack is already running; use restart")]
    AlreadyRunning,
    /// The PBX console never answered after start.
    #[error("PBX console did not answer after {attempts} attempts")]
    PbxUnreachable {
        /// Polls made.
        attempts: u32,
    },
    /// The PBX kept running after being stopped.
    #[error("PBX service '{unit}' is still running after stop")]
    PbxStillRunning {
        /// PBX service unit.
        unit: String,
    },
    /// The PBX refused to load its channel module.
    #[error("PBX did not load channel module '{module}'")]
    ChannelModuleLoad {
        /// Channel module.
        module: String,
    },
    /// The PBX lists fewer channels than configured.
    #[error("PBX lists {found} hardware channels but {expected} are configured")]
    ChannelShortfall {
        /// Channels in the expected configuration.
        expected: usize,
        /// Channels the PBX lists.
        found: usize,
    },
    /// An internal phase change was illegal.
    #[error(transparent)]
    State(#[from] StateError),
}

impl LifecycleError {
    /// Failure class of the error.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::Tool(error) => error.class(),
            Self::Discovery(error) => error.class(),
            Self::Reconcile(error) => error.class(),
            Self::DangerousDrift { .. } => FailureClass::DangerousDrift,
            _ => FailureClass::Fatal,
        }
    }

    /// Reconciliation attached to the error, when drift blocked bring-up.
    #[must_use]
    pub fn drift(&self) -> Option<&ReconciliationResult> {
        match self {
            Self::DangerousDrift { result } => Some(result.as_ref()),
            _ => None,
        }
    }
}

/// Final failure of one invocation.
#[derive(Debug, Clone, Error)]
#[error("failed during {phase}: {error}")]
pub struct InvocationFailure {
    /// Phase in which the invocation failed.
    pub phase: Phase,
    /// Cause of the failure.
    #[source]
    pub error: LifecycleError,
    /// Most recent external command, for diagnosis.
    pub last_command: Option<JournalEntry>,
}

impl InvocationFailure {
    /// Failure class of the cause.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        self.error.class()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::ordering(
        LifecycleError::OrderingViolation { unit: "dahdi".into(), dependent: "wctdm24xxp".into() },
        FailureClass::Fatal
    )]
    #[case::timeout(
        LifecycleError::Tool(ToolError::TimedOut { command: "lsmod".into() }),
        FailureClass::Retryable
    )]
    #[case::discovery(
        LifecycleError::Discovery(DiscoveryError::TimedOut { tool: "dahdi_hardware".into() }),
        FailureClass::Degradable
    )]
    #[case::running(LifecycleError::AlreadyRunning, FailureClass::Fatal)]
    fn classifies_errors(#[case] error: LifecycleError, #[case] class: FailureClass) {
        assert_eq!(error.class(), class);
    }

    #[test]
    fn failure_names_the_phase() {
        let failure = InvocationFailure {
            phase: Phase::Stopping,
            error: LifecycleError::UnknownHolder {
                unit: "dahdi".into(),
                holder: "vendor_echo".into(),
            },
            last_command: None,
        };
        assert_eq!(
            failure.to_string(),
            "failed during stopping: cannot remove 'dahdi': it is held by 'vendor_echo', which this stack does not manage"
        );
    }
}
