//! Structured reporting of lifecycle progress.

use std::sync::Arc;

use crate::error::InvocationFailure;
use crate::reconcile::ReconciliationResult;
use crate::state::Phase;

const REPORT_TARGET: &str = "telstack_lifecycle::report";

/// Observer notified as an invocation progresses.
pub trait LifecycleReporter {
    /// Invoked after every phase change.
    fn phase_changed(&self, from: Phase, to: Phase);

    /// Invoked after a unit was loaded, unloaded, started, or stopped.
    fn unit_action(&self, unit: &str, action: &str);

    /// Invoked for conditions the operator should know about.
    fn advisory(&self, message: &str);

    /// Invoked once the configuration has been reconciled.
    fn reconciled(&self, result: &ReconciliationResult);

    /// Invoked when the invocation fails.
    fn failed(&self, failure: &InvocationFailure);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter,
{
    fn phase_changed(&self, from: Phase, to: Phase) {
        (**self).phase_changed(from, to);
    }

    fn unit_action(&self, unit: &str, action: &str) {
        (**self).unit_action(unit, action);
    }

    fn advisory(&self, message: &str) {
        (**self).advisory(message);
    }

    fn reconciled(&self, result: &ReconciliationResult) {
        (**self).reconciled(result);
    }

    fn failed(&self, failure: &InvocationFailure) {
        (**self).failed(failure);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredReporter;

impl StructuredReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredReporter {
    fn phase_changed(&self, from: Phase, to: Phase) {
        tracing::info!(
            target: REPORT_TARGET,
            event = "phase_changed",
            from = %from,
            to = %to,
            "lifecycle phase changed"
        );
    }

    fn unit_action(&self, unit: &str, action: &str) {
        tracing::info!(
            target: REPORT_TARGET,
            event = "unit_action",
            unit,
            action,
            "unit {action}"
        );
    }

    fn advisory(&self, message: &str) {
        tracing::warn!(
            target: REPORT_TARGET,
            event = "advisory",
            advisory = message,
            "lifecycle advisory"
        );
    }

    fn reconciled(&self, result: &ReconciliationResult) {
        tracing::info!(
            target: REPORT_TARGET,
            event = "reconciled",
            classification = %result.classification,
            changed_lines = result.delta.len(),
            warnings = result.warnings.len(),
            "channel configuration reconciled"
        );
    }

    fn failed(&self, failure: &InvocationFailure) {
        tracing::error!(
            target: REPORT_TARGET,
            event = "failed",
            phase = %failure.phase,
            class = %failure.class(),
            error = %failure.error,
            last_command = failure.last_command.as_ref().map(|entry| entry.command.as_str()),
            "lifecycle invocation failed"
        );
    }
}
