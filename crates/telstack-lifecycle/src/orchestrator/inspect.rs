//! Read-only views of the stack: `status` and the `check` dry run.

use serde::Serialize;
use telstack_exec::CommandRunner;

use super::{Intent, Orchestrator, Run};
use crate::discovery::HardwareDevice;
use crate::error::LifecycleError;
use crate::graph::UnitKind;
use crate::reconcile::{ReconciliationResult, reconcile};
use crate::report::LifecycleReporter;
use crate::spans::SpanPlan;
use crate::state::Phase;
use crate::tools::ServiceState;

/// Observed state of one service unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// Service unit.
    pub unit: String,
    /// State reported by the service tool.
    pub state: ServiceState,
}

/// Snapshot of the stack and the PBX.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Phase implied by the loaded modules.
    pub phase: Phase,
    /// Stack modules currently loaded, in teardown order.
    pub loaded_modules: Vec<String>,
    /// Stack services and the PBX service.
    pub services: Vec<ServiceStatus>,
    /// Whether the PBX console answers; `None` when the PBX is not installed.
    pub pbx_reachable: Option<bool>,
    /// Whether the PBX has its channel module; `None` when unknown.
    pub channel_module_loaded: Option<bool>,
}

/// Result of a bring-up dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    /// Hardware discovered.
    pub devices: Vec<HardwareDevice>,
    /// Span plan bring-up would apply.
    pub plan: SpanPlan,
    /// Drift of the active configuration.
    pub reconciliation: ReconciliationResult,
    /// Whether bring-up would run without hardware.
    pub software_only: bool,
    /// Conditions reported to the operator.
    pub advisories: Vec<String>,
}

impl<R: CommandRunner, P: LifecycleReporter> Orchestrator<R, P> {
    /// Observes the stack without changing it.
    ///
    /// # Errors
    ///
    /// Returns a [`LifecycleError`] when a query tool fails.
    pub fn status(&self) -> Result<StatusReport, LifecycleError> {
        let graph = self.settings.layout.graph()?;
        let loaded = self.modules().loaded()?;
        let phase = if loaded.is_loaded(self.settings.layout.base_module()) {
            Phase::Running
        } else {
            Phase::Unloaded
        };

        let units = graph.teardown_order();
        let loaded_modules = units
            .iter()
            .filter(|unit| unit.kind() == UnitKind::KernelModule && loaded.is_loaded(unit.name()))
            .map(|unit| unit.name().to_owned())
            .collect();

        let services = self.services();
        let pbx_service = self.settings.pbx.service.as_str();
        let mut statuses = Vec::new();
        for unit in units
            .iter()
            .filter(|unit| unit.kind() == UnitKind::Service)
            .map(|unit| unit.name())
            .chain([pbx_service])
        {
            statuses.push(ServiceStatus {
                unit: unit.to_owned(),
                state: services.status(unit)?,
            });
        }

        let pbx_installed = statuses
            .last()
            .is_some_and(|status| status.state != ServiceState::NotInstalled);
        let (pbx_reachable, channel_module_loaded) = if pbx_installed {
            let console = self.console();
            let reachable = console.is_reachable()?;
            let module = if reachable {
                Some(console.module_loaded(&self.settings.pbx.channel_module)?)
            } else {
                None
            };
            (Some(reachable), module)
        } else {
            (None, None)
        };

        Ok(StatusReport {
            phase,
            loaded_modules,
            services: statuses,
            pbx_reachable,
            channel_module_loaded,
        })
    }

    /// Runs discovery, span assignment, and reconciliation without loading,
    /// unloading, starting, or stopping anything.
    ///
    /// # Errors
    ///
    /// Returns a [`LifecycleError`] when the span declaration is unusable or
    /// reconciliation fails. Dangerous drift is reported, not returned.
    pub fn check(&self) -> Result<CheckReport, LifecycleError> {
        let mut run = Run::new(Intent::Start, Phase::Stopped);
        let mut devices = self.discover_devices(&mut run)?;
        let plan = self.assign_spans(&mut run, &mut devices)?;
        let reconciliation =
            reconcile(&self.runner, &self.settings.tools, &self.settings.host, &plan)?;
        self.reporter.reconciled(&reconciliation);
        Ok(CheckReport {
            devices,
            plan,
            reconciliation,
            software_only: run.software_only,
            advisories: run.advisories,
        })
    }
}
