//! Teardown: PBX first, then every unit in teardown order.

use telstack_exec::CommandRunner;
use tracing::{debug, warn};

use super::{ORCHESTRATOR_TARGET, Orchestrator, Run, StopMode};
use crate::error::LifecycleError;
use crate::graph::{ModuleGraph, ModuleSpec, UnitKind};
use crate::report::LifecycleReporter;
use crate::state::Phase;
use crate::tools::ServiceState;

/// `modprobe -r` attempts per module before giving up.
pub(crate) const UNLOAD_ATTEMPTS: u32 = 2;

impl<R: CommandRunner, P: LifecycleReporter> Orchestrator<R, P> {
    pub(super) fn stop(&self, run: &mut Run, mode: StopMode) -> Result<(), LifecycleError> {
        self.enter(run, Phase::Stopping)?;
        self.release_pbx(run, mode)?;

        let graph = self.settings.layout.graph()?;
        for unit in graph.teardown_order() {
            match unit.kind() {
                UnitKind::Service => self.stop_service(unit)?,
                UnitKind::KernelModule => self.unload_module(&graph, unit)?,
            }
        }
        self.enter(run, Phase::Stopped)
    }

    /// Detaches the PBX from the hardware before any module goes.
    fn release_pbx(&self, run: &mut Run, mode: StopMode) -> Result<(), LifecycleError> {
        let pbx = &self.settings.pbx;
        let state = self.services().status(&pbx.service)?;
        if state == ServiceState::NotInstalled {
            debug!(
                target: ORCHESTRATOR_TARGET,
                service = %pbx.service,
                "PBX is not installed; nothing to release"
            );
            return Ok(());
        }

        if mode == StopMode::Light {
            let console = self.console();
            if console.is_reachable()? {
                if !console.module_loaded(&pbx.channel_module)? {
                    return Ok(());
                }
                if console.unload_module(&pbx.channel_module)?
                    && !console.module_loaded(&pbx.channel_module)?
                {
                    self.reporter
                        .unit_action(&pbx.channel_module, "unloaded from the PBX");
                    return Ok(());
                }
                self.advise(
                    run,
                    format!(
                        "PBX refused to unload '{}'; stopping the PBX instead",
                        pbx.channel_module
                    ),
                );
            } else if state.may_be_running() {
                self.advise(
                    run,
                    "PBX console is unreachable; stopping the PBX instead".to_owned(),
                );
            }
        }
        self.terminate_pbx(state)
    }

    fn terminate_pbx(&self, state: ServiceState) -> Result<(), LifecycleError> {
        let service = &self.settings.pbx.service;
        if !state.may_be_running() {
            return Ok(());
        }
        let services = self.services();
        services.stop(service)?;
        if services.status(service)? == ServiceState::Running {
            return Err(LifecycleError::PbxStillRunning {
                unit: service.clone(),
            });
        }
        self.reporter.unit_action(service, "stopped");
        Ok(())
    }

    fn stop_service(&self, unit: &ModuleSpec) -> Result<(), LifecycleError> {
        let services = self.services();
        if !services.status(unit.name())?.may_be_running() {
            return Ok(());
        }
        services.stop(unit.name())?;
        if services.status(unit.name())? == ServiceState::Running {
            return Err(LifecycleError::ServiceStuck {
                unit: unit.name().to_owned(),
            });
        }
        self.reporter.unit_action(unit.name(), "stopped");
        Ok(())
    }

    /// Removes one module once nothing holds it.
    ///
    /// A module that is already absent is left alone. A live declared
    /// dependent, or any remaining holder, fails the invocation without a
    /// retry; only the removal itself is attempted more than once.
    fn unload_module(&self, graph: &ModuleGraph, unit: &ModuleSpec) -> Result<(), LifecycleError> {
        let modules = self.modules();
        let loaded = modules.loaded()?;
        if !loaded.is_loaded(unit.name()) {
            debug!(
                target: ORCHESTRATOR_TARGET,
                unit = unit.name(),
                "module already unloaded"
            );
            return Ok(());
        }
        if !unit.removable() {
            debug!(
                target: ORCHESTRATOR_TARGET,
                unit = unit.name(),
                "module is removed with its users; skipping"
            );
            return Ok(());
        }

        for dependent in graph.dependents_of(unit.name()) {
            let live = match dependent.kind() {
                UnitKind::KernelModule => loaded.is_loaded(dependent.name()),
                UnitKind::Service => self.services().status(dependent.name())?.may_be_running(),
            };
            if live {
                return Err(LifecycleError::OrderingViolation {
                    unit: unit.name().to_owned(),
                    dependent: dependent.name().to_owned(),
                });
            }
        }
        if let Some(holder) = loaded.holders(unit.name()).first() {
            return Err(if graph.contains(holder) {
                LifecycleError::OrderingViolation {
                    unit: unit.name().to_owned(),
                    dependent: holder.clone(),
                }
            } else {
                LifecycleError::UnknownHolder {
                    unit: unit.name().to_owned(),
                    holder: holder.clone(),
                }
            });
        }

        for attempt in 1..=UNLOAD_ATTEMPTS {
            let output = modules.unload(unit.name())?;
            if !modules.loaded()?.is_loaded(unit.name()) {
                self.reporter.unit_action(unit.name(), "unloaded");
                return Ok(());
            }
            warn!(
                target: ORCHESTRATOR_TARGET,
                unit = unit.name(),
                attempt,
                exit_code = ?output.exit_code,
                stderr = %output.stderr_tail(3),
                "module still loaded after removal"
            );
        }
        Err(LifecycleError::UnloadFailed {
            unit: unit.name().to_owned(),
            attempts: UNLOAD_ATTEMPTS,
        })
    }
}
