//! Bring-up: discovery, span assignment, reconciliation, then units and PBX.

use std::thread;

use telstack_exec::CommandRunner;
use tracing::{debug, info};

use super::{ORCHESTRATOR_TARGET, Orchestrator, Run};
use crate::discovery::{HardwareDevice, discover};
use crate::error::{FailureClass, LifecycleError};
use crate::graph::{ModuleSpec, UnitKind};
use crate::reconcile::{ReconciliationResult, reconcile};
use crate::report::LifecycleReporter;
use crate::spans::{SpanPlan, SpanPolicy, SpanSource, resolve};
use crate::state::Phase;
use crate::tools::{PbxChannels, ServiceState, run_checked};

impl<R: CommandRunner, P: LifecycleReporter> Orchestrator<R, P> {
    pub(super) fn start(&self, run: &mut Run) -> Result<(), LifecycleError> {
        if run.state.phase() == Phase::Running {
            return Err(LifecycleError::AlreadyRunning);
        }

        self.enter(run, Phase::Discovering)?;
        let mut devices = self.discover_devices(run)?;

        self.enter(run, Phase::Assigning)?;
        let plan = self.assign_spans(run, &mut devices)?;
        run.devices.clone_from(&devices);

        self.enter(run, Phase::Configuring)?;
        let result = reconcile(&self.runner, &self.settings.tools, &self.settings.host, &plan)?;
        self.reporter.reconciled(&result);
        run.reconciliation = Some(result.clone());
        if result.is_dangerous() {
            return Err(LifecycleError::DangerousDrift {
                result: Box::new(result),
            });
        }
        for warning in &result.warnings {
            self.advise(run, warning.clone());
        }

        self.enter(run, Phase::Starting)?;
        let graph = self.settings.layout.for_devices(&devices).graph()?;
        for unit in graph.bringup_order() {
            match unit.kind() {
                UnitKind::KernelModule => self.load_module(unit)?,
                UnitKind::Service => self.start_service(unit)?,
            }
        }
        self.apply_spans(&plan)?;
        if !plan.is_empty() {
            let request = self.settings.tools.request(&self.settings.tools.cfg);
            run_checked(&self.runner, &request)?;
            self.reporter
                .unit_action(&self.settings.tools.cfg, "applied channel configuration");
        }
        run.plan = Some(plan);
        run.channels = self.bring_up_pbx(&result)?;

        self.enter(run, Phase::Running)
    }

    /// Discovery failures degrade to a software-only bring-up.
    pub(super) fn discover_devices(
        &self,
        run: &mut Run,
    ) -> Result<Vec<HardwareDevice>, LifecycleError> {
        let devices =
            match discover(&self.runner, &self.settings.tools, &self.settings.host) {
                Ok(devices) => devices,
                Err(error) if error.class() == FailureClass::Degradable => {
                    self.advise(
                        run,
                        format!("{error}; continuing in software-only mode"),
                    );
                    Vec::new()
                }
                Err(error) => return Err(error.into()),
            };
        if devices.is_empty() {
            run.software_only = true;
            info!(
                target: ORCHESTRATOR_TARGET,
                "no telephony hardware; bringing up software-only"
            );
        }
        Ok(devices)
    }

    pub(super) fn assign_spans(
        &self,
        run: &mut Run,
        devices: &mut [HardwareDevice],
    ) -> Result<SpanPlan, LifecycleError> {
        let policy = SpanPolicy::load(&self.settings.host)?;
        let plan = resolve(devices, &policy);
        plan.annotate(devices);
        for advisory in &plan.advisories {
            self.advise(run, advisory.clone());
        }
        Ok(plan)
    }

    fn load_module(&self, unit: &ModuleSpec) -> Result<(), LifecycleError> {
        if !unit.removable() {
            return Ok(());
        }
        let modules = self.modules();
        if modules.loaded()?.is_loaded(unit.name()) {
            debug!(
                target: ORCHESTRATOR_TARGET,
                unit = unit.name(),
                "module already loaded"
            );
            return Ok(());
        }
        let output = modules.load(unit.name())?;
        if !modules.loaded()?.is_loaded(unit.name()) {
            return Err(LifecycleError::LoadFailed {
                unit: unit.name().to_owned(),
                stderr: output.stderr_tail(5),
            });
        }
        self.reporter.unit_action(unit.name(), "loaded");
        Ok(())
    }

    fn start_service(&self, unit: &ModuleSpec) -> Result<(), LifecycleError> {
        let services = self.services();
        if services.status(unit.name())? == ServiceState::Running {
            return Ok(());
        }
        services.start(unit.name())?;
        self.reporter.unit_action(unit.name(), "started");
        Ok(())
    }

    /// Binds spans to slots: declared bindings replace whatever the kernel
    /// chose, automatic assignment lets the kernel order them.
    fn apply_spans(&self, plan: &SpanPlan) -> Result<(), LifecycleError> {
        if plan.is_empty() {
            return Ok(());
        }
        let tools = &self.settings.tools;
        let steps: &[&str] = match plan.source {
            SpanSource::Manual => &["remove", "add"],
            SpanSource::Auto => &["auto"],
        };
        for step in steps {
            run_checked(&self.runner, &tools.request(&tools.span).arg(*step))?;
        }
        self.reporter
            .unit_action(&tools.span, &format!("{} span assignment", plan.source));
        Ok(())
    }

    /// Starts the PBX, or reattaches a PBX that survived a light stop, and
    /// checks that it sees the configured channels.
    fn bring_up_pbx(
        &self,
        result: &ReconciliationResult,
    ) -> Result<Option<PbxChannels>, LifecycleError> {
        let pbx = &self.settings.pbx;
        let services = self.services();
        let state = services.status(&pbx.service)?;
        if state == ServiceState::NotInstalled {
            debug!(
                target: ORCHESTRATOR_TARGET,
                service = %pbx.service,
                "PBX is not installed; skipping"
            );
            return Ok(None);
        }

        let console = self.console();
        if !console.is_reachable()? {
            if state != ServiceState::Running {
                services.start(&pbx.service)?;
                self.reporter.unit_action(&pbx.service, "started");
            }
            self.wait_for_console()?;
        }

        if !console.module_loaded(&pbx.channel_module)? {
            let accepted = console.load_module(&pbx.channel_module)?;
            if !accepted || !console.module_loaded(&pbx.channel_module)? {
                return Err(LifecycleError::ChannelModuleLoad {
                    module: pbx.channel_module.clone(),
                });
            }
            self.reporter
                .unit_action(&pbx.channel_module, "loaded into the PBX");
        }

        let channels = console.channels()?;
        let expected = result.expected_channel_total().unwrap_or(0);
        if expected > 0 && channels.numbered.is_empty() {
            return Err(LifecycleError::ChannelShortfall { expected, found: 0 });
        }
        info!(
            target: ORCHESTRATOR_TARGET,
            expected,
            listed = channels.numbered.len(),
            "PBX channels verified"
        );
        Ok(Some(channels))
    }

    fn wait_for_console(&self) -> Result<(), LifecycleError> {
        let pbx = &self.settings.pbx;
        let console = self.console();
        for attempt in 1..=pbx.ready_attempts {
            if console.is_reachable()? {
                debug!(target: ORCHESTRATOR_TARGET, attempt, "PBX console answered");
                return Ok(());
            }
            if attempt < pbx.ready_attempts {
                thread::sleep(pbx.ready_interval);
            }
        }
        Err(LifecycleError::PbxUnreachable {
            attempts: pbx.ready_attempts,
        })
    }
}
