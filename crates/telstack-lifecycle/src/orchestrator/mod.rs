//! Lifecycle orchestration of the telephony stack and the PBX.
//!
//! One [`Orchestrator::execute`] call is one invocation: the stack's phase is
//! observed, the intent's phases run strictly in sequence, and the outcome is
//! either a [`LifecycleReport`] or an [`InvocationFailure`] naming the phase
//! that failed. Every external step goes through the orchestrator's command
//! journal so a failure can show the last command that ran.

mod inspect;
mod start;
mod stop;

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use telstack_config::Config;
use telstack_exec::{CommandJournal, CommandRunner};
use tracing::info;

use crate::discovery::HardwareDevice;
use crate::error::{InvocationFailure, LifecycleError};
use crate::graph::StackLayout;
use crate::host::HostContext;
use crate::reconcile::ReconciliationResult;
use crate::report::{LifecycleReporter, StructuredReporter};
use crate::spans::SpanPlan;
use crate::state::{LifecycleState, Phase};
use crate::tools::{ModuleControl, PbxChannels, PbxConsole, ServiceControl, ToolSet};

pub use self::inspect::{CheckReport, ServiceStatus, StatusReport};

const ORCHESTRATOR_TARGET: &str = "telstack_lifecycle::orchestrator";

/// How the PBX is treated while the stack stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMode {
    /// Unload the channel module from the live PBX, terminating the PBX only
    /// when that is impossible.
    Light,
    /// Terminate the PBX.
    Full,
}

/// What an invocation should achieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Tear the stack down.
    Stop(StopMode),
    /// Bring the stack up from a stopped host.
    Start,
    /// Stop, then start.
    Restart(StopMode),
}

impl fmt::Display for Intent {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop(StopMode::Light) => formatter.write_str("stop"),
            Self::Stop(StopMode::Full) => formatter.write_str("stop --force"),
            Self::Start => formatter.write_str("start"),
            Self::Restart(StopMode::Light) => formatter.write_str("restart"),
            Self::Restart(StopMode::Full) => formatter.write_str("restart --force"),
        }
    }
}

/// PBX service, channel module, and readiness polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbxSettings {
    /// PBX service unit.
    pub service: String,
    /// Channel module the PBX loads for the hardware.
    pub channel_module: String,
    /// Console polls after starting the PBX.
    pub ready_attempts: u32,
    /// Pause between console polls.
    pub ready_interval: Duration,
}

impl PbxSettings {
    /// Settings taken from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            service: config.pbx_service().to_owned(),
            channel_module: config.pbx_channel_module().to_owned(),
            ready_attempts: config.pbx_ready_attempts(),
            ready_interval: config.pbx_ready_interval(),
        }
    }
}

/// Everything the orchestrator needs to know about the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Full stack layout; bring-up narrows it to the discovered hardware.
    pub layout: StackLayout,
    /// Tool names and bounds.
    pub tools: ToolSet,
    /// Host paths and kernel release.
    pub host: HostContext,
    /// PBX coordination.
    pub pbx: PbxSettings,
}

impl OrchestratorSettings {
    /// Settings taken from configuration and the detected host.
    #[must_use]
    pub fn from_config(config: &Config, host: HostContext) -> Self {
        Self {
            layout: StackLayout::from_config(config),
            tools: ToolSet::from_config(config),
            host,
            pbx: PbxSettings::from_config(config),
        }
    }
}

/// Outcome of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    /// Requested intent.
    pub intent: Intent,
    /// Phase observed before anything ran.
    pub initial: Phase,
    /// Phase reached.
    pub final_phase: Phase,
    /// Every phase visited.
    pub history: Vec<Phase>,
    /// Hardware discovered during bring-up.
    pub devices: Vec<HardwareDevice>,
    /// Span plan applied during bring-up.
    pub plan: Option<SpanPlan>,
    /// Reconciliation performed during bring-up.
    pub reconciliation: Option<ReconciliationResult>,
    /// Whether bring-up ran without telephony hardware.
    pub software_only: bool,
    /// Conditions reported to the operator.
    pub advisories: Vec<String>,
    /// Channels the PBX listed after bring-up.
    pub channels: Option<PbxChannels>,
}

/// Mutable record of one invocation in progress.
#[derive(Debug)]
struct Run {
    intent: Intent,
    initial: Phase,
    state: LifecycleState,
    devices: Vec<HardwareDevice>,
    plan: Option<SpanPlan>,
    reconciliation: Option<ReconciliationResult>,
    software_only: bool,
    advisories: Vec<String>,
    channels: Option<PbxChannels>,
}

impl Run {
    fn new(intent: Intent, initial: Phase) -> Self {
        Self {
            intent,
            initial,
            state: LifecycleState::new(initial),
            devices: Vec::new(),
            plan: None,
            reconciliation: None,
            software_only: false,
            advisories: Vec::new(),
            channels: None,
        }
    }

    fn into_report(self) -> LifecycleReport {
        LifecycleReport {
            intent: self.intent,
            initial: self.initial,
            final_phase: self.state.phase(),
            history: self.state.history().to_vec(),
            devices: self.devices,
            plan: self.plan,
            reconciliation: self.reconciliation,
            software_only: self.software_only,
            advisories: self.advisories,
            channels: self.channels,
        }
    }
}

/// Sequences stop and start of the telephony stack.
#[derive(Debug)]
pub struct Orchestrator<R, P = StructuredReporter> {
    runner: CommandJournal<R>,
    settings: OrchestratorSettings,
    reporter: P,
}

impl<R: CommandRunner> Orchestrator<R> {
    /// Orchestrator running external commands through `runner`.
    #[must_use]
    pub const fn new(runner: R, settings: OrchestratorSettings) -> Self {
        Self {
            runner: CommandJournal::new(runner),
            settings,
            reporter: StructuredReporter::new(),
        }
    }
}

impl<R: CommandRunner, P: LifecycleReporter> Orchestrator<R, P> {
    /// Replaces the reporter.
    #[must_use]
    pub fn with_reporter<Q: LifecycleReporter>(self, reporter: Q) -> Orchestrator<R, Q> {
        Orchestrator {
            runner: self.runner,
            settings: self.settings,
            reporter,
        }
    }

    /// Runner the orchestrator delegates to.
    #[must_use]
    pub const fn runner(&self) -> &R {
        self.runner.inner()
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Runs one invocation of `intent`.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationFailure`] naming the phase that failed, its
    /// cause, and the last external command run.
    pub fn execute(&self, intent: Intent) -> Result<LifecycleReport, InvocationFailure> {
        let initial = self
            .observe()
            .map_err(|error| self.failure(Phase::Unloaded, error))?;
        info!(
            target: ORCHESTRATOR_TARGET,
            intent = %intent,
            observed = %initial,
            "lifecycle invocation started"
        );

        let mut run = Run::new(intent, initial);
        let outcome = match intent {
            Intent::Stop(mode) => self.stop(&mut run, mode),
            Intent::Start => self.start(&mut run),
            Intent::Restart(mode) => self
                .stop(&mut run, mode)
                .and_then(|()| self.start(&mut run)),
        };
        match outcome {
            Ok(()) => {
                info!(
                    target: ORCHESTRATOR_TARGET,
                    intent = %intent,
                    phase = %run.state.phase(),
                    "lifecycle invocation completed"
                );
                Ok(run.into_report())
            }
            Err(error) => {
                let phase = run.state.fail();
                self.reporter.phase_changed(phase, Phase::Failed);
                Err(self.failure(phase, error))
            }
        }
    }

    /// Phase implied by the loaded modules.
    fn observe(&self) -> Result<Phase, LifecycleError> {
        let loaded = self.modules().loaded()?;
        Ok(if loaded.is_loaded(self.settings.layout.base_module()) {
            Phase::Running
        } else {
            Phase::Unloaded
        })
    }

    fn failure(&self, phase: Phase, error: LifecycleError) -> InvocationFailure {
        let failure = InvocationFailure {
            phase,
            error,
            last_command: self.runner.last(),
        };
        self.reporter.failed(&failure);
        failure
    }

    fn enter(&self, run: &mut Run, next: Phase) -> Result<(), LifecycleError> {
        let from = run.state.phase();
        run.state.advance(next)?;
        self.reporter.phase_changed(from, next);
        Ok(())
    }

    fn advise(&self, run: &mut Run, message: String) {
        self.reporter.advisory(&message);
        run.advisories.push(message);
    }

    fn modules(&self) -> ModuleControl<'_, CommandJournal<R>> {
        ModuleControl::new(&self.runner, &self.settings.tools)
    }

    fn services(&self) -> ServiceControl<'_, CommandJournal<R>> {
        ServiceControl::new(&self.runner, &self.settings.tools)
    }

    fn console(&self) -> PbxConsole<'_, CommandJournal<R>> {
        PbxConsole::new(&self.runner, &self.settings.tools)
    }
}
