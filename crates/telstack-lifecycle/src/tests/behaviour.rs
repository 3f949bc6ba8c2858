//! Behavioural tests for operator-facing lifecycle invocations.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::support::{ANALOGUE_CARD, FakeHost, HostFixture, T1_CONFIG};
use crate::error::InvocationFailure;
use crate::orchestrator::{Intent, LifecycleReport, Orchestrator, StopMode};

type StepResult = Result<(), String>;

struct LifecycleWorld {
    fixture: Option<HostFixture>,
    fake: Option<FakeHost>,
    active_config: Option<String>,
    orchestrator: Option<Orchestrator<FakeHost>>,
    outcome: Option<Result<LifecycleReport, InvocationFailure>>,
}

impl LifecycleWorld {
    fn new() -> Self {
        Self {
            fixture: Some(HostFixture::new()),
            fake: None,
            active_config: None,
            orchestrator: None,
            outcome: None,
        }
    }

    fn arrange(&mut self, fake: FakeHost) {
        self.fake = Some(fake);
    }

    fn adjust(&mut self, change: impl FnOnce(FakeHost) -> FakeHost) -> StepResult {
        let fake = self.fake.take().ok_or("no host was arranged")?;
        self.fake = Some(change(fake));
        Ok(())
    }

    fn run(&mut self, intent: Intent) -> StepResult {
        let fake = self.fake.take().ok_or("no host was arranged")?;
        let mut fixture = self.fixture.take().ok_or("fixture already consumed")?;
        if let Some(active) = &self.active_config {
            fixture = fixture.with_active_config(active);
        }
        let orchestrator = Orchestrator::new(fake, fixture.settings.clone());
        self.outcome = Some(orchestrator.execute(intent));
        self.orchestrator = Some(orchestrator);
        self.fixture = Some(fixture);
        Ok(())
    }

    fn report(&self) -> Result<&LifecycleReport, String> {
        match &self.outcome {
            Some(Ok(report)) => Ok(report),
            Some(Err(failure)) => Err(format!("invocation failed: {failure}")),
            None => Err("no invocation ran".to_owned()),
        }
    }

    fn failure(&self) -> Result<&InvocationFailure, String> {
        match &self.outcome {
            Some(Err(failure)) => Ok(failure),
            Some(Ok(report)) => Err(format!(
                "invocation succeeded in {}",
                report.final_phase
            )),
            None => Err("no invocation ran".to_owned()),
        }
    }

    fn host(&self) -> Result<&FakeHost, String> {
        self.orchestrator
            .as_ref()
            .map(Orchestrator::runner)
            .ok_or_else(|| "no invocation ran".to_owned())
    }
}

#[fixture]
fn world() -> RefCell<LifecycleWorld> {
    RefCell::new(LifecycleWorld::new())
}

#[given("a stopped host without telephony hardware")]
fn given_bare_host(world: &RefCell<LifecycleWorld>) {
    world.borrow_mut().arrange(FakeHost::new());
}

#[given("a stopped host with an analogue card")]
fn given_stopped_card(world: &RefCell<LifecycleWorld>) {
    world.borrow_mut().arrange(
        FakeHost::new()
            .with_inventory(ANALOGUE_CARD)
            .generating(T1_CONFIG)
            .with_channels(1..=24),
    );
}

#[given("a running stack with an analogue card")]
fn given_running_stack(world: &RefCell<LifecycleWorld>) {
    world.borrow_mut().arrange(
        FakeHost::running_stack()
            .generating(T1_CONFIG)
            .with_channels(1..=24),
    );
}

#[given("the active configuration assigns \"{roles}\" instead of bearer channels")]
fn given_edited_roles(world: &RefCell<LifecycleWorld>, roles: String) {
    world.borrow_mut().active_config = Some(T1_CONFIG.replace("bchan=1-23", &roles));
}

#[given("the active configuration matches the generator")]
fn given_matching_config(world: &RefCell<LifecycleWorld>) {
    world.borrow_mut().active_config = Some(T1_CONFIG.to_owned());
}

#[given("the base module is held by \"{holder}\"")]
fn given_foreign_holder(world: &RefCell<LifecycleWorld>, holder: String) -> StepResult {
    world
        .borrow_mut()
        .adjust(|fake| fake.with_foreign_holder("dahdi", &holder))
}

#[when("the operator runs \"{command}\"")]
fn when_operator_runs(world: &RefCell<LifecycleWorld>, command: String) -> StepResult {
    let intent = parse_intent(&command)?;
    world.borrow_mut().run(intent)
}

#[then("the stack reaches \"{phase}\"")]
fn then_stack_reaches(world: &RefCell<LifecycleWorld>, phase: String) -> StepResult {
    let world = world.borrow();
    let reached = world.report()?.final_phase;
    if reached.as_str() == phase {
        Ok(())
    } else {
        Err(format!("expected {phase}, reached {reached}"))
    }
}

#[then("the invocation ran software-only")]
fn then_software_only(world: &RefCell<LifecycleWorld>) -> StepResult {
    let world = world.borrow();
    let report = world.report()?;
    assert!(report.software_only);
    assert!(report.devices.is_empty());
    Ok(())
}

#[then("the PBX is still running without its channel module")]
fn then_pbx_detached(world: &RefCell<LifecycleWorld>) -> StepResult {
    let world = world.borrow();
    let host = world.host()?;
    assert!(host.pbx_running());
    assert!(!host.pbx_has_channel_module());
    Ok(())
}

#[then("the PBX is not running")]
fn then_pbx_stopped(world: &RefCell<LifecycleWorld>) -> StepResult {
    let world = world.borrow();
    assert!(!world.host()?.pbx_running());
    Ok(())
}

#[then("the base module is unloaded")]
fn then_base_unloaded(world: &RefCell<LifecycleWorld>) -> StepResult {
    let world = world.borrow();
    assert!(!world.host()?.is_loaded("dahdi"));
    Ok(())
}

#[then("the invocation fails during \"{phase}\"")]
fn then_fails_during(world: &RefCell<LifecycleWorld>, phase: String) -> StepResult {
    let world = world.borrow();
    let failure = world.failure()?;
    assert_eq!(failure.phase.as_str(), phase, "{failure}");
    Ok(())
}

#[then("the failure is classified as \"{class}\"")]
fn then_failure_class(world: &RefCell<LifecycleWorld>, class: String) -> StepResult {
    let world = world.borrow();
    let failure = world.failure()?;
    assert_eq!(failure.class().to_string(), class, "{failure}");
    Ok(())
}

#[then("no kernel module was loaded")]
fn then_nothing_loaded(world: &RefCell<LifecycleWorld>) -> StepResult {
    let world = world.borrow();
    let loads: Vec<String> = world
        .host()?
        .commands_starting("modprobe")
        .into_iter()
        .filter(|command| !command.starts_with("modprobe -r"))
        .collect();
    assert!(loads.is_empty(), "unexpected loads: {loads:?}");
    Ok(())
}

#[then("the PBX lists {count} channels")]
fn then_pbx_channels(world: &RefCell<LifecycleWorld>, count: usize) -> StepResult {
    let world = world.borrow();
    let channels = world
        .report()?
        .channels
        .as_ref()
        .ok_or("the PBX was not verified")?;
    assert_eq!(channels.numbered.len(), count);
    Ok(())
}

#[scenario(path = "tests/features/lifecycle.feature")]
fn lifecycle(world: RefCell<LifecycleWorld>) -> Result<(), String> {
    let _ = world;
    Ok(())
}

fn parse_intent(command: &str) -> Result<Intent, String> {
    match command {
        "stop" => Ok(Intent::Stop(StopMode::Light)),
        "stop --force" => Ok(Intent::Stop(StopMode::Full)),
        "start" => Ok(Intent::Start),
        "restart" => Ok(Intent::Restart(StopMode::Light)),
        "restart --force" => Ok(Intent::Restart(StopMode::Full)),
        other => Err(format!("unknown command '{other}'")),
    }
}
