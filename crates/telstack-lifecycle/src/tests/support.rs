//! Scripted host used by the orchestrator tests.
//!
//! [`FakeHost`] answers every tool the orchestrator runs and keeps just
//! enough kernel, service, and PBX state for the answers to stay consistent:
//! modules hold their dependencies, `modprobe -r` refuses modules in use and
//! drops dependencies nothing else needs, and the PBX holds the base module
//! while its channel module is loaded.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use camino::Utf8PathBuf;
use telstack_config::Config;
use telstack_exec::{CommandOutput, CommandRequest, CommandRunner, ExecError};
use tempfile::TempDir;

use crate::host::HostContext;
use crate::orchestrator::OrchestratorSettings;
use crate::reconcile::GENERATOR_OUTPUT_ENV;

/// One T1 card worth of channel configuration.
pub(crate) const T1_CONFIG: &str = "\
# Span 1: TE2/0/1 \"T2XXP (PCI) Card 0 Span 1\"
span=1,1,0,esf,b8zs
bchan=1-23
dchan=24
echocanceller=mg2,1-23

loadzone = us
defaultzone = us
";

/// Inventory record of the T1 card.
pub(crate) const T1_CARD: &str = "pci:0000:04:00.0     wct4xxp-     d161:0205 Wildcard TE205P\n";

/// Inventory record of an analogue card.
pub(crate) const ANALOGUE_CARD: &str =
    "pci:0000:05:01.0     wctdm24xxp+  d161:8005 Wildcard TDM410P\n";

const PBX_SERVICE: &str = "asterisk";
const CHANNEL_MODULE: &str = "chan_dahdi.so";
const BASE_MODULE: &str = "dahdi";

#[derive(Debug, Default)]
struct Pbx {
    running: bool,
    channel_module: bool,
    refuses_unload: bool,
    unanswered_polls: u32,
}

#[derive(Debug, Default)]
struct State {
    catalogue: BTreeMap<String, Vec<String>>,
    loaded: BTreeSet<String>,
    foreign_holders: BTreeMap<String, String>,
    stubborn: BTreeSet<String>,
    services: BTreeMap<String, bool>,
    pbx: Option<Pbx>,
    inventory: Option<String>,
    generator_hangs: u32,
    lsmod_hangs: u32,
    generated: String,
    channels: Vec<u32>,
    log: Vec<String>,
}

/// In-memory host answering the telephony tools.
#[derive(Debug)]
pub(crate) struct FakeHost {
    state: RefCell<State>,
}

impl FakeHost {
    /// A host with the DAHDI modules installed, nothing loaded, a stopped PBX,
    /// and no telephony hardware.
    pub(crate) fn new() -> Self {
        let catalogue = [
            ("dahdi", &[][..]),
            ("dahdi_echocan_mg2", &["dahdi"][..]),
            ("dahdi_voicebus", &[][..]),
            ("wct4xxp", &["dahdi"][..]),
            ("wctdm24xxp", &["dahdi", "dahdi_voicebus"][..]),
            ("wanpipe", &["dahdi"][..]),
        ]
        .into_iter()
        .map(|(name, needs)| {
            (
                name.to_owned(),
                needs.iter().map(|need| (*need).to_owned()).collect(),
            )
        })
        .collect();
        Self {
            state: RefCell::new(State {
                catalogue,
                pbx: Some(Pbx::default()),
                inventory: Some(String::new()),
                ..State::default()
            }),
        }
    }

    /// Attached hardware as printed by the inventory tool.
    pub(crate) fn with_inventory(self, records: &str) -> Self {
        self.state.borrow_mut().inventory = Some(records.to_owned());
        self
    }

    /// Removes the inventory tool.
    pub(crate) fn without_inventory_tool(self) -> Self {
        self.state.borrow_mut().inventory = None;
        self
    }

    /// Configuration the generator writes.
    pub(crate) fn generating(self, config: &str) -> Self {
        self.state.borrow_mut().generated = config.to_owned();
        self
    }

    /// Makes the next `count` generator runs hang.
    pub(crate) fn generator_hangs(self, count: u32) -> Self {
        self.state.borrow_mut().generator_hangs = count;
        self
    }

    /// Makes the next `count` module listings hang.
    pub(crate) fn lsmod_hangs(self, count: u32) -> Self {
        self.state.borrow_mut().lsmod_hangs = count;
        self
    }

    /// Loads `modules` and their dependencies.
    pub(crate) fn with_loaded(self, modules: &[&str]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            for module in modules {
                state.insert_module(module);
            }
        }
        self
    }

    /// Makes `holder`, a module this stack does not manage, hold `module`.
    pub(crate) fn with_foreign_holder(self, module: &str, holder: &str) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.loaded.insert(holder.to_owned());
            state
                .foreign_holders
                .insert(module.to_owned(), holder.to_owned());
        }
        self
    }

    /// Makes `modprobe -r module` report success without removing it.
    pub(crate) fn with_stubborn(self, module: &str) -> Self {
        self.state.borrow_mut().stubborn.insert(module.to_owned());
        self
    }

    /// Installs the service `unit`.
    pub(crate) fn with_service(self, unit: &str, running: bool) -> Self {
        self.state
            .borrow_mut()
            .services
            .insert(unit.to_owned(), running);
        self
    }

    /// A PBX running with its channel module loaded.
    pub(crate) fn with_running_pbx(self) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.pbx = Some(Pbx {
                running: true,
                channel_module: true,
                ..Pbx::default()
            });
        }
        self
    }

    /// Removes the PBX from the host.
    pub(crate) fn without_pbx(self) -> Self {
        self.state.borrow_mut().pbx = None;
        self
    }

    /// Makes the PBX refuse to unload its channel module.
    pub(crate) fn pbx_refuses_unload(self) -> Self {
        if let Some(pbx) = self.state.borrow_mut().pbx.as_mut() {
            pbx.refuses_unload = true;
        }
        self
    }

    /// Makes the PBX console ignore the first `polls` reachability checks.
    pub(crate) fn pbx_slow_to_answer(self, polls: u32) -> Self {
        if let Some(pbx) = self.state.borrow_mut().pbx.as_mut() {
            pbx.unanswered_polls = polls;
        }
        self
    }

    /// Channels the PBX lists while its channel module is loaded.
    pub(crate) fn with_channels(self, channels: impl IntoIterator<Item = u32>) -> Self {
        self.state.borrow_mut().channels = channels.into_iter().collect();
        self
    }

    /// A running single-card stack: base, echo canceller, the analogue driver,
    /// and a PBX using them.
    pub(crate) fn running_stack() -> Self {
        Self::new()
            .with_inventory(ANALOGUE_CARD)
            .with_loaded(&["dahdi", "dahdi_echocan_mg2", "wctdm24xxp"])
            .with_running_pbx()
            .with_channels(1..=4)
    }

    /// Commands run so far, rendered.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    /// Commands run so far that start with `prefix`.
    pub(crate) fn commands_starting(&self, prefix: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|command| command.starts_with(prefix))
            .collect()
    }

    /// Whether `module` is loaded.
    pub(crate) fn is_loaded(&self, module: &str) -> bool {
        self.state.borrow().loaded.contains(module)
    }

    /// Whether the PBX process is running.
    pub(crate) fn pbx_running(&self) -> bool {
        self.state
            .borrow()
            .pbx
            .as_ref()
            .is_some_and(|pbx| pbx.running)
    }

    /// Whether the PBX has its channel module loaded.
    pub(crate) fn pbx_has_channel_module(&self) -> bool {
        self.state
            .borrow()
            .pbx
            .as_ref()
            .is_some_and(|pbx| pbx.running && pbx.channel_module)
    }
}

impl State {
    fn insert_module(&mut self, module: &str) {
        let needs = self.catalogue.get(module).cloned().unwrap_or_default();
        for need in &needs {
            self.insert_module(need);
        }
        self.loaded.insert(module.to_owned());
    }

    fn holders(&self, module: &str) -> Vec<String> {
        let mut holders: Vec<String> = self
            .loaded
            .iter()
            .filter(|candidate| {
                self.catalogue
                    .get(*candidate)
                    .is_some_and(|needs| needs.iter().any(|need| need == module))
            })
            .cloned()
            .collect();
        if let Some(holder) = self.foreign_holders.get(module) {
            holders.push(holder.clone());
        }
        holders
    }

    fn pbx_holds_base(&self) -> bool {
        self.pbx
            .as_ref()
            .is_some_and(|pbx| pbx.running && pbx.channel_module)
    }

    fn lsmod(&self) -> String {
        let mut listing = String::from("Module                  Size  Used by\n");
        for module in &self.loaded {
            let holders = self.holders(module);
            let extra = u32::from(module == BASE_MODULE && self.pbx_holds_base());
            let count = u32::try_from(holders.len()).unwrap_or(u32::MAX) + extra;
            if holders.is_empty() {
                listing.push_str(&format!("{module:<24} 16384  {count}\n"));
            } else {
                listing.push_str(&format!(
                    "{module:<24} 16384  {count} {},\n",
                    holders.join(",")
                ));
            }
        }
        listing
    }

    fn modprobe(&mut self, args: &[String]) -> CommandOutput {
        match args {
            [flag, module] if flag == "-r" => self.remove(module),
            [module] => {
                if !self.catalogue.contains_key(module) {
                    return CommandOutput::exited(1, "").with_stderr(format!(
                        "modprobe: FATAL: Module {module} not found in directory /lib/modules/6.1.0-test\n"
                    ));
                }
                self.insert_module(module);
                CommandOutput::exited(0, "")
            }
            _ => CommandOutput::exited(1, "").with_stderr("modprobe: bad usage\n"),
        }
    }

    fn remove(&mut self, module: &str) -> CommandOutput {
        if !self.loaded.contains(module) {
            return CommandOutput::exited(1, "").with_stderr(format!(
                "modprobe: FATAL: Module {module} is not currently loaded\n"
            ));
        }
        let in_use = !self.holders(module).is_empty()
            || (module == BASE_MODULE && self.pbx_holds_base());
        if in_use {
            return CommandOutput::exited(1, "")
                .with_stderr(format!("modprobe: FATAL: Module {module} is in use.\n"));
        }
        if self.stubborn.contains(module) {
            return CommandOutput::exited(0, "");
        }
        self.loaded.remove(module);
        let needs = self.catalogue.get(module).cloned().unwrap_or_default();
        for need in needs {
            let unused = self.loaded.contains(&need) && self.holders(&need).is_empty();
            if unused && need != BASE_MODULE {
                self.loaded.remove(&need);
            }
        }
        CommandOutput::exited(0, "")
    }

    fn service(&mut self, args: &[String]) -> CommandOutput {
        let [unit, action] = args else {
            return CommandOutput::exited(2, "");
        };
        if unit == PBX_SERVICE {
            return self.pbx_service(action);
        }
        let Some(running) = self.services.get_mut(unit.as_str()) else {
            return CommandOutput::exited(4, "");
        };
        match action.as_str() {
            "status" => CommandOutput::exited(if *running { 0 } else { 3 }, ""),
            "start" => {
                *running = true;
                CommandOutput::exited(0, "")
            }
            "stop" => {
                *running = false;
                CommandOutput::exited(0, "")
            }
            _ => CommandOutput::exited(2, ""),
        }
    }

    fn pbx_service(&mut self, action: &str) -> CommandOutput {
        let base_loaded = self.loaded.contains(BASE_MODULE);
        let Some(pbx) = self.pbx.as_mut() else {
            return CommandOutput::exited(4, "");
        };
        match action {
            "status" => CommandOutput::exited(if pbx.running { 0 } else { 3 }, ""),
            "start" => {
                pbx.running = true;
                pbx.channel_module = base_loaded;
                CommandOutput::exited(0, "")
            }
            "stop" => {
                pbx.running = false;
                pbx.channel_module = false;
                CommandOutput::exited(0, "")
            }
            _ => CommandOutput::exited(2, ""),
        }
    }

    fn console(&mut self, command: &str) -> CommandOutput {
        let channels = self.channels.clone();
        let Some(pbx) = self.pbx.as_mut().filter(|pbx| pbx.running) else {
            return CommandOutput::exited(1, "Unable to connect to remote asterisk (does /var/run/asterisk/asterisk.ctl exist?)\n");
        };
        let module_command = |verb: &str| format!("module {verb} {CHANNEL_MODULE}");
        if command == "core show version" {
            if pbx.unanswered_polls > 0 {
                pbx.unanswered_polls -= 1;
                return CommandOutput::exited(
                    1,
                    "Unable to connect to remote asterisk (does /var/run/asterisk/asterisk.ctl exist?)\n",
                );
            }
            CommandOutput::exited(0, "Asterisk 18.20.0 built by root @ pbx\n")
        } else if command == format!("module show like {CHANNEL_MODULE}") {
            let row = if pbx.channel_module {
                format!("{CHANNEL_MODULE:<31}DAHDI Telephony    0    Running\n1 modules loaded\n")
            } else {
                "0 modules loaded\n".to_owned()
            };
            CommandOutput::exited(0, format!("Module                         Description    Use Count  Status\n{row}"))
        } else if command == module_command("unload") {
            if pbx.refuses_unload {
                return CommandOutput::exited(0, format!("Unable to unload resource {CHANNEL_MODULE}\n"));
            }
            pbx.channel_module = false;
            CommandOutput::exited(0, format!("Unloaded {CHANNEL_MODULE}\n"))
        } else if command == module_command("load") {
            pbx.channel_module = true;
            CommandOutput::exited(0, format!("Loaded {CHANNEL_MODULE}\n"))
        } else if command == "dahdi show channels" {
            if !pbx.channel_module {
                return CommandOutput::exited(0, "No such command 'dahdi show channels'\n");
            }
            let mut listing = String::from("   Chan Extension  Context         Language   MOH Interpret        Blocked    State\n");
            listing.push_str(" pseudo            default                    default                         In Service\n");
            for channel in channels {
                listing.push_str(&format!("{channel:>7}            from-pstn                  default                         In Service\n"));
            }
            CommandOutput::exited(0, listing)
        } else {
            CommandOutput::exited(0, format!("No such command '{command}'\n"))
        }
    }

    fn genconf(&mut self, request: &CommandRequest) -> CommandOutput {
        if self.generator_hangs > 0 {
            self.generator_hangs -= 1;
            return CommandOutput::killed_after(request.timeout().unwrap_or_default());
        }
        let Some(target) = request.env_value(GENERATOR_OUTPUT_ENV) else {
            return CommandOutput::exited(1, "").with_stderr("no output file\n");
        };
        match fs::write(target, &self.generated) {
            Ok(()) => CommandOutput::exited(0, ""),
            Err(error) => CommandOutput::exited(1, "").with_stderr(error.to_string()),
        }
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, request: &CommandRequest) -> Result<CommandOutput, ExecError> {
        let mut state = self.state.borrow_mut();
        state.log.push(request.to_string());
        let args = request.arguments();
        let output = match request.program() {
            "lsmod" if state.lsmod_hangs > 0 => {
                state.lsmod_hangs -= 1;
                CommandOutput::killed_after(request.timeout().unwrap_or_default())
            }
            "lsmod" => CommandOutput::exited(0, state.lsmod()),
            "modprobe" => state.modprobe(args),
            "service" => state.service(args),
            "asterisk" => match args {
                [flag, command] if flag == "-rx" => state.console(command),
                _ => CommandOutput::exited(1, ""),
            },
            "dahdi_hardware" => match &state.inventory {
                Some(records) => CommandOutput::exited(0, records.clone()),
                None => return Err(missing(request)),
            },
            "dahdi_genconf" => state.genconf(request),
            "dahdi_span_assignments" | "dahdi_cfg" => CommandOutput::exited(0, ""),
            _ => return Err(missing(request)),
        };
        Ok(output)
    }
}

fn missing(request: &CommandRequest) -> ExecError {
    ExecError::ToolMissing {
        program: request.program().to_owned(),
    }
}

/// Temporary host paths plus orchestrator settings pointing at them.
pub(crate) struct HostFixture {
    _dir: TempDir,
    root: Utf8PathBuf,
    pub(crate) settings: OrchestratorSettings,
}

impl HostFixture {
    /// Settings for a stack with two hardware drivers, one echo canceller, a
    /// side-effect helper, and the WAN stack.
    pub(crate) fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 path");
        let scratch = root.join("scratch");
        fs::create_dir_all(&scratch).expect("scratch dir");
        let config = Config {
            driver_modules: Some("wct4xxp,wctdm24xxp".to_owned()),
            echocan_modules: Some("dahdi_echocan_mg2".to_owned()),
            side_effect_modules: Some("dahdi_voicebus".to_owned()),
            pbx_ready_interval_ms: Some(1),
            pbx_ready_attempts: Some(3),
            ..Config::default()
        };
        let host = HostContext::from_config(&config, None)
            .with_active_config_path(root.join("system.conf"))
            .with_span_declaration_path(root.join("assigned-spans.conf"))
            .with_scratch_root(scratch)
            .with_modules_root(root.join("modules"));
        let settings = OrchestratorSettings::from_config(&config, host);
        Self {
            _dir: dir,
            root,
            settings,
        }
    }

    /// Writes the active channel configuration.
    pub(crate) fn with_active_config(self, text: &str) -> Self {
        self.write("system.conf", text);
        self
    }

    /// Writes the span declaration.
    pub(crate) fn with_span_declaration(self, text: &str) -> Self {
        self.write("assigned-spans.conf", text);
        self
    }

    fn write(&self, name: &str, text: &str) {
        fs::write(self.root.join(name), text).expect("write host file");
    }

    /// Reads the active channel configuration.
    pub(crate) fn active_config(&self) -> String {
        fs::read_to_string(self.root.join("system.conf")).unwrap_or_default()
    }

    /// Entries left in the scratch directory.
    pub(crate) fn scratch_entries(&self) -> usize {
        fs::read_dir(self.root.join("scratch"))
            .map(Iterator::count)
            .unwrap_or_default()
    }
}
