//! Command-line interface runtime for the telstack orchestrator.
//!
//! The module owns argument parsing, configuration bootstrapping, telemetry
//! set-up, and rendering. The host the orchestrator drives is supplied by a
//! [`StackBackend`], so the runtime can be exercised from tests without
//! touching real kernel modules or services.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use telstack_config::Config;
use telstack_exec::{CommandRunner, SystemRunner};
use telstack_lifecycle::{HostContext, Intent, Orchestrator, OrchestratorSettings, telemetry};
use tracing::info;

mod cli;
mod config;
mod errors;
mod output;
mod signals;


use cli::{Cli, CliCommand};
pub use cli::{OutputFormat, ResolvedOutputFormat};
use config::{ConfigArgumentSplit, split_config_arguments};
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
pub(crate) use errors::AppError;
use signals::SignalDeferral;

pub(crate) const CLI_TARGET: &str = "telstack_cli";

/// CLI flags recognised by the configuration loader.
///
/// MAINTENANCE: keep in sync with the fields of `telstack_config::Config`.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--log-filter",
    "--log-format",
    "--base-module",
    "--driver-modules",
    "--echocan-modules",
    "--side-effect-modules",
    "--wan-service",
    "--wan-module",
    "--module-tool",
    "--lsmod-tool",
    "--service-tool",
    "--inventory-tool",
    "--genconf-tool",
    "--cfg-tool",
    "--span-tool",
    "--pbx-tool",
    "--pbx-service",
    "--pbx-channel-module",
    "--active-config-path",
    "--span-declaration-path",
    "--scratch-root",
    "--modules-root",
    "--command-timeout-ms",
    "--genconf-timeout-ms",
    "--kill-grace-ms",
    "--pbx-ready-attempts",
    "--pbx-ready-interval-ms",
];

/// Supplies the command runner and host context an invocation drives.
pub trait StackBackend {
    /// Runner executing the host's tools.
    type Runner: CommandRunner;

    /// Runner and host context for `config`.
    fn connect(&self, config: &Config) -> (Self::Runner, HostContext);
}

/// Backend driving the real host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl StackBackend for SystemBackend {
    type Runner = SystemRunner;

    fn connect(&self, config: &Config) -> (SystemRunner, HostContext) {
        (SystemRunner, HostContext::detect(config))
    }
}

/// Bundles the IO streams provided to the CLI runtime.
pub(crate) struct IoStreams<'a, W: Write, E: Write> {
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
    stdout_is_terminal: bool,
}

impl<'a, W: Write, E: Write> IoStreams<'a, W, E> {
    pub(crate) const fn new(stdout: &'a mut W, stderr: &'a mut E, stdout_is_terminal: bool) -> Self {
        Self {
            stdout,
            stderr,
            stdout_is_terminal,
        }
    }
}

struct CliRunner<'a, W: Write, E: Write, L: ConfigLoader, B: StackBackend> {
    io: IoStreams<'a, W, E>,
    loader: &'a L,
    backend: &'a B,
}

impl<W, E, L, B> CliRunner<'_, W, E, L, B>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
    B: StackBackend,
{
    fn run<I>(&mut self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        let split = split_config_arguments(&args);
        let cli_arguments = prepare_cli_arguments(&args, &split);

        let result = Cli::try_parse_from(cli_arguments)
            .map_err(AppError::CliUsage)
            .and_then(|cli| {
                self.loader
                    .load(&split.config_arguments)
                    .map(|config| (cli, config))
            })
            .and_then(|(cli, config)| self.dispatch(&cli, &config));

        match result {
            Ok(exit_code) => exit_code,
            Err(AppError::CliUsage(error)) if !error.use_stderr() => {
                let _ = write!(self.io.stdout, "{}", error.render());
                AppError::CliUsage(error).exit_code()
            }
            Err(error) => {
                let _ = writeln!(self.io.stderr, "{error}");
                error.exit_code()
            }
        }
    }

    fn dispatch(&mut self, cli: &Cli, config: &Config) -> Result<ExitCode, AppError> {
        config.validate()?;
        telemetry::initialise(config)?;
        let format = cli.output.resolve(self.io.stdout_is_terminal);
        let (runner, host) = self.backend.connect(config);
        let orchestrator = Orchestrator::new(runner, OrchestratorSettings::from_config(config, host));

        if let Some(intent) = cli.command.intent() {
            return self.execute(&orchestrator, intent, format);
        }
        match cli.command {
            CliCommand::Status => {
                let status = orchestrator.status()?;
                output::write_status(self.io.stdout, &status, format)?;
                Ok(ExitCode::SUCCESS)
            }
            _ => {
                let report = orchestrator.check()?;
                output::write_check(self.io.stdout, &report, format)?;
                Ok(if report.reconciliation.is_dangerous() {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                })
            }
        }
    }

    fn execute(
        &mut self,
        orchestrator: &Orchestrator<B::Runner>,
        intent: Intent,
        format: ResolvedOutputFormat,
    ) -> Result<ExitCode, AppError> {
        let deferral = SignalDeferral::install().map_err(AppError::Signals)?;
        let outcome = orchestrator.execute(intent);
        let deferred = deferral.finish();
        if !deferred.is_empty() {
            writeln!(
                self.io.stderr,
                "deferred {} termination signal(s) until '{intent}' finished",
                deferred.len()
            )?;
        }

        match outcome {
            Ok(report) => {
                info!(
                    target: CLI_TARGET,
                    intent = %intent,
                    phase = %report.final_phase,
                    "command completed"
                );
                output::write_report(self.io.stdout, &report, format)?;
                Ok(ExitCode::SUCCESS)
            }
            Err(failure) => {
                output::write_failure(self.io.stderr, &failure)?;
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn prepare_cli_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    let mut cli_arguments: Vec<OsString> = Vec::new();
    if let Some(first) = args.first() {
        cli_arguments.push(first.clone());
    }
    if let Some(rest) = args.get(split.command_start..) {
        cli_arguments.extend(rest.iter().cloned());
    }
    cli_arguments
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E, stdout_is_terminal: bool) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let io = IoStreams::new(stdout, stderr, stdout_is_terminal);
    run_with_loader(args, io, &OrthoConfigLoader, &SystemBackend)
}

/// Runs the CLI with a custom configuration loader and backend.
pub(crate) fn run_with_loader<I, W, E, L, B>(
    args: I,
    io: IoStreams<'_, W, E>,
    loader: &L,
    backend: &B,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
    B: StackBackend,
{
    CliRunner {
        io,
        loader,
        backend,
    }
    .run(args)
}
