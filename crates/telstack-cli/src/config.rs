//! Configuration loading helpers for the telstack CLI.
//!
//! Configuration flags must precede the lifecycle command. The split keeps
//! `ortho_config` from seeing the subcommand and keeps clap from seeing the
//! configuration flags.

use std::ffi::{OsStr, OsString};

use ortho_config::OrthoConfig;
use telstack_config::Config;

use crate::{AppError, CONFIG_CLI_FLAGS};

/// Source of the layered configuration.
pub(crate) trait ConfigLoader {
    /// Loads configuration from the program name and configuration flags.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

/// Loader layering defaults, files, environment, and flags.
pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

/// Arguments a leading token claims when it is a configuration flag: the
/// flag itself plus a separate value unless written as `--flag=value`.
fn config_flag_width(argument: &OsStr) -> Option<usize> {
    let text = argument.to_str()?;
    let (flag, inline_value) = text
        .split_once('=')
        .map_or((text, false), |(flag, _)| (flag, true));
    CONFIG_CLI_FLAGS
        .contains(&flag)
        .then_some(if inline_value { 1 } else { 2 })
}

/// Leading configuration flags, and the index where the command begins.
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) command_start: usize,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    if args.is_empty() {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            command_start: 0,
        };
    }

    let mut command_start = 1;
    while let Some(width) = args
        .get(command_start)
        .and_then(|argument| config_flag_width(argument))
    {
        command_start = (command_start + width).min(args.len());
    }

    ConfigArgumentSplit {
        config_arguments: args.iter().take(command_start).cloned().collect(),
        command_start,
    }
}
