//! Shared configuration for the telstack orchestrator.
//!
//! Values are layered by `ortho_config`: built-in defaults, then a
//! configuration file (`--config-path` or `TELSTACK_CONFIG_PATH`), then
//! `TELSTACK_*` environment variables, then command-line flags. Every field is
//! optional so an unset layer never masks a lower one; the accessor methods
//! fill in the defaults exported from this crate.

mod defaults;
mod logging;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_ACTIVE_CONFIG_PATH, DEFAULT_BASE_MODULE, DEFAULT_CFG_TOOL, DEFAULT_COMMAND_TIMEOUT,
    DEFAULT_DRIVER_MODULES, DEFAULT_ECHOCAN_MODULES, DEFAULT_GENCONF_TIMEOUT,
    DEFAULT_GENCONF_TOOL, DEFAULT_INVENTORY_TOOL, DEFAULT_KILL_GRACE, DEFAULT_LOG_FILTER,
    DEFAULT_LSMOD_TOOL, DEFAULT_MODULE_TOOL, DEFAULT_MODULES_ROOT, DEFAULT_PBX_CHANNEL_MODULE,
    DEFAULT_PBX_READY_ATTEMPTS, DEFAULT_PBX_READY_INTERVAL, DEFAULT_PBX_SERVICE,
    DEFAULT_PBX_TOOL, DEFAULT_SCRATCH_ROOT, DEFAULT_SERVICE_TOOL, DEFAULT_SIDE_EFFECT_MODULES,
    DEFAULT_SPAN_DECLARATION_PATH, DEFAULT_SPAN_TOOL, DEFAULT_WAN_MODULE, DEFAULT_WAN_SERVICE,
    default_log_filter, default_log_format,
};
pub use logging::LogFormat;

/// Orchestrator configuration.
///
/// Module lists are comma-separated so they can be overridden from a single
/// environment variable or flag. Setting `wan_module` to an empty string
/// disables the WAN stack entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TELSTACK")]
pub struct Config {
    /// Tracing filter directive, for example `info` or `telstack_lifecycle=debug`.
    pub log_filter: Option<String>,
    /// Log output format.
    pub log_format: Option<LogFormat>,
    /// Base hardware abstraction module.
    pub base_module: Option<String>,
    /// Comma-separated hardware driver modules.
    pub driver_modules: Option<String>,
    /// Comma-separated echo canceller modules.
    pub echocan_modules: Option<String>,
    /// Comma-separated modules only ever removed as a side effect of a driver.
    pub side_effect_modules: Option<String>,
    /// Service unit of the proprietary WAN stack.
    pub wan_service: Option<String>,
    /// Kernel object of the proprietary WAN stack; empty disables the stack.
    pub wan_module: Option<String>,
    /// Module control tool.
    pub module_tool: Option<String>,
    /// Loaded module listing tool.
    pub lsmod_tool: Option<String>,
    /// Service control tool.
    pub service_tool: Option<String>,
    /// Hardware inventory tool.
    pub inventory_tool: Option<String>,
    /// Channel configuration generator.
    pub genconf_tool: Option<String>,
    /// Channel configuration apply tool.
    pub cfg_tool: Option<String>,
    /// Span assignment tool.
    pub span_tool: Option<String>,
    /// PBX remote console binary.
    pub pbx_tool: Option<String>,
    /// PBX service unit.
    pub pbx_service: Option<String>,
    /// PBX module consuming hardware channels.
    pub pbx_channel_module: Option<String>,
    /// Active channel configuration file.
    pub active_config_path: Option<Utf8PathBuf>,
    /// Span declaration file.
    pub span_declaration_path: Option<Utf8PathBuf>,
    /// Parent directory for scratch generation output.
    pub scratch_root: Option<Utf8PathBuf>,
    /// Root of the kernel module trees.
    pub modules_root: Option<Utf8PathBuf>,
    /// Timeout for ordinary tool invocations, in milliseconds.
    pub command_timeout_ms: Option<u64>,
    /// Timeout for each generator attempt, in milliseconds.
    pub genconf_timeout_ms: Option<u64>,
    /// Grace interval before a timed-out tool is killed, in milliseconds.
    pub kill_grace_ms: Option<u64>,
    /// Console polls while waiting for the PBX to come up.
    pub pbx_ready_attempts: Option<u32>,
    /// Pause between console polls, in milliseconds.
    pub pbx_ready_interval_ms: Option<u64>,
}

impl Config {
    /// Returns the configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Returns the configured log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Base hardware abstraction module name.
    #[must_use]
    pub fn base_module(&self) -> &str {
        self.base_module.as_deref().unwrap_or(DEFAULT_BASE_MODULE)
    }

    /// Hardware driver modules.
    #[must_use]
    pub fn driver_modules(&self) -> Vec<String> {
        module_list(self.driver_modules.as_deref(), DEFAULT_DRIVER_MODULES)
    }

    /// Echo canceller modules.
    #[must_use]
    pub fn echocan_modules(&self) -> Vec<String> {
        module_list(self.echocan_modules.as_deref(), DEFAULT_ECHOCAN_MODULES)
    }

    /// Side-effect helper modules.
    #[must_use]
    pub fn side_effect_modules(&self) -> Vec<String> {
        module_list(
            self.side_effect_modules.as_deref(),
            DEFAULT_SIDE_EFFECT_MODULES,
        )
    }

    /// WAN service unit and kernel module, or `None` when the stack is
    /// disabled.
    #[must_use]
    pub fn wan_stack(&self) -> Option<(&str, &str)> {
        let module = self.wan_module.as_deref().unwrap_or(DEFAULT_WAN_MODULE).trim();
        if module.is_empty() {
            return None;
        }
        let service = self.wan_service.as_deref().unwrap_or(DEFAULT_WAN_SERVICE).trim();
        Some((service, module))
    }

    /// Module control tool.
    #[must_use]
    pub fn module_tool(&self) -> &str {
        self.module_tool.as_deref().unwrap_or(DEFAULT_MODULE_TOOL)
    }

    /// Loaded module listing tool.
    #[must_use]
    pub fn lsmod_tool(&self) -> &str {
        self.lsmod_tool.as_deref().unwrap_or(DEFAULT_LSMOD_TOOL)
    }

    /// Service control tool.
    #[must_use]
    pub fn service_tool(&self) -> &str {
        self.service_tool.as_deref().unwrap_or(DEFAULT_SERVICE_TOOL)
    }

    /// Hardware inventory tool.
    #[must_use]
    pub fn inventory_tool(&self) -> &str {
        self.inventory_tool
            .as_deref()
            .unwrap_or(DEFAULT_INVENTORY_TOOL)
    }

    /// Channel configuration generator.
    #[must_use]
    pub fn genconf_tool(&self) -> &str {
        self.genconf_tool.as_deref().unwrap_or(DEFAULT_GENCONF_TOOL)
    }

    /// Channel configuration apply tool.
    #[must_use]
    pub fn cfg_tool(&self) -> &str {
        self.cfg_tool.as_deref().unwrap_or(DEFAULT_CFG_TOOL)
    }

    /// Span assignment tool.
    #[must_use]
    pub fn span_tool(&self) -> &str {
        self.span_tool.as_deref().unwrap_or(DEFAULT_SPAN_TOOL)
    }

    /// PBX remote console binary.
    #[must_use]
    pub fn pbx_tool(&self) -> &str {
        self.pbx_tool.as_deref().unwrap_or(DEFAULT_PBX_TOOL)
    }

    /// PBX service unit.
    #[must_use]
    pub fn pbx_service(&self) -> &str {
        self.pbx_service.as_deref().unwrap_or(DEFAULT_PBX_SERVICE)
    }

    /// PBX module consuming hardware channels.
    #[must_use]
    pub fn pbx_channel_module(&self) -> &str {
        self.pbx_channel_module
            .as_deref()
            .unwrap_or(DEFAULT_PBX_CHANNEL_MODULE)
    }

    /// Active channel configuration file.
    #[must_use]
    pub fn active_config_path(&self) -> &Utf8Path {
        path_or(
            self.active_config_path.as_deref(),
            DEFAULT_ACTIVE_CONFIG_PATH,
        )
    }

    /// Span declaration file.
    #[must_use]
    pub fn span_declaration_path(&self) -> &Utf8Path {
        path_or(
            self.span_declaration_path.as_deref(),
            DEFAULT_SPAN_DECLARATION_PATH,
        )
    }

    /// Parent directory for scratch generation output.
    #[must_use]
    pub fn scratch_root(&self) -> &Utf8Path {
        path_or(self.scratch_root.as_deref(), DEFAULT_SCRATCH_ROOT)
    }

    /// Root of the kernel module trees.
    #[must_use]
    pub fn modules_root(&self) -> &Utf8Path {
        path_or(self.modules_root.as_deref(), DEFAULT_MODULES_ROOT)
    }

    /// Timeout for ordinary tool invocations.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        millis_or(self.command_timeout_ms, DEFAULT_COMMAND_TIMEOUT)
    }

    /// Timeout for each generator attempt.
    #[must_use]
    pub fn genconf_timeout(&self) -> Duration {
        millis_or(self.genconf_timeout_ms, DEFAULT_GENCONF_TIMEOUT)
    }

    /// Grace interval before a timed-out tool is killed.
    #[must_use]
    pub fn kill_grace(&self) -> Duration {
        millis_or(self.kill_grace_ms, DEFAULT_KILL_GRACE)
    }

    /// Console polls while waiting for the PBX to come up.
    #[must_use]
    pub fn pbx_ready_attempts(&self) -> u32 {
        self.pbx_ready_attempts
            .unwrap_or(DEFAULT_PBX_READY_ATTEMPTS)
    }

    /// Pause between console polls.
    #[must_use]
    pub fn pbx_ready_interval(&self) -> Duration {
        millis_or(self.pbx_ready_interval_ms, DEFAULT_PBX_READY_INTERVAL)
    }

    /// Rejects values the orchestrator cannot act on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the base module is blank, a timeout is
    /// zero, or the PBX would never be polled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_module().trim().is_empty() {
            return Err(ConfigError::EmptyBaseModule);
        }
        let timeouts = [
            ("command_timeout_ms", self.command_timeout()),
            ("genconf_timeout_ms", self.genconf_timeout()),
        ];
        if let Some(&(field, _)) = timeouts.iter().find(|(_, value)| value.is_zero()) {
            return Err(ConfigError::ZeroTimeout { field });
        }
        if self.pbx_ready_attempts() == 0 {
            return Err(ConfigError::NoReadyAttempts);
        }
        if let Some((service, _)) = self.wan_stack()
            && service.is_empty()
        {
            return Err(ConfigError::EmptyWanService);
        }
        Ok(())
    }
}

/// Semantically invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The base module name is blank.
    #[error("base_module must name a kernel module")]
    EmptyBaseModule,
    /// A timeout was configured as zero.
    #[error("{field} must be greater than zero")]
    ZeroTimeout {
        /// Offending field.
        field: &'static str,
    },
    /// The PBX readiness poll would never run.
    #[error("pbx_ready_attempts must be at least 1")]
    NoReadyAttempts,
    /// The WAN module is enabled without a service unit.
    #[error("wan_service must be set while wan_module is enabled")]
    EmptyWanService,
}

fn module_list(configured: Option<&str>, fallback: &[&str]) -> Vec<String> {
    match configured {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect(),
        None => fallback.iter().map(|name| (*name).to_owned()).collect(),
    }
}

fn path_or<'a>(configured: Option<&'a Utf8Path>, fallback: &'static str) -> &'a Utf8Path {
    configured.unwrap_or_else(|| Utf8Path::new(fallback))
}

fn millis_or(configured: Option<u64>, fallback: Duration) -> Duration {
    configured.map_or(fallback, Duration::from_millis)
}
