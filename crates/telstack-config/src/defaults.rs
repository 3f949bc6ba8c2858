use std::time::Duration;

use crate::logging::LogFormat;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Base hardware abstraction module.
pub const DEFAULT_BASE_MODULE: &str = "dahdi";

/// Hardware driver modules layered directly on the base module.
pub const DEFAULT_DRIVER_MODULES: &[&str] = &[
    "wct4xxp",
    "wcte13xp",
    "wcte43x",
    "wctdm24xxp",
    "wcaxx",
    "wcb4xxp",
    "wcfxo",
    "wctdm",
    "xpp_usb",
];

/// Software echo canceller modules.
pub const DEFAULT_ECHOCAN_MODULES: &[&str] = &["dahdi_echocan_mg2", "dahdi_echocan_oslec"];

/// Helper modules that are loaded and removed only as a side effect of a
/// hardware driver.
pub const DEFAULT_SIDE_EFFECT_MODULES: &[&str] = &["dahdi_voicebus", "dahdi_vpmadt032_loader"];

/// Service unit driving the proprietary WAN stack.
pub const DEFAULT_WAN_SERVICE: &str = "wanrouter";

/// Kernel object of the proprietary WAN stack.
pub const DEFAULT_WAN_MODULE: &str = "wanpipe";

/// Module control tool used to load and remove kernel modules.
pub const DEFAULT_MODULE_TOOL: &str = "modprobe";

/// Tool listing loaded kernel modules.
pub const DEFAULT_LSMOD_TOOL: &str = "lsmod";

/// Service control tool.
pub const DEFAULT_SERVICE_TOOL: &str = "service";

/// Hardware inventory tool.
pub const DEFAULT_INVENTORY_TOOL: &str = "dahdi_hardware";

/// Channel configuration generator.
pub const DEFAULT_GENCONF_TOOL: &str = "dahdi_genconf";

/// Tool applying the channel configuration to the kernel.
pub const DEFAULT_CFG_TOOL: &str = "dahdi_cfg";

/// Tool applying span assignments to the kernel.
pub const DEFAULT_SPAN_TOOL: &str = "dahdi_span_assignments";

/// PBX binary used as the remote console client.
pub const DEFAULT_PBX_TOOL: &str = "asterisk";

/// Service unit running the PBX.
pub const DEFAULT_PBX_SERVICE: &str = "asterisk";

/// PBX module consuming hardware channels.
pub const DEFAULT_PBX_CHANNEL_MODULE: &str = "chan_dahdi.so";

/// Active channel configuration consumed by the configuration tool.
pub const DEFAULT_ACTIVE_CONFIG_PATH: &str = "/etc/dahdi/system.conf";

/// Administrator span declaration; its presence selects manual assignment.
pub const DEFAULT_SPAN_DECLARATION_PATH: &str = "/etc/dahdi/assigned-spans.conf";

/// Directory under which scratch generation directories are created.
pub const DEFAULT_SCRATCH_ROOT: &str = "/var/tmp";

/// Root of the installed kernel module trees.
pub const DEFAULT_MODULES_ROOT: &str = "/lib/modules";

/// Bound applied to ordinary tool invocations.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound applied to each configuration generator attempt.
pub const DEFAULT_GENCONF_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between `SIGTERM` and `SIGKILL` for a timed-out tool.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Number of console polls while waiting for a freshly started PBX.
pub const DEFAULT_PBX_READY_ATTEMPTS: u32 = 10;

/// Pause between PBX console polls.
pub const DEFAULT_PBX_READY_INTERVAL: Duration = Duration::from_secs(1);

/// Default log filter expression used by the binary.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binary.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}
