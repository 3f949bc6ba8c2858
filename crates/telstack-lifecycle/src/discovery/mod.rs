//! Hardware discovery through the inventory tool.
//!
//! The inventory tool prints one record per attached card:
//!
//! ```text
//! pci:0000:04:01.0     wctdm24xxp+  d161:8005 Wildcard TDM410P
//! usb:004/006          xpp_usb+     e4e4:1152 Astribank-multi FPGA-firmware
//! ```
//!
//! The second column names the driver the tool associates with the card,
//! suffixed `+` when it is loaded and `-` when it is not. Empty output means
//! no telephony hardware, which is a valid software-only host.

mod signatures;

use std::collections::BTreeSet;

use serde::Serialize;
use telstack_exec::{CommandRunner, ExecError};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::FailureClass;
use crate::host::{HostContext, normalise_module_name};
use crate::tools::{ToolSet, run_bounded};

const DISCOVERY_TARGET: &str = "telstack_lifecycle::discovery";

/// A physical telephony card found during one discovery pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HardwareDevice {
    bus_address: String,
    vendor_device: String,
    description: String,
    driver_candidates: Vec<String>,
    driver_loaded: bool,
    span: Option<u32>,
}

impl HardwareDevice {
    /// Builds a device record.
    #[must_use]
    pub fn new(
        bus_address: impl Into<String>,
        vendor_device: impl Into<String>,
        description: impl Into<String>,
        driver_candidates: Vec<String>,
    ) -> Self {
        Self {
            bus_address: bus_address.into(),
            vendor_device: vendor_device.into(),
            description: description.into(),
            driver_candidates,
            driver_loaded: false,
            span: None,
        }
    }

    /// Bus address as printed by the inventory tool.
    #[must_use]
    pub fn bus_address(&self) -> &str {
        &self.bus_address
    }

    /// `vendor:device` identifier.
    #[must_use]
    pub fn vendor_device(&self) -> &str {
        &self.vendor_device
    }

    /// Human-readable card name.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Driver modules to try, in preference order.
    #[must_use]
    pub fn driver_candidates(&self) -> &[String] {
        &self.driver_candidates
    }

    /// Whether the inventory tool reported the driver as loaded.
    #[must_use]
    pub const fn driver_loaded(&self) -> bool {
        self.driver_loaded
    }

    /// Slot assigned by span resolution.
    #[must_use]
    pub const fn span(&self) -> Option<u32> {
        self.span
    }

    /// Records the slot assigned to the device.
    pub fn assign_span(&mut self, slot: u32) {
        self.span = Some(slot);
    }
}

/// Discovery failures. All of them leave the orchestrator free to continue
/// without hardware.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    /// The inventory tool is not installed.
    #[error("hardware inventory tool '{tool}' is not available")]
    ToolUnavailable {
        /// Inventory tool.
        tool: String,
    },
    /// The inventory tool could not run, crashed, or exited non-zero.
    #[error("hardware inventory tool failed: {reason}")]
    ToolFailed {
        /// What went wrong.
        reason: String,
    },
    /// The inventory tool hung and was killed.
    #[error("hardware inventory tool '{tool}' timed out")]
    TimedOut {
        /// Inventory tool.
        tool: String,
    },
    /// A record did not match the inventory format.
    #[error("malformed hardware record '{line}': {reason}")]
    MalformedRecord {
        /// Offending line.
        line: String,
        /// What was wrong with it.
        reason: &'static str,
    },
}

impl DiscoveryError {
    /// Failure class of the error.
    #[must_use]
    pub const fn class(&self) -> FailureClass {
        FailureClass::Degradable
    }
}

/// Lists the telephony hardware attached to the host.
///
/// Driver candidates are the inventory tool's own choice followed by the
/// signature table's matches. When the host's module index is readable,
/// candidates without a module for the running kernel are dropped unless that
/// would leave none.
///
/// # Errors
///
/// Returns a [`DiscoveryError`] when the inventory tool is missing, fails, or
/// prints records that cannot be parsed.
pub fn discover<R: CommandRunner + ?Sized>(
    runner: &R,
    tools: &ToolSet,
    host: &HostContext,
) -> Result<Vec<HardwareDevice>, DiscoveryError> {
    let request = tools.request(&tools.inventory);
    let output = run_bounded(runner, &request).map_err(|error| match error {
        crate::tools::ToolError::Exec(ExecError::ToolMissing { program }) => {
            DiscoveryError::ToolUnavailable { tool: program }
        }
        crate::tools::ToolError::TimedOut { .. } => DiscoveryError::TimedOut {
            tool: tools.inventory.clone(),
        },
        other => DiscoveryError::ToolFailed {
            reason: other.to_string(),
        },
    })?;
    if !output.success() {
        return Err(DiscoveryError::ToolFailed {
            reason: format!(
                "'{request}' exited with {:?}: {}",
                output.exit_code,
                output.stderr_tail(3)
            ),
        });
    }

    let installed = host.installed_modules();
    let devices = parse_inventory(&output.stdout)?
        .into_iter()
        .map(|device| filter_candidates(device, installed.as_ref()))
        .collect::<Vec<_>>();

    info!(
        target: DISCOVERY_TARGET,
        devices = devices.len(),
        "hardware discovery completed"
    );
    for device in &devices {
        debug!(
            target: DISCOVERY_TARGET,
            bus = device.bus_address(),
            id = device.vendor_device(),
            candidates = ?device.driver_candidates(),
            "discovered device"
        );
    }
    Ok(devices)
}

/// Parses inventory output into devices with unfiltered driver candidates.
///
/// # Errors
///
/// Returns [`DiscoveryError::MalformedRecord`] for lines lacking a driver
/// column or a `vendor:device` identifier.
pub fn parse_inventory(text: &str) -> Result<Vec<HardwareDevice>, DiscoveryError> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_record)
        .collect()
}

fn parse_record(line: &str) -> Result<HardwareDevice, DiscoveryError> {
    let malformed = |reason| DiscoveryError::MalformedRecord {
        line: line.trim().to_owned(),
        reason,
    };
    let mut fields = line.split_whitespace();
    let bus = fields.next().ok_or_else(|| malformed("missing bus address"))?;
    let driver_field = fields.next().ok_or_else(|| malformed("missing driver"))?;
    let identifier = fields
        .next()
        .ok_or_else(|| malformed("missing vendor:device identifier"))?;
    let description = fields.collect::<Vec<_>>().join(" ");

    let (vendor, device) = identifier
        .split_once(':')
        .filter(|(vendor, device)| is_hex_id(vendor) && is_hex_id(device))
        .ok_or_else(|| malformed("identifier is not vendor:device"))?;

    let (driver, loaded) = match driver_field.strip_suffix('+') {
        Some(driver) => (driver, true),
        None => (driver_field.strip_suffix('-').unwrap_or(driver_field), false),
    };

    let mut candidates: Vec<String> = Vec::new();
    let mut seen = BTreeSet::new();
    let reported = (!driver.is_empty()).then(|| normalise_module_name(driver));
    let matches = signatures::drivers_for(vendor, device)
        .into_iter()
        .map(normalise_module_name);
    for candidate in reported.into_iter().chain(matches) {
        if seen.insert(candidate.clone()) {
            candidates.push(candidate);
        }
    }

    let mut record = HardwareDevice::new(
        bus,
        format!("{}:{}", vendor.to_ascii_lowercase(), device.to_ascii_lowercase()),
        description,
        candidates,
    );
    record.driver_loaded = loaded;
    Ok(record)
}

fn is_hex_id(text: &str) -> bool {
    text.len() == 4 && text.chars().all(|character| character.is_ascii_hexdigit())
}

fn filter_candidates(
    mut device: HardwareDevice,
    installed: Option<&BTreeSet<String>>,
) -> HardwareDevice {
    let Some(installed) = installed else {
        return device;
    };
    let available: Vec<String> = device
        .driver_candidates
        .iter()
        .filter(|candidate| installed.contains(candidate.as_str()))
        .cloned()
        .collect();
    if !available.is_empty() {
        device.driver_candidates = available;
    }
    device
}
