//! Span assignment: binding discovered cards to logical trunk slots.
//!
//! The policy is decided once per run from the host: an administrator span
//! declaration makes assignment [`SpanPolicy::Manual`], its absence makes it
//! [`SpanPolicy::Auto`]. Resolution is a pure function of the device list and
//! the policy, so repeating it with the same inputs yields the same plan.

mod declaration;

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::discovery::HardwareDevice;
use crate::host::{HostContext, HostError};

pub use self::declaration::{DeclarationEntry, DeclarationError, SpanDeclaration};
use self::declaration::device_key;

const SPANS_TARGET: &str = "telstack_lifecycle::spans";

/// Origin of a span assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanSource {
    /// Assigned in discovery order.
    Auto,
    /// Taken from the administrator declaration.
    Manual,
}

impl fmt::Display for SpanSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        })
    }
}

/// Binding of one logical slot to one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanAssignment {
    /// Logical slot, starting at 1.
    pub slot_index: u32,
    /// Bus address of the bound device.
    pub device_ref: String,
    /// Where the binding came from.
    pub source: SpanSource,
    /// First channel number, when declared.
    pub base_channel: Option<u32>,
}

/// Assignment policy for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanPolicy {
    /// Slots follow discovery order.
    Auto,
    /// The declaration is authoritative.
    Manual(SpanDeclaration),
}

/// Errors reading the policy from the host.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PolicyError {
    /// The declaration file could not be read.
    #[error(transparent)]
    Host(#[from] HostError),
    /// The declaration file is malformed.
    #[error(transparent)]
    Declaration(#[from] DeclarationError),
}

impl SpanPolicy {
    /// Reads the policy: `Manual` when the declaration file exists.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`] when the declaration exists but cannot be
    /// read or parsed.
    pub fn load(host: &HostContext) -> Result<Self, PolicyError> {
        match host.read_span_declaration()? {
            Some(text) => {
                let declaration = SpanDeclaration::parse(&text)?;
                info!(
                    target: SPANS_TARGET,
                    path = %host.span_declaration_path(),
                    entries = declaration.entries().len(),
                    "span declaration found; using manual assignment"
                );
                Ok(Self::Manual(declaration))
            }
            None => Ok(Self::Auto),
        }
    }

    /// Source recorded on assignments made under this policy.
    #[must_use]
    pub const fn source(&self) -> SpanSource {
        match self {
            Self::Auto => SpanSource::Auto,
            Self::Manual(_) => SpanSource::Manual,
        }
    }
}

/// Outcome of span resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanPlan {
    /// Policy the plan was resolved under.
    pub source: SpanSource,
    /// Assignments ordered by slot.
    pub assignments: Vec<SpanAssignment>,
    /// Bus addresses of discovered devices left without a slot.
    pub unassigned: Vec<String>,
    /// Conditions that make the run eligible for benign drift.
    pub warnings: Vec<String>,
    /// Informational notes that do not affect classification.
    pub advisories: Vec<String>,
}

impl SpanPlan {
    /// Records each device's slot on the device itself.
    pub fn annotate(&self, devices: &mut [HardwareDevice]) {
        for assignment in &self.assignments {
            if let Some(device) = devices
                .iter_mut()
                .find(|device| device.bus_address() == assignment.device_ref)
            {
                device.assign_span(assignment.slot_index);
            }
        }
    }

    /// Whether nothing was assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Resolves span assignments for `devices` under `policy`.
#[must_use]
pub fn resolve(devices: &[HardwareDevice], policy: &SpanPolicy) -> SpanPlan {
    let plan = match policy {
        SpanPolicy::Auto => resolve_auto(devices),
        SpanPolicy::Manual(declaration) => resolve_manual(devices, declaration),
    };
    for warning in &plan.warnings {
        warn!(target: SPANS_TARGET, %warning, "span assignment warning");
    }
    for advisory in &plan.advisories {
        info!(target: SPANS_TARGET, %advisory, "span assignment advisory");
    }
    plan
}

fn resolve_auto(devices: &[HardwareDevice]) -> SpanPlan {
    let assignments = (1..)
        .zip(devices)
        .map(|(slot_index, device)| SpanAssignment {
            slot_index,
            device_ref: device.bus_address().to_owned(),
            source: SpanSource::Auto,
            base_channel: None,
        })
        .collect();
    let advisories = if devices.len() > 1 {
        vec![format!(
            "{} devices assigned in discovery order; slot order is not guaranteed stable across reboots",
            devices.len()
        )]
    } else {
        Vec::new()
    };
    SpanPlan {
        source: SpanSource::Auto,
        assignments,
        unassigned: Vec::new(),
        warnings: Vec::new(),
        advisories,
    }
}

fn resolve_manual(devices: &[HardwareDevice], declaration: &SpanDeclaration) -> SpanPlan {
    let mut entries: Vec<&DeclarationEntry> = declaration.entries().iter().collect();
    entries.sort_by_key(|entry| entry.slot);

    let mut assignments = Vec::new();
    let mut warnings = Vec::new();
    for entry in entries {
        let wanted = device_key(&entry.device_ref);
        match devices
            .iter()
            .find(|device| device_key(device.bus_address()) == wanted)
        {
            Some(device) => assignments.push(SpanAssignment {
                slot_index: entry.slot,
                device_ref: device.bus_address().to_owned(),
                source: SpanSource::Manual,
                base_channel: Some(entry.base_channel),
            }),
            None => warnings.push(format!(
                "declared device '{}' for slot {} was not discovered",
                entry.device_ref, entry.slot
            )),
        }
    }

    let unassigned: Vec<String> = devices
        .iter()
        .map(HardwareDevice::bus_address)
        .filter(|address| {
            !assignments
                .iter()
                .any(|assignment| assignment.device_ref == *address)
        })
        .map(str::to_owned)
        .collect();
    warnings.extend(
        unassigned
            .iter()
            .map(|address| format!("device '{address}' is not in the span declaration and stays unassigned")),
    );

    SpanPlan {
        source: SpanSource::Manual,
        assignments,
        unassigned,
        warnings,
        advisories: Vec::new(),
    }
}
