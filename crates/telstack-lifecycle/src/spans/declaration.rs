//! Administrator span declarations (`assigned-spans.conf`).
//!
//! Each non-comment line binds one device to a slot:
//!
//! ```text
//! # <device-ref>        <local-span>:<slot>:<base-channel>
//! pci:0000:04:00.0      1:1:1
//! /sys/devices/pci0000:00/0000:00:1e.0/0000:05:00.0 1:2:32
//! ```

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

/// One declared device binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclarationEntry {
    /// Device reference as written by the administrator.
    pub device_ref: String,
    /// Span number local to the device.
    pub local_span: u32,
    /// Logical slot the span is bound to.
    pub slot: u32,
    /// First channel number of the span.
    pub base_channel: u32,
}

/// Parsed span declaration, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpanDeclaration {
    entries: Vec<DeclarationEntry>,
}

impl SpanDeclaration {
    /// Parses declaration text.
    ///
    /// # Errors
    ///
    /// Returns a [`DeclarationError`] for lines that are not
    /// `<device-ref> <local-span>:<slot>:<base-channel>`, for slot zero, and
    /// for a slot or device declared twice.
    pub fn parse(text: &str) -> Result<Self, DeclarationError> {
        let mut entries = Vec::new();
        let mut slots = BTreeSet::new();
        let mut devices = BTreeSet::new();
        for (index, raw) in text.lines().enumerate() {
            let line_number = index + 1;
            let content = raw.split_once('#').map_or(raw, |(before, _)| before).trim();
            if content.is_empty() {
                continue;
            }
            let entry = parse_entry(line_number, content)?;
            if !slots.insert(entry.slot) {
                return Err(DeclarationError::DuplicateSlot {
                    line: line_number,
                    slot: entry.slot,
                });
            }
            if !devices.insert(device_key(&entry.device_ref)) {
                return Err(DeclarationError::DuplicateDevice {
                    line: line_number,
                    device: entry.device_ref,
                });
            }
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    /// Declared entries in file order.
    #[must_use]
    pub fn entries(&self) -> &[DeclarationEntry] {
        &self.entries
    }

    /// Whether the declaration binds no devices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_entry(line: usize, content: &str) -> Result<DeclarationEntry, DeclarationError> {
    let syntax = |reason: &'static str| DeclarationError::Syntax {
        line,
        content: content.to_owned(),
        reason,
    };
    let mut fields = content.split_whitespace();
    let (Some(device_ref), Some(binding), None) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(syntax("expected a device reference and one binding"));
    };
    let numbers: Vec<u32> = binding
        .split(':')
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| syntax("binding fields must be non-negative integers"))?;
    let &[local_span, slot, base_channel] = numbers.as_slice() else {
        return Err(syntax("binding must be <local-span>:<slot>:<base-channel>"));
    };
    if slot == 0 {
        return Err(syntax("slots are numbered from 1"));
    }
    Ok(DeclarationEntry {
        device_ref: device_ref.to_owned(),
        local_span,
        slot,
        base_channel,
    })
}

/// Canonical form of a device reference used for matching.
///
/// Sysfs paths reduce to their last component and `pci:`/`usb:` prefixes are
/// dropped after that, so `pci:0000:04:00.0`, `0000:04:00.0`,
/// `/sys/devices/pci0000:00/0000:00:1e.0/0000:04:00.0`, and
/// `/sys/bus/dahdi_devices/devices/pci:0000:04:00.0` are one device.
pub(crate) fn device_key(reference: &str) -> String {
    let mut reference = reference.trim();
    if reference.starts_with('/') {
        let path = reference.trim_end_matches('/');
        reference = path.rsplit('/').next().unwrap_or(path);
    }
    ["pci:", "usb:"]
        .iter()
        .find_map(|prefix| reference.strip_prefix(prefix))
        .unwrap_or(reference)
        .to_ascii_lowercase()
}

/// Errors in the span declaration file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    /// A line does not follow the declaration format.
    #[error("span declaration line {line} ('{content}'): {reason}")]
    Syntax {
        /// One-based line number.
        line: usize,
        /// Line content without comments.
        content: String,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// A slot is bound twice.
    #[error("span declaration line {line}: slot {slot} is already assigned")]
    DuplicateSlot {
        /// One-based line number.
        line: usize,
        /// Repeated slot.
        slot: u32,
    },
    /// A device is bound twice.
    #[error("span declaration line {line}: device '{device}' is already assigned")]
    DuplicateDevice {
        /// One-based line number.
        line: usize,
        /// Repeated device reference.
        device: String,
    },
}
