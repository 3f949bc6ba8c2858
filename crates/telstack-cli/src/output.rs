//! Rendering of lifecycle reports and failures.
//!
//! Reports go to standard output as text or JSON. Failures always go to
//! standard error as text so a redirected report stays parseable.

use std::io::{self, Write};

use serde::Serialize;
use telstack_exec::JournalEntry;
use telstack_lifecycle::{
    CheckReport, HardwareDevice, InvocationFailure, LifecycleReport, ReconciliationResult,
    SpanPlan, StatusReport,
};

use crate::cli::ResolvedOutputFormat;

/// Writes `value` as one pretty-printed JSON document.
fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<(), crate::AppError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

pub(crate) fn write_report<W: Write>(
    out: &mut W,
    report: &LifecycleReport,
    format: ResolvedOutputFormat,
) -> Result<(), crate::AppError> {
    if format == ResolvedOutputFormat::Json {
        return write_json(out, report);
    }
    writeln!(out, "{}: {} -> {}", report.intent, report.initial, report.final_phase)?;
    if report.software_only {
        writeln!(out, "no telephony hardware found; ran software-only")?;
    }
    write_devices(out, &report.devices)?;
    if let Some(plan) = &report.plan {
        write_plan(out, plan)?;
    }
    if let Some(result) = &report.reconciliation {
        writeln!(out, "configuration: {}", result.classification)?;
    }
    if let Some(channels) = &report.channels {
        writeln!(out, "PBX channels: {}", channels.numbered.len())?;
    }
    write_advisories(out, &report.advisories)?;
    Ok(())
}

pub(crate) fn write_status<W: Write>(
    out: &mut W,
    status: &StatusReport,
    format: ResolvedOutputFormat,
) -> Result<(), crate::AppError> {
    if format == ResolvedOutputFormat::Json {
        return write_json(out, status);
    }
    writeln!(out, "phase: {}", status.phase)?;
    if status.loaded_modules.is_empty() {
        writeln!(out, "modules: none loaded")?;
    } else {
        writeln!(out, "modules: {}", status.loaded_modules.join(", "))?;
    }
    for service in &status.services {
        writeln!(out, "service {}: {}", service.unit, service.state)?;
    }
    match status.pbx_reachable {
        Some(true) => writeln!(out, "PBX console: reachable")?,
        Some(false) => writeln!(out, "PBX console: unreachable")?,
        None => writeln!(out, "PBX console: not installed")?,
    }
    if let Some(loaded) = status.channel_module_loaded {
        let state = if loaded { "loaded" } else { "not loaded" };
        writeln!(out, "PBX channel module: {state}")?;
    }
    Ok(())
}

pub(crate) fn write_check<W: Write>(
    out: &mut W,
    report: &CheckReport,
    format: ResolvedOutputFormat,
) -> Result<(), crate::AppError> {
    if format == ResolvedOutputFormat::Json {
        return write_json(out, report);
    }
    if report.software_only {
        writeln!(out, "no telephony hardware found; bring-up would run software-only")?;
    }
    write_devices(out, &report.devices)?;
    write_plan(out, &report.plan)?;
    writeln!(out, "configuration: {}", report.reconciliation.classification)?;
    write_delta(out, &report.reconciliation)?;
    write_advisories(out, &report.advisories)?;
    Ok(())
}

/// Describes a failed invocation: the phase and cause, the last external
/// command with its exit status and stderr tail, and any configuration drift.
pub(crate) fn write_failure<E: Write>(err: &mut E, failure: &InvocationFailure) -> io::Result<()> {
    writeln!(err, "{failure}")?;
    if let Some(entry) = &failure.last_command {
        write_last_command(err, entry)?;
    }
    if let Some(result) = failure.error.drift() {
        writeln!(err, "configuration drift ({}):", result.classification)?;
        write_delta(err, result)?;
    }
    Ok(())
}

fn write_last_command<E: Write>(err: &mut E, entry: &JournalEntry) -> io::Result<()> {
    writeln!(err, "last command: {}", entry.command)?;
    match (entry.timed_out, entry.exit_code) {
        (true, _) => writeln!(err, "exit status: killed after timeout")?,
        (false, Some(code)) => writeln!(err, "exit status: {code}")?,
        (false, None) => writeln!(err, "exit status: terminated by signal")?,
    }
    if !entry.stderr_tail.is_empty() {
        writeln!(err, "stderr:")?;
        for line in entry.stderr_tail.lines() {
            writeln!(err, "  {line}")?;
        }
    }
    Ok(())
}

fn write_delta<W: Write>(out: &mut W, result: &ReconciliationResult) -> io::Result<()> {
    for line in &result.delta {
        writeln!(out, "  {line}")?;
    }
    for warning in &result.warnings {
        writeln!(out, "warning: {warning}")?;
    }
    Ok(())
}

fn write_devices<W: Write>(out: &mut W, devices: &[HardwareDevice]) -> io::Result<()> {
    for device in devices {
        let driver = device
            .driver_candidates()
            .first()
            .map_or("no driver", String::as_str);
        writeln!(
            out,
            "device {} [{}] {} ({driver})",
            device.bus_address(),
            device.vendor_device(),
            device.description()
        )?;
    }
    Ok(())
}

fn write_plan<W: Write>(out: &mut W, plan: &SpanPlan) -> io::Result<()> {
    for assignment in &plan.assignments {
        writeln!(
            out,
            "span {} <- {} ({})",
            assignment.slot_index, assignment.device_ref, assignment.source
        )?;
    }
    for device in &plan.unassigned {
        writeln!(out, "unassigned: {device}")?;
    }
    Ok(())
}

fn write_advisories<W: Write>(out: &mut W, advisories: &[String]) -> io::Result<()> {
    for advisory in advisories {
        writeln!(out, "note: {advisory}")?;
    }
    Ok(())
}
