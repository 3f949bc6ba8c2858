//! Lifecycle orchestration for a kernel telephony hardware stack.
//!
//! The crate stops and starts the hardware abstraction modules, an optional
//! WAN driver stack, and the PBX that sits on top of them. Bring-up discovers
//! the attached cards, binds their spans to logical slots, and refuses to
//! proceed when the active channel configuration would change the spans or
//! channel roles the generator expects for the hardware.
//!
//! The [`Orchestrator`] owns the sequencing; everything it does to the host
//! goes through a [`telstack_exec::CommandRunner`], so the whole lifecycle can
//! be exercised against a scripted host.

pub mod discovery;
pub mod error;
pub mod graph;
pub mod host;
pub mod orchestrator;
pub mod reconcile;
pub mod report;
pub mod spans;
pub mod state;
pub mod telemetry;
pub mod tools;

#[cfg(test)]
mod tests;

pub use self::discovery::{DiscoveryError, HardwareDevice, discover};
pub use self::error::{FailureClass, InvocationFailure, LifecycleError};
pub use self::graph::{GraphError, ModuleGraph, ModuleSpec, StackLayout, UnitKind, WanStack};
pub use self::host::{HostContext, HostError};
pub use self::orchestrator::{
    CheckReport, Intent, LifecycleReport, Orchestrator, OrchestratorSettings, PbxSettings,
    ServiceStatus, StatusReport, StopMode,
};
pub use self::reconcile::{
    DeltaKind, DeltaLine, DriftClass, ReconcileError, ReconciliationResult, reconcile,
};
pub use self::report::{LifecycleReporter, StructuredReporter};
pub use self::spans::{SpanAssignment, SpanPlan, SpanPolicy, SpanSource, resolve};
pub use self::state::{LifecycleState, Phase, StateError};
