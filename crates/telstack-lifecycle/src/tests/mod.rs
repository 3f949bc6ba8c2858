//! Orchestrator tests run against a scripted host.

mod behaviour;
mod support;
