//! Static description of the telephony stack's units and their ordering.
//!
//! A [`ModuleGraph`] is built once from a list of [`ModuleSpec`]s and is pure:
//! it never touches the host. Construction rejects any specification whose
//! orders disagree with its dependency edges, so a graph that exists always
//! yields a teardown order with every dependent ahead of the unit it holds,
//! and a bring-up order with every unit ahead of its dependents.

mod layout;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub use self::layout::{StackLayout, WanStack};

/// Kind of lifecycle unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Loadable kernel module driven through the module control tool.
    KernelModule,
    /// Service unit driven through the service control tool.
    Service,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::KernelModule => "kernel module",
            Self::Service => "service",
        })
    }
}

/// A named unit of the stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleSpec {
    name: String,
    kind: UnitKind,
    stop_order: i32,
    start_order: i32,
    dependents: BTreeSet<String>,
    removable: bool,
}

impl ModuleSpec {
    /// Describes a removable kernel module.
    #[must_use]
    pub fn kernel_module(name: impl Into<String>, stop_order: i32, start_order: i32) -> Self {
        Self {
            name: name.into(),
            kind: UnitKind::KernelModule,
            stop_order,
            start_order,
            dependents: BTreeSet::new(),
            removable: true,
        }
    }

    /// Describes a service unit.
    #[must_use]
    pub fn service(name: impl Into<String>, stop_order: i32, start_order: i32) -> Self {
        Self {
            kind: UnitKind::Service,
            ..Self::kernel_module(name, stop_order, start_order)
        }
    }

    /// Adds units that must be stopped before this one.
    #[must_use]
    pub fn with_dependents<I, S>(mut self, dependents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependents
            .extend(dependents.into_iter().map(Into::into));
        self
    }

    /// Marks the unit as removed only as a side effect of another unit.
    #[must_use]
    pub fn side_effect_only(mut self) -> Self {
        self.removable = false;
        self
    }

    /// Unit name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit kind.
    #[must_use]
    pub const fn kind(&self) -> UnitKind {
        self.kind
    }

    /// Position in the teardown sequence; lower stops first.
    #[must_use]
    pub const fn stop_order(&self) -> i32 {
        self.stop_order
    }

    /// Position in the bring-up sequence; lower starts first.
    #[must_use]
    pub const fn start_order(&self) -> i32 {
        self.start_order
    }

    /// Units that must be stopped before this one.
    #[must_use]
    pub const fn dependents(&self) -> &BTreeSet<String> {
        &self.dependents
    }

    /// Whether the orchestrator loads and unloads the unit itself.
    #[must_use]
    pub const fn removable(&self) -> bool {
        self.removable
    }
}

/// Validated dependency graph over the stack's units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleGraph {
    units: BTreeMap<String, ModuleSpec>,
}

impl ModuleGraph {
    /// Validates `specs` and builds the graph.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] for duplicate names, dependents that are not
    /// part of the graph or name the unit itself, and dependency edges whose
    /// stop or start orders do not strictly agree with the edge. A cycle
    /// always produces an order conflict.
    pub fn new(specs: impl IntoIterator<Item = ModuleSpec>) -> Result<Self, GraphError> {
        let mut units = BTreeMap::new();
        for spec in specs {
            if units.contains_key(spec.name()) {
                return Err(GraphError::Duplicate {
                    unit: spec.name.clone(),
                });
            }
            units.insert(spec.name.clone(), spec);
        }
        let graph = Self { units };
        graph.validate()?;
        Ok(graph)
    }

    fn validate(&self) -> Result<(), GraphError> {
        for unit in self.units.values() {
            for dependent_name in &unit.dependents {
                if dependent_name == &unit.name {
                    return Err(GraphError::SelfDependent {
                        unit: unit.name.clone(),
                    });
                }
                let Some(dependent) = self.units.get(dependent_name) else {
                    return Err(GraphError::UnknownDependent {
                        unit: unit.name.clone(),
                        dependent: dependent_name.clone(),
                    });
                };
                if dependent.stop_order >= unit.stop_order {
                    return Err(GraphError::StopOrderConflict {
                        unit: unit.name.clone(),
                        dependent: dependent_name.clone(),
                    });
                }
                if dependent.start_order <= unit.start_order {
                    return Err(GraphError::StartOrderConflict {
                        unit: unit.name.clone(),
                        dependent: dependent_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Units in teardown order: dependents first, ties broken by name.
    #[must_use]
    pub fn teardown_order(&self) -> Vec<&ModuleSpec> {
        let mut ordered: Vec<&ModuleSpec> = self.units.values().collect();
        ordered.sort_by(|left, right| {
            (left.stop_order, &left.name).cmp(&(right.stop_order, &right.name))
        });
        ordered
    }

    /// Units in bring-up order: independent units first, ties broken by name.
    #[must_use]
    pub fn bringup_order(&self) -> Vec<&ModuleSpec> {
        let mut ordered: Vec<&ModuleSpec> = self.units.values().collect();
        ordered.sort_by(|left, right| {
            (left.start_order, &left.name).cmp(&(right.start_order, &right.name))
        });
        ordered
    }

    /// Looks up a unit by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModuleSpec> {
        self.units.get(name)
    }

    /// Whether the graph contains `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// Dependents declared for `name`, resolved to their specs.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<&ModuleSpec> {
        self.units
            .get(name)
            .map(|unit| {
                unit.dependents
                    .iter()
                    .filter_map(|dependent| self.units.get(dependent))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the graph has no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Specification errors rejected while building a [`ModuleGraph`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Two units share a name.
    #[error("unit '{unit}' is declared more than once")]
    Duplicate {
        /// Repeated name.
        unit: String,
    },
    /// A unit names itself as a dependent.
    #[error("unit '{unit}' lists itself as a dependent")]
    SelfDependent {
        /// Offending unit.
        unit: String,
    },
    /// A dependent is not part of the graph.
    #[error("unit '{unit}' lists unknown dependent '{dependent}'")]
    UnknownDependent {
        /// Unit declaring the edge.
        unit: String,
        /// Missing dependent.
        dependent: String,
    },
    /// A dependent would not stop strictly before the unit it holds.
    #[error("dependent '{dependent}' must stop before '{unit}' but its stop order is not lower")]
    StopOrderConflict {
        /// Unit declaring the edge.
        unit: String,
        /// Dependent with a conflicting order.
        dependent: String,
    },
    /// A dependent would not start strictly after the unit it needs.
    #[error("dependent '{dependent}' must start after '{unit}' but its start order is not higher")]
    StartOrderConflict {
        /// Unit declaring the edge.
        unit: String,
        /// Dependent with a conflicting order.
        dependent: String,
    },
}

#[cfg(test)]
mod tests;
