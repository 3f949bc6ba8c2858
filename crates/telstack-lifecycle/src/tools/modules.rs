//! Kernel module listing, loading, and removal.

use std::collections::BTreeMap;

use telstack_exec::{CommandOutput, CommandRunner};

use super::{ToolError, ToolSet, require_success, run_bounded, run_query};
use crate::host::normalise_module_name;

/// One loaded kernel module as reported by `lsmod`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    /// Module name.
    pub name: String,
    /// Reference count.
    pub use_count: u32,
    /// Modules holding a reference, when the kernel names them.
    pub holders: Vec<String>,
}

/// Snapshot of the loaded kernel modules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedModules {
    modules: BTreeMap<String, LoadedModule>,
}

impl LoadedModules {
    /// Parses `lsmod` output.
    ///
    /// ```text
    /// Module                  Size  Used by
    /// dahdi_voicebus         45056  1 wctdm24xxp
    /// dahdi                 270336  3 wctdm24xxp,dahdi_echocan_mg2,
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Parse`] for rows without a numeric size and
    /// reference count.
    pub fn parse(tool: &str, text: &str) -> Result<Self, ToolError> {
        let mut modules = BTreeMap::new();
        for line in text.lines() {
            let mut fields = line.split_whitespace();
            let Some(name) = fields.next() else {
                continue;
            };
            if name == "Module" {
                continue;
            }
            let size = fields.next();
            let count = fields.next();
            let (Some(size), Some(count)) = (size, count) else {
                return Err(parse_error(tool, line, "missing size or use count"));
            };
            if size.parse::<u64>().is_err() {
                return Err(parse_error(tool, line, "size is not a number"));
            }
            let use_count = count
                .parse::<u32>()
                .map_err(|_| parse_error(tool, line, "use count is not a number"))?;
            let holders = fields
                .next()
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|holder| !holder.is_empty() && *holder != "-")
                        .filter(|holder| !holder.starts_with('['))
                        .map(normalise_module_name)
                        .collect()
                })
                .unwrap_or_default();
            let name = normalise_module_name(name);
            modules.insert(
                name.clone(),
                LoadedModule {
                    name,
                    use_count,
                    holders,
                },
            );
        }
        Ok(Self { modules })
    }

    /// Whether `name` is loaded.
    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.modules.contains_key(&normalise_module_name(name))
    }

    /// Looks up a loaded module.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LoadedModule> {
        self.modules.get(&normalise_module_name(name))
    }

    /// Modules holding a reference to `name`.
    #[must_use]
    pub fn holders(&self, name: &str) -> &[String] {
        self.get(name)
            .map(|module| module.holders.as_slice())
            .unwrap_or_default()
    }

    /// Iterates over the loaded module names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

fn parse_error(tool: &str, line: &str, reason: &str) -> ToolError {
    ToolError::Parse {
        tool: tool.to_owned(),
        line: line.trim().to_owned(),
        reason: reason.to_owned(),
    }
}

/// Loads, removes, and lists kernel modules.
#[derive(Debug)]
pub struct ModuleControl<'a, R: ?Sized> {
    runner: &'a R,
    tools: &'a ToolSet,
}

impl<'a, R: CommandRunner + ?Sized> ModuleControl<'a, R> {
    /// Adapter running commands through `runner`.
    #[must_use]
    pub const fn new(runner: &'a R, tools: &'a ToolSet) -> Self {
        Self { runner, tools }
    }

    /// Lists loaded modules. A listing that times out is asked for again.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] when the listing tool fails, keeps timing out,
    /// or prints malformed output.
    pub fn loaded(&self) -> Result<LoadedModules, ToolError> {
        let request = self.tools.request(&self.tools.lsmod);
        let output = require_success(&request, run_query(self.runner, &request)?)?;
        LoadedModules::parse(&self.tools.lsmod, &output.stdout)
    }

    /// Loads `name`. The exit status is returned for the caller to judge.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] when the tool cannot run or times out.
    pub fn load(&self, name: &str) -> Result<CommandOutput, ToolError> {
        let request = self.tools.request(&self.tools.module).arg(name);
        run_bounded(self.runner, &request)
    }

    /// Removes `name`. The exit status is returned for the caller to judge.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] when the tool cannot run or times out.
    pub fn unload(&self, name: &str) -> Result<CommandOutput, ToolError> {
        let request = self.tools.request(&self.tools.module).args(["-r", name]);
        run_bounded(self.runner, &request)
    }
}
