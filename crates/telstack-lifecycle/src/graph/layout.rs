//! Builds the stack's module graph from its configured layout.

use telstack_config::Config;

use super::{GraphError, ModuleGraph, ModuleSpec};
use crate::discovery::HardwareDevice;
use crate::host::normalise_module_name;

// (stop order, start order) per layer. The WAN service stops before the WAN
// kernel object, and both are gone before the base module is removed.
const WAN_SERVICE_ORDER: (i32, i32) = (10, 60);
const WAN_MODULE_ORDER: (i32, i32) = (20, 50);
const DRIVER_ORDER: (i32, i32) = (30, 30);
const ECHOCAN_ORDER: (i32, i32) = (40, 20);
const SIDE_EFFECT_ORDER: (i32, i32) = (45, 25);
const BASE_ORDER: (i32, i32) = (90, 10);

/// Proprietary WAN driver stack layered above the base module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WanStack {
    service: String,
    module: String,
}

impl WanStack {
    /// Describes a WAN stack run by `service` around kernel object `module`.
    #[must_use]
    pub fn new(service: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            module: normalise_module_name(&module.into()),
        }
    }

    /// Service unit driving the stack.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Kernel object of the stack.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }
}

/// Layered composition of the telephony stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackLayout {
    base_module: String,
    driver_modules: Vec<String>,
    echocan_modules: Vec<String>,
    side_effect_modules: Vec<String>,
    wan: Option<WanStack>,
}

impl StackLayout {
    /// Layout with only the base module.
    #[must_use]
    pub fn new(base_module: impl Into<String>) -> Self {
        Self {
            base_module: normalise_module_name(&base_module.into()),
            driver_modules: Vec::new(),
            echocan_modules: Vec::new(),
            side_effect_modules: Vec::new(),
            wan: None,
        }
    }

    /// Layout described by the configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let layout = Self::new(config.base_module())
            .with_driver_modules(config.driver_modules())
            .with_echocan_modules(config.echocan_modules())
            .with_side_effect_modules(config.side_effect_modules());
        match config.wan_stack() {
            Some((service, module)) => layout.with_wan(WanStack::new(service, module)),
            None => layout,
        }
    }

    /// Replaces the hardware driver modules.
    #[must_use]
    pub fn with_driver_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.driver_modules = normalise_all(modules);
        self
    }

    /// Replaces the echo canceller modules.
    #[must_use]
    pub fn with_echocan_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.echocan_modules = normalise_all(modules);
        self
    }

    /// Replaces the side-effect helper modules.
    #[must_use]
    pub fn with_side_effect_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.side_effect_modules = normalise_all(modules);
        self
    }

    /// Adds the WAN stack.
    #[must_use]
    pub fn with_wan(mut self, wan: WanStack) -> Self {
        self.wan = Some(wan);
        self
    }

    /// Base hardware abstraction module.
    #[must_use]
    pub fn base_module(&self) -> &str {
        &self.base_module
    }

    /// Hardware driver modules.
    #[must_use]
    pub fn driver_modules(&self) -> &[String] {
        &self.driver_modules
    }

    /// WAN stack, when configured.
    #[must_use]
    pub const fn wan(&self) -> Option<&WanStack> {
        self.wan.as_ref()
    }

    /// First driver candidate of `device` that this layout can load.
    #[must_use]
    pub fn driver_for<'a>(&self, device: &'a HardwareDevice) -> Option<&'a str> {
        device
            .driver_candidates()
            .iter()
            .map(String::as_str)
            .find(|candidate| self.is_hardware_driver(candidate))
    }

    fn is_hardware_driver(&self, name: &str) -> bool {
        self.driver_modules.iter().any(|driver| driver == name)
            || self.wan.as_ref().is_some_and(|wan| wan.module == name)
    }

    /// Restricts the layout to the drivers the discovered devices need.
    ///
    /// The WAN stack is kept only when a device is served by its kernel
    /// object. Echo cancellers and side-effect modules are unaffected.
    #[must_use]
    pub fn for_devices(&self, devices: &[HardwareDevice]) -> Self {
        let needed: Vec<&str> = devices
            .iter()
            .filter_map(|device| self.driver_for(device))
            .collect();
        let driver_modules = self
            .driver_modules
            .iter()
            .filter(|driver| needed.contains(&driver.as_str()))
            .cloned()
            .collect();
        let wan = self
            .wan
            .as_ref()
            .filter(|wan| needed.contains(&wan.module.as_str()))
            .cloned();
        Self {
            driver_modules,
            wan,
            ..self.clone()
        }
    }

    /// Builds the validated module graph for this layout.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError`] when module names collide across layers.
    pub fn graph(&self) -> Result<ModuleGraph, GraphError> {
        let mut specs = Vec::new();
        let mut base_dependents: Vec<String> = Vec::new();

        if let Some(wan) = &self.wan {
            specs.push(ModuleSpec::service(
                &wan.service,
                WAN_SERVICE_ORDER.0,
                WAN_SERVICE_ORDER.1,
            ));
            specs.push(
                ModuleSpec::kernel_module(&wan.module, WAN_MODULE_ORDER.0, WAN_MODULE_ORDER.1)
                    .with_dependents([wan.service.clone()]),
            );
            base_dependents.push(wan.module.clone());
        }

        for driver in &self.driver_modules {
            specs.push(ModuleSpec::kernel_module(
                driver,
                DRIVER_ORDER.0,
                DRIVER_ORDER.1,
            ));
            base_dependents.push(driver.clone());
        }

        for echocan in &self.echocan_modules {
            specs.push(ModuleSpec::kernel_module(
                echocan,
                ECHOCAN_ORDER.0,
                ECHOCAN_ORDER.1,
            ));
            base_dependents.push(echocan.clone());
        }

        for helper in &self.side_effect_modules {
            specs.push(
                ModuleSpec::kernel_module(helper, SIDE_EFFECT_ORDER.0, SIDE_EFFECT_ORDER.1)
                    .with_dependents(self.driver_modules.iter().cloned())
                    .side_effect_only(),
            );
            base_dependents.push(helper.clone());
        }

        specs.push(
            ModuleSpec::kernel_module(&self.base_module, BASE_ORDER.0, BASE_ORDER.1)
                .with_dependents(base_dependents),
        );

        ModuleGraph::new(specs)
    }
}

fn normalise_all<I, S>(modules: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    modules
        .into_iter()
        .map(|name| normalise_module_name(name.as_ref()))
        .filter(|name| !name.is_empty())
        .collect()
}
