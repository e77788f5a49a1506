//! Fleet modules
//!
//! A module is a plugin that becomes active once the whole fleet is up.
//! Modules are found through a `ModuleDiscovery` (the production one is a
//! static `ModuleRegistry`), constructed with no arguments after LOADED,
//! and handed the fleet exactly once at POSTLOAD.

mod stats;

pub use stats::StatsReporter;

use crate::fleet::Fleet;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A plugin activated at POSTLOAD
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once, after the fleet has entered POSTLOAD
    fn on_post_load(&self, fleet: &Arc<Fleet>);
}

/// No-argument constructor for a module
pub type ModuleConstructor = fn() -> Result<Box<dyn Module>, String>;

/// A discovered module that has not been instantiated yet
#[derive(Clone, Copy)]
pub struct ModuleDescriptor {
    pub name: &'static str,
    construct: ModuleConstructor,
}

impl ModuleDescriptor {
    pub const fn new(name: &'static str, construct: ModuleConstructor) -> Self {
        Self { name, construct }
    }

    /// Descriptor for a module built by `Default`
    pub fn of<M: Module + Default + 'static>(name: &'static str) -> Self {
        Self::new(name, || Ok(Box::new(M::default()) as Box<dyn Module>))
    }

    /// Run the constructor
    pub fn instantiate(&self) -> Result<Box<dyn Module>, String> {
        (self.construct)()
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor").field("name", &self.name).finish()
    }
}

/// Source of module descriptors
///
/// Runs on its own task, concurrently with shard connection.
pub trait ModuleDiscovery: Send + Sync + 'static {
    fn discover(&self) -> impl Future<Output = Vec<ModuleDescriptor>> + Send;
}

/// Static table of modules compiled into the binary
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    descriptors: Vec<ModuleDescriptor>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every module that ships with the fleet
    pub fn builtin() -> Self {
        Self::new().register(ModuleDescriptor::of::<StatsReporter>(StatsReporter::NAME))
    }

    #[must_use]
    pub fn register(mut self, descriptor: ModuleDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl ModuleDiscovery for ModuleRegistry {
    async fn discover(&self) -> Vec<ModuleDescriptor> {
        self.descriptors.clone()
    }
}

/// The module set fixed at POSTLOAD
#[derive(Default)]
pub struct ActiveModules {
    modules: Vec<Box<dyn Module>>,
}

impl ActiveModules {
    pub fn new(modules: Vec<Box<dyn Module>>) -> Self {
        Self { modules }
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|module| module.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Module> {
        self.modules.iter().map(|module| module.as_ref())
    }
}

impl fmt::Debug for ActiveModules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
