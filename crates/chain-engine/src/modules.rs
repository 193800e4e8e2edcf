//! Process-wide module catalogue and factory table.
//!
//! Modules contribute distributions, samplers, monitors and generator
//! factories. Loading a module makes its factories visible; every factory
//! carries an active flag that outlives unloading and reloading.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use chain_core::{FactoryCategory, FactoryDescriptor};
use thiserror::Error;

use crate::dist::FAMILY_NAMES;
use crate::rng::{BaseRngFactory, ChaChaFactory, EngineRng, RngFactory};

/// Runtime version reported by [`version`].
pub const VERSION: &str = "4.3.2";

/// `base::Finite`.
pub const FINITE_SAMPLER: &str = "base::Finite";
/// `base::RandomWalk`.
pub const RANDOM_WALK_SAMPLER: &str = "base::RandomWalk";

/// Monitor type label and the factory providing it.
pub const MONITOR_TYPES: [(&str, &str); 2] = [
    ("trace", "base::TraceMonitor"),
    ("mean", "base::MeanMonitor"),
];

/// Version of the linked runtime.
pub fn version() -> &'static str {
    VERSION
}

/// Refusal of a module or factory operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// No module of that name exists.
    #[error("unknown module {0}")]
    UnknownModule(String),
    /// The module is already loaded.
    #[error("module {0} already loaded")]
    AlreadyLoaded(String),
    /// The module is not loaded.
    #[error("module {0} not loaded")]
    NotLoaded(String),
    /// No loaded factory of that name and category.
    #[error("no {category} factory named {name}")]
    UnknownFactory {
        /// Requested factory.
        name: String,
        /// Requested category label.
        category: &'static str,
    },
    /// The factory exists but is switched off.
    #[error("{0} factory is not active")]
    Inactive(String),
}

struct ModuleSpec {
    name: &'static str,
    samplers: &'static [&'static str],
    monitors: &'static [&'static str],
    rngs: &'static [&'static str],
    distributions: &'static [&'static str],
}

static CATALOGUE: [ModuleSpec; 3] = [
    ModuleSpec {
        name: "basemod",
        samplers: &[FINITE_SAMPLER, RANDOM_WALK_SAMPLER],
        monitors: &["base::TraceMonitor", "base::MeanMonitor"],
        rngs: &[BaseRngFactory::NAME],
        distributions: &[],
    },
    ModuleSpec {
        name: "bugs",
        samplers: &[],
        monitors: &[],
        rngs: &[],
        distributions: &FAMILY_NAMES,
    },
    ModuleSpec {
        name: "streams",
        samplers: &[],
        monitors: &[],
        rngs: &[ChaChaFactory::NAME],
        distributions: &[],
    },
];

fn spec(name: &str) -> Option<&'static ModuleSpec> {
    CATALOGUE.iter().find(|module| module.name == name)
}

fn new_factory(name: &str) -> Option<Box<dyn RngFactory>> {
    match name {
        BaseRngFactory::NAME => Some(Box::new(BaseRngFactory)),
        ChaChaFactory::NAME => Some(Box::new(ChaChaFactory)),
        _ => None,
    }
}

#[derive(Default)]
struct Runtime {
    loaded: Vec<&'static ModuleSpec>,
    active: BTreeMap<(FactoryCategory, String), bool>,
    rng_factories: Vec<Box<dyn RngFactory>>,
}

impl Runtime {
    fn factories(&self, category: FactoryCategory) -> impl Iterator<Item = &'static str> + '_ {
        self.loaded.iter().flat_map(move |module| {
            let names = match category {
                FactoryCategory::Sampler => module.samplers,
                FactoryCategory::Monitor => module.monitors,
                FactoryCategory::Rng => module.rngs,
            };
            names.iter().copied()
        })
    }

    fn is_active(&self, category: FactoryCategory, name: &str) -> bool {
        self.factories(category).any(|known| known == name)
            && self
                .active
                .get(&(category, name.to_string()))
                .copied()
                .unwrap_or(true)
    }

    fn active_rng_factories(&mut self) -> impl Iterator<Item = &mut Box<dyn RngFactory>> + '_ {
        let active = &self.active;
        self.rng_factories.iter_mut().filter(move |factory| {
            active
                .get(&(FactoryCategory::Rng, factory.name().to_string()))
                .copied()
                .unwrap_or(true)
        })
    }
}

fn runtime() -> MutexGuard<'static, Runtime> {
    static RUNTIME: OnceLock<Mutex<Runtime>> = OnceLock::new();
    RUNTIME
        .get_or_init(|| Mutex::new(Runtime::default()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Loads a module by name.
pub fn load_module(name: &str) -> Result<(), RuntimeError> {
    let module = spec(name).ok_or_else(|| RuntimeError::UnknownModule(name.to_string()))?;
    let mut rt = runtime();
    if rt.loaded.iter().any(|loaded| loaded.name == name) {
        return Err(RuntimeError::AlreadyLoaded(name.to_string()));
    }
    rt.loaded.push(module);
    rt.rng_factories
        .extend(module.rngs.iter().filter_map(|factory| new_factory(factory)));
    tracing::debug!(module = name, "module loaded");
    Ok(())
}

/// Loads `name` unless it is already loaded.
pub fn ensure_loaded(name: &str) -> Result<(), RuntimeError> {
    match load_module(name) {
        Err(RuntimeError::AlreadyLoaded(_)) => Ok(()),
        other => other,
    }
}

/// Unloads a module by name.
pub fn unload_module(name: &str) -> Result<(), RuntimeError> {
    let module = spec(name).ok_or_else(|| RuntimeError::UnknownModule(name.to_string()))?;
    let mut rt = runtime();
    let position = rt
        .loaded
        .iter()
        .position(|loaded| loaded.name == name)
        .ok_or_else(|| RuntimeError::NotLoaded(name.to_string()))?;
    rt.loaded.remove(position);
    rt.rng_factories
        .retain(|factory| !module.rngs.contains(&factory.name()));
    tracing::debug!(module = name, "module unloaded");
    Ok(())
}

/// Loaded modules in load order.
pub fn list_modules() -> Vec<String> {
    runtime()
        .loaded
        .iter()
        .map(|module| module.name.to_string())
        .collect()
}

/// Factories of `category` provided by loaded modules, in load order.
pub fn list_factories(category: FactoryCategory) -> Vec<FactoryDescriptor> {
    let rt = runtime();
    rt.factories(category)
        .map(|name| FactoryDescriptor {
            name: name.to_string(),
            active: rt.is_active(category, name),
        })
        .collect()
}

/// Switches a loaded factory on or off.
pub fn set_factory_active(
    name: &str,
    category: FactoryCategory,
    active: bool,
) -> Result<(), RuntimeError> {
    let mut rt = runtime();
    let known = rt
        .factories(category)
        .find(|known| *known == name)
        .ok_or_else(|| RuntimeError::UnknownFactory {
            name: name.to_string(),
            category: category.as_str(),
        })?;
    rt.active.insert((category, known.to_string()), active);
    Ok(())
}

/// Mints `count` generators from the named factory.
pub fn make_rngs(factory: &str, count: usize) -> Result<Vec<Box<dyn EngineRng>>, RuntimeError> {
    let mut rt = runtime();
    if !rt.factories(FactoryCategory::Rng).any(|known| known == factory) {
        return Err(RuntimeError::UnknownFactory {
            name: factory.to_string(),
            category: FactoryCategory::Rng.as_str(),
        });
    }
    let minted = rt
        .active_rng_factories()
        .find(|candidate| candidate.name() == factory)
        .map(|candidate| candidate.make_rngs(count));
    minted.ok_or_else(|| RuntimeError::Inactive(factory.to_string()))
}

/// Mints `count` generators from the first active factory, if any.
pub fn default_rngs(count: usize) -> Option<Vec<Box<dyn EngineRng>>> {
    let mut rt = runtime();
    let mut factories = rt.active_rng_factories();
    factories.next().map(|factory| factory.make_rngs(count))
}

/// Mints one generator of algorithm `name` from the first active factory
/// providing it.
pub fn make_rng(name: &str) -> Option<Box<dyn EngineRng>> {
    let mut rt = runtime();
    let mut factories = rt.active_rng_factories();
    factories.find_map(|factory| factory.make_rng(name))
}

/// Whether a loaded module provides the distribution `name`.
pub fn has_distribution(name: &str) -> bool {
    runtime()
        .loaded
        .iter()
        .any(|module| module.distributions.contains(&name))
}

/// Whether a sampler factory is loaded and active.
pub fn sampler_active(name: &str) -> bool {
    runtime().is_active(FactoryCategory::Sampler, name)
}

/// Whether the monitor type `kind` is provided by a loaded, active factory.
pub fn monitor_available(kind: &str) -> bool {
    let rt = runtime();
    MONITOR_TYPES
        .iter()
        .any(|(label, factory)| *label == kind && rt.is_active(FactoryCategory::Monitor, factory))
}
