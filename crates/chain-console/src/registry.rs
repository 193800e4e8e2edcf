//! Process-wide module and factory operations.
//!
//! None of these are tied to a session. Concurrent changes to the same
//! factory's active flag must be serialized by the caller.

use chain_core::{ConsoleError, ErrorInfo, FactoryCategory, FactoryDescriptor};
use chain_engine::modules::{self, RuntimeError};

use crate::library;

pub(crate) fn runtime_error(err: RuntimeError) -> ConsoleError {
    let message = err.to_string();
    match err {
        RuntimeError::UnknownModule(name) => ConsoleError::NotFound(
            ErrorInfo::new("module.unknown", message).with_context("module", name),
        ),
        RuntimeError::AlreadyLoaded(name) => ConsoleError::State(
            ErrorInfo::new("module.loaded", message).with_context("module", name),
        ),
        RuntimeError::NotLoaded(name) => ConsoleError::State(
            ErrorInfo::new("module.not_loaded", message).with_context("module", name),
        ),
        RuntimeError::UnknownFactory { name, category } => ConsoleError::NotFound(
            ErrorInfo::new("factory.unknown", message)
                .with_context("factory", name)
                .with_context("category", category),
        ),
        RuntimeError::Inactive(name) => ConsoleError::State(
            ErrorInfo::new("factory.inactive", message)
                .with_context("factory", name)
                .with_hint("activate it with set_factory_active"),
        ),
    }
}

/// Loads a module. Fails when the module is unknown or already loaded.
pub fn load_module(name: &str) -> Result<(), ConsoleError> {
    library::ensure_initialized();
    modules::load_module(name).map_err(runtime_error)?;
    tracing::debug!(module = name, "load_module");
    Ok(())
}

/// Unloads a module. Fails when the module is unknown or not loaded.
pub fn unload_module(name: &str) -> Result<(), ConsoleError> {
    library::ensure_initialized();
    modules::unload_module(name).map_err(runtime_error)?;
    tracing::debug!(module = name, "unload_module");
    Ok(())
}

/// Loaded modules in load order.
pub fn list_modules() -> Vec<String> {
    library::ensure_initialized();
    modules::list_modules()
}

/// Every known factory of `category` with its active flag.
pub fn list_factories(category: FactoryCategory) -> Vec<FactoryDescriptor> {
    library::ensure_initialized();
    modules::list_factories(category)
}

/// Switches a factory on or off.
pub fn set_factory_active(
    name: &str,
    category: FactoryCategory,
    active: bool,
) -> Result<(), ConsoleError> {
    library::ensure_initialized();
    modules::set_factory_active(name, category, active).map_err(runtime_error)?;
    tracing::debug!(factory = name, category = category.as_str(), active, "set_factory_active");
    Ok(())
}
