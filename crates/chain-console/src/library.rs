//! Library initialisation and the small utility surface.

use std::sync::Once;

use chain_core::{ConsoleError, NA};
use chain_engine::modules;

use crate::config::ConsoleConfig;
use crate::registry::runtime_error;

/// Engine version this console was built against.
pub const BUILT_AGAINST: &str = chain_engine::VERSION;

static INIT: Once = Once::new();

/// Compares the build-time and runtime engine versions. A mismatch is
/// logged and otherwise ignored.
///
/// The runtime side comes from [`chain_engine::version`]. With the engine
/// linked statically both sides name the same constant, so the startup
/// check only fires when the two crates are built from different sources.
pub fn check_engine_version(expected: &str, actual: &str) -> bool {
    if expected == actual {
        return true;
    }
    tracing::warn!(expected, actual, "engine version mismatch");
    false
}

fn load_defaults(config: &ConsoleConfig) -> Result<(), ConsoleError> {
    check_engine_version(BUILT_AGAINST, modules::version());
    for module in &config.default_modules {
        modules::ensure_loaded(module).map_err(runtime_error)?;
    }
    tracing::debug!(modules = ?config.default_modules, "console initialised");
    Ok(())
}

/// Checks the engine version and loads `config`'s default modules.
///
/// Later implicit initialisation becomes a no-op.
pub fn initialize(config: &ConsoleConfig) -> Result<(), ConsoleError> {
    let outcome = load_defaults(config);
    INIT.call_once(|| {});
    outcome
}

/// Initialises with the default configuration unless that already happened.
pub fn ensure_initialized() {
    INIT.call_once(|| {
        if let Err(err) = load_defaults(&ConsoleConfig::default()) {
            tracing::warn!(error = %err, "default initialisation failed");
        }
    });
}

/// The not-available sentinel.
pub fn na() -> f64 {
    NA
}

/// Whether `value` is the not-available sentinel.
pub fn is_na(value: f64) -> bool {
    chain_core::is_na(value)
}

/// Version string of the linked engine.
pub fn version() -> &'static str {
    modules::version()
}
