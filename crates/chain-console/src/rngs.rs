//! Generator provisioning for parallel chains.

use chain_core::{ConsoleError, RngDescriptor};
use chain_engine::modules;

use crate::library;
use crate::registry::runtime_error;

/// Mints `chain_count` independent generators from the RNG factory named
/// `factory` and returns their names and states.
///
/// Fails with [`ConsoleError::NotFound`] when no loaded factory has that name
/// and with [`ConsoleError::State`] when it is deactivated.
pub fn parallel_rngs(
    factory: &str,
    chain_count: usize,
) -> Result<Vec<RngDescriptor>, ConsoleError> {
    library::ensure_initialized();
    let rngs = modules::make_rngs(factory, chain_count).map_err(runtime_error)?;
    tracing::debug!(factory, chain_count, "parallel_rngs");
    Ok(rngs
        .iter()
        .map(|rng| RngDescriptor {
            name: rng.name().to_string(),
            state: rng.state(),
        })
        .collect())
}
