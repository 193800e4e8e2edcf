//! Generator descriptors and seed-derivation helpers.

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use std::hash::Hasher;

/// Reserved parameter key carrying a generator name.
pub const RNG_NAME_KEY: &str = ".RNG.name";
/// Reserved parameter key carrying a scalar generator seed.
pub const RNG_SEED_KEY: &str = ".RNG.seed";
/// Reserved parameter key carrying an integer generator state.
pub const RNG_STATE_KEY: &str = ".RNG.state";

/// Name and opaque integer state of one random-number generator.
///
/// The state is sufficient to reconstruct the exact generator: binding the
/// name to a chain and installing the state as [`RNG_STATE_KEY`] resumes
/// the stream where it was captured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RngDescriptor {
    /// Generator algorithm name, e.g. `base::Wichmann-Hill`.
    #[serde(rename = ".RNG.name")]
    pub name: String,
    /// Internal state words.
    #[serde(rename = ".RNG.state")]
    pub state: Vec<i32>,
}

/// Derives the deterministic seed for a specific substream.
///
/// Substreams are derived by hashing `(master_seed, substream_id)` with
/// SipHash-1-3 keyed with zeros, which is stable across platforms.
pub fn derive_substream_seed(master_seed: u64, substream: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(0, 0);
    hasher.write_u64(master_seed);
    hasher.write_u64(substream);
    hasher.finish()
}
