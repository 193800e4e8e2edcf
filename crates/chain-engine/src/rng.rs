//! Random-number generators and the factories that mint them.
//!
//! Every generator exposes its complete internal state as a vector of
//! 32-bit words and can be restored from it, so a chain can be resumed on
//! exactly the stream it was checkpointed on.

use std::f64::consts::PI;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

use chain_core::derive_substream_seed;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// `base::Wichmann-Hill`.
pub const WICHMANN_HILL: &str = "base::Wichmann-Hill";
/// `base::Marsaglia-Multicarry`.
pub const MARSAGLIA_MULTICARRY: &str = "base::Marsaglia-Multicarry";
/// `streams::ChaCha8`.
pub const CHACHA8: &str = "streams::ChaCha8";

const I2_32M1: f64 = 2.328306437080797e-10;
const BASE_SEED: u64 = 0x6A09_E667_F3BC_C908;
const STREAM_KEY: u64 = 0xBB67_AE85_84CA_A73B;

static NEXT_SUBSTREAM: AtomicU64 = AtomicU64::new(0);

fn next_seed(master: u64) -> u64 {
    derive_substream_seed(master, NEXT_SUBSTREAM.fetch_add(1, Ordering::Relaxed))
}

/// A uniform generator bound to one chain.
pub trait EngineRng: Debug + Send {
    /// Algorithm name.
    fn name(&self) -> &'static str;

    /// Next draw, strictly inside `(0, 1)`.
    fn uniform(&mut self) -> f64;

    /// Reseeds from a scalar seed.
    fn init(&mut self, seed: u32);

    /// Complete internal state.
    fn state(&self) -> Vec<i32>;

    /// Restores a state produced by [`EngineRng::state`]. Returns `false`
    /// and leaves the generator untouched when the words are invalid.
    fn set_state(&mut self, state: &[i32]) -> bool;

    /// Standard normal draw (Box-Muller).
    fn normal(&mut self) -> f64 {
        let u1 = self.uniform();
        let u2 = self.uniform();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

fn fixup(value: f64) -> f64 {
    if value <= 0.0 {
        0.5 * I2_32M1
    } else if 1.0 - value <= 0.0 {
        1.0 - 0.5 * I2_32M1
    } else {
        value
    }
}

fn scramble(seed: u32) -> u32 {
    seed.wrapping_mul(69069).wrapping_add(1)
}

/// Scrambled seed sequence used to initialise the word-based generators.
fn seed_words<const N: usize>(seed: u32) -> [u32; N] {
    let mut current = seed;
    for _ in 0..50 {
        current = scramble(current);
    }
    let mut words = [0u32; N];
    for word in words.iter_mut() {
        current = scramble(current);
        *word = current;
    }
    words
}

/// Wichmann-Hill combined congruential generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WichmannHill {
    words: [u32; 3],
}

impl WichmannHill {
    const MODULI: [u32; 3] = [30269, 30307, 30323];
    const MULTIPLIERS: [u32; 3] = [171, 172, 170];

    /// Generator seeded from `seed`.
    pub fn new(seed: u32) -> Self {
        let mut rng = Self { words: [1; 3] };
        rng.init(seed);
        rng
    }
}

impl EngineRng for WichmannHill {
    fn name(&self) -> &'static str {
        WICHMANN_HILL
    }

    fn uniform(&mut self) -> f64 {
        let mut value = 0.0;
        for ((word, modulus), multiplier) in self
            .words
            .iter_mut()
            .zip(Self::MODULI)
            .zip(Self::MULTIPLIERS)
        {
            *word = (*word * multiplier) % modulus;
            value += f64::from(*word) / f64::from(modulus);
        }
        fixup(value - value.floor())
    }

    fn init(&mut self, seed: u32) {
        let mut words = seed_words::<3>(seed);
        for (word, modulus) in words.iter_mut().zip(Self::MODULI) {
            *word %= modulus;
            if *word == 0 {
                *word = 1;
            }
        }
        self.words = words;
    }

    fn state(&self) -> Vec<i32> {
        self.words.iter().map(|&word| word as i32).collect()
    }

    fn set_state(&mut self, state: &[i32]) -> bool {
        if state.len() != 3 {
            return false;
        }
        let mut words = [0u32; 3];
        for ((slot, &word), modulus) in words.iter_mut().zip(state).zip(Self::MODULI) {
            if word <= 0 || word as u32 >= modulus {
                return false;
            }
            *slot = word as u32;
        }
        self.words = words;
        true
    }
}

/// Marsaglia multiply-with-carry generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarsagliaMulticarry {
    words: [u32; 2],
}

impl MarsagliaMulticarry {
    /// Generator seeded from `seed`.
    pub fn new(seed: u32) -> Self {
        let mut rng = Self { words: [1; 2] };
        rng.init(seed);
        rng
    }
}

impl EngineRng for MarsagliaMulticarry {
    fn name(&self) -> &'static str {
        MARSAGLIA_MULTICARRY
    }

    fn uniform(&mut self) -> f64 {
        let [first, second] = &mut self.words;
        *first = 36969 * (*first & 0xFFFF) + (*first >> 16);
        *second = 18000 * (*second & 0xFFFF) + (*second >> 16);
        fixup(f64::from((*first << 16) ^ (*second & 0xFFFF)) * I2_32M1)
    }

    fn init(&mut self, seed: u32) {
        let mut words = seed_words::<2>(seed);
        for word in words.iter_mut() {
            if *word == 0 {
                *word = 1;
            }
        }
        self.words = words;
    }

    fn state(&self) -> Vec<i32> {
        self.words.iter().map(|&word| word as i32).collect()
    }

    fn set_state(&mut self, state: &[i32]) -> bool {
        match state {
            [first, second] if *first != 0 && *second != 0 => {
                self.words = [*first as u32, *second as u32];
                true
            }
            _ => false,
        }
    }
}

/// ChaCha8 keystream generator on a selectable stream.
///
/// State words: eight key words, two stream words and four word-position
/// words, all little-endian.
#[derive(Debug, Clone)]
pub struct ChaChaStream {
    rng: ChaCha8Rng,
}

impl ChaChaStream {
    /// Generator keyed from `seed` on stream `stream`.
    pub fn new(seed: u64, stream: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        Self { rng }
    }

    /// Stream number.
    pub fn stream(&self) -> u64 {
        self.rng.get_stream()
    }
}

impl EngineRng for ChaChaStream {
    fn name(&self) -> &'static str {
        CHACHA8
    }

    fn uniform(&mut self) -> f64 {
        loop {
            let draw: f64 = self.rng.gen();
            if draw > 0.0 {
                return draw;
            }
        }
    }

    /// Rekeys from `seed` and moves to stream 0, so the seed alone decides
    /// the resulting state.
    fn init(&mut self, seed: u32) {
        self.rng = ChaCha8Rng::seed_from_u64(u64::from(seed));
    }

    fn state(&self) -> Vec<i32> {
        let mut words: Vec<i32> = self
            .rng
            .get_seed()
            .chunks_exact(4)
            .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        let stream = self.rng.get_stream();
        words.push(stream as u32 as i32);
        words.push((stream >> 32) as u32 as i32);
        let position = self.rng.get_word_pos();
        for shift in [0, 32, 64, 96] {
            words.push((position >> shift) as u32 as i32);
        }
        words
    }

    fn set_state(&mut self, state: &[i32]) -> bool {
        if state.len() != 14 {
            return false;
        }
        let mut seed = [0u8; 32];
        for (chunk, word) in seed.chunks_exact_mut(4).zip(&state[..8]) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        let stream = u64::from(state[8] as u32) | (u64::from(state[9] as u32) << 32);
        let position = state[10..]
            .iter()
            .enumerate()
            .fold(0u128, |acc, (idx, &word)| {
                acc | (u128::from(word as u32) << (32 * idx))
            });
        let mut rng = ChaCha8Rng::from_seed(seed);
        rng.set_stream(stream);
        rng.set_word_pos(position);
        self.rng = rng;
        true
    }
}

/// A named provider of generators.
pub trait RngFactory: Send {
    /// Factory name.
    fn name(&self) -> &'static str;

    /// Mints `count` mutually independent generators.
    fn make_rngs(&mut self, count: usize) -> Vec<Box<dyn EngineRng>>;

    /// Mints one generator of algorithm `name`, if this factory provides it.
    fn make_rng(&mut self, name: &str) -> Option<Box<dyn EngineRng>>;
}

/// `base::BaseRNG`: alternates Wichmann-Hill and Marsaglia-Multicarry with
/// derived seeds.
#[derive(Debug, Default)]
pub struct BaseRngFactory;

impl BaseRngFactory {
    /// Factory name.
    pub const NAME: &'static str = "base::BaseRNG";

    fn make_kind(&self, index: usize) -> Box<dyn EngineRng> {
        let seed = next_seed(BASE_SEED) as u32;
        if index % 2 == 0 {
            Box::new(WichmannHill::new(seed))
        } else {
            Box::new(MarsagliaMulticarry::new(seed))
        }
    }
}

impl RngFactory for BaseRngFactory {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn make_rngs(&mut self, count: usize) -> Vec<Box<dyn EngineRng>> {
        (0..count).map(|index| self.make_kind(index)).collect()
    }

    fn make_rng(&mut self, name: &str) -> Option<Box<dyn EngineRng>> {
        match name {
            WICHMANN_HILL => Some(self.make_kind(0)),
            MARSAGLIA_MULTICARRY => Some(self.make_kind(1)),
            _ => None,
        }
    }
}

/// `streams::ChaChaFactory`: one key per batch, one stream per generator.
#[derive(Debug, Default)]
pub struct ChaChaFactory;

impl ChaChaFactory {
    /// Factory name.
    pub const NAME: &'static str = "streams::ChaChaFactory";
}

impl RngFactory for ChaChaFactory {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn make_rngs(&mut self, count: usize) -> Vec<Box<dyn EngineRng>> {
        let key = next_seed(STREAM_KEY);
        (0..count)
            .map(|stream| Box::new(ChaChaStream::new(key, stream as u64)) as Box<dyn EngineRng>)
            .collect()
    }

    fn make_rng(&mut self, name: &str) -> Option<Box<dyn EngineRng>> {
        (name == CHACHA8)
            .then(|| Box::new(ChaChaStream::new(next_seed(STREAM_KEY), 0)) as Box<dyn EngineRng>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_stay_inside_unit_interval() {
        let mut generators: Vec<Box<dyn EngineRng>> = vec![
            Box::new(WichmannHill::new(7)),
            Box::new(MarsagliaMulticarry::new(7)),
            Box::new(ChaChaStream::new(7, 3)),
        ];
        for rng in generators.iter_mut() {
            for _ in 0..1000 {
                let draw = rng.uniform();
                assert!(draw > 0.0 && draw < 1.0, "{} produced {draw}", rng.name());
            }
        }
    }

    #[test]
    fn restored_state_replays_the_stream() {
        let mut original = ChaChaStream::new(11, 2);
        for _ in 0..17 {
            original.uniform();
        }
        let mut restored = ChaChaStream::new(0, 0);
        assert!(restored.set_state(&original.state()));
        assert_eq!(restored.stream(), 2);
        for _ in 0..10 {
            assert_eq!(original.uniform(), restored.uniform());
        }
    }

    #[test]
    fn invalid_states_are_refused() {
        let mut rng = WichmannHill::new(1);
        let before = rng.state();
        assert!(!rng.set_state(&[0, 1, 1]));
        assert!(!rng.set_state(&[1, 2]));
        assert_eq!(rng.state(), before);
        assert!(!MarsagliaMulticarry::new(1).set_state(&[0, 5]));
    }
}
