#![deny(missing_docs)]
//! Reference in-process sampler engine.
//!
//! [`Console`] implements [`chain_core::Engine`] over a small BUGS-like model
//! language. The [`modules`] runtime holds the process-wide module catalogue
//! and factory table shared by every engine instance.

/// Engine instance.
pub mod console;
/// Distribution families.
pub mod dist;
/// Compiled model graph.
pub mod graph;
/// Process-wide module and factory runtime.
pub mod modules;
/// Trace and mean monitors.
pub mod monitor;
/// Model-language parser.
pub mod parser;
/// Generators and generator factories.
pub mod rng;
/// Sampling methods.
pub mod sampler;

pub use console::Console;
pub use modules::{version, RuntimeError, VERSION};
pub use rng::{EngineRng, RngFactory};
