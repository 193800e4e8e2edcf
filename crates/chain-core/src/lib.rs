#![deny(missing_docs)]
//! Shared vocabulary of the chain console: named arrays and their
//! column-major codec, the diagnostic reduction rule, the engine trait and the
//! error taxonomy.

pub mod array;
pub mod codec;
pub mod diagnostics;
pub mod engine;
pub mod errors;
pub mod rng;

pub use array::{
    element_count, is_na, EngineArrays, HostState, IntoHostArray, NamedArrays, SArray, NA,
};
pub use diagnostics::{reduce, DiagnosticChannel, EngineStreams};
pub use engine::{
    DumpType, Engine, FactoryCategory, FactoryDescriptor, MonitorSpec, ParameterSet, SamplerInfo,
    StateDump,
};
pub use errors::{ConsoleError, ErrorInfo};
pub use rng::{derive_substream_seed, RngDescriptor, RNG_NAME_KEY, RNG_SEED_KEY, RNG_STATE_KEY};
