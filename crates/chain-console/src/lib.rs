#![deny(missing_docs)]
//! Host-side console for a Markov-chain sampler engine.
//!
//! A [`Session`] owns one engine instance and drives it through its
//! lifecycle, turning every call's boolean return and diagnostic text into a
//! single `Result`. The [`registry`] and [`rngs`] functions act on
//! process-wide engine state and are independent of any session. [`Model`]
//! layers the usual compile, initialise, adapt and sample workflow on top.

pub mod checkpoint;
pub mod config;
pub mod host_lock;
pub mod library;
pub mod model;
pub mod progress;
pub mod registry;
pub mod rngs;
pub mod session;

pub use chain_core::{
    ConsoleError, DumpType, ErrorInfo, FactoryCategory, FactoryDescriptor, HostState,
    MonitorSpec, NamedArrays, ParameterSet, RngDescriptor, SamplerInfo,
};
pub use checkpoint::ModelCheckpoint;
pub use config::ConsoleConfig;
pub use host_lock::HostGuard;
pub use library::{ensure_initialized, initialize, is_na, na, version};
pub use model::{ChainStart, Model, ModelOptions, ModelSource, Start};
pub use progress::ConstTimePartition;
pub use rngs::parallel_rngs;
pub use session::{Phase, Session};
