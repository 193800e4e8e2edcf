//! The engine seam: everything the console needs from a sampler engine.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::array::{EngineArrays, NamedArrays};
use crate::diagnostics::EngineStreams;
use crate::errors::ConsoleError;

/// Which part of a chain's state a dump returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DumpType {
    /// Observed and constant values.
    Data,
    /// Current values of unobserved nodes and the generator state.
    Parameters,
    /// Both of the above.
    All,
}

/// The three process-wide factory categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FactoryCategory {
    /// Sampler algorithms.
    Sampler,
    /// Monitor types.
    Monitor,
    /// Random-number generator algorithms.
    Rng,
}

impl FactoryCategory {
    /// Lower-case label used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FactoryCategory::Sampler => "sampler",
            FactoryCategory::Monitor => "monitor",
            FactoryCategory::Rng => "rng",
        }
    }
}

/// A factory and its active flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryDescriptor {
    /// Factory name, e.g. `base::RandomWalk`.
    pub name: String,
    /// Whether the engine may use the factory.
    pub active: bool,
}

/// One assigned sampler and the node arrays it updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerInfo {
    /// Sampler name.
    pub name: String,
    /// Names of the node arrays governed by the sampler.
    pub nodes: Vec<String>,
}

/// Output slot filled by [`Engine::dump_state`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDump {
    /// Dumped arrays, possibly including the reserved generator state key.
    pub values: EngineArrays,
    /// Generator bound to the chain, empty when none.
    pub rng_name: String,
}

/// A monitor request: variable, monitor type and thinning factor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorSpec {
    /// Monitored variable; always its entire index range.
    pub variable: String,
    /// Monitor type, e.g. `trace`.
    pub kind: String,
    /// Keep every `thin`-th iteration.
    pub thin: u32,
}

impl MonitorSpec {
    /// Validates the request eagerly.
    pub fn new(
        variable: impl Into<String>,
        thin: u32,
        kind: impl Into<String>,
    ) -> Result<Self, ConsoleError> {
        let variable = variable.into();
        if thin == 0 {
            return Err(ConsoleError::Conversion(
                crate::ErrorInfo::new("monitor.thin", "thinning factor must be at least 1")
                    .with_context("variable", variable),
            ));
        }
        Ok(Self {
            variable,
            kind: kind.into(),
            thin,
        })
    }
}

/// Initial values for one chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Zero-based chain index.
    pub chain: usize,
    /// Values keyed by variable name.
    pub values: NamedArrays,
}

impl ParameterSet {
    /// Pairs `values` with `chain`.
    pub fn new(chain: usize, values: NamedArrays) -> Self {
        Self { chain, values }
    }
}

/// Contract of a sampler engine instance.
///
/// Fallible operations report through a boolean return and the two streams;
/// the caller decides success with [`crate::diagnostics::reduce`]. The engine
/// enforces lifecycle ordering itself and reports out-of-order calls as
/// failures. Output slots follow the same convention: their content is only
/// meaningful after a successful call.
pub trait Engine {
    /// Parses and syntax-checks a model description.
    fn check_model(&mut self, model: &mut dyn Read, io: &mut EngineStreams) -> bool;

    /// Builds the model graph for `chains` chains using observed `data`.
    fn compile(
        &mut self,
        data: &EngineArrays,
        chains: usize,
        generate_data: bool,
        io: &mut EngineStreams,
    ) -> bool;

    /// Installs initial values for one chain.
    fn set_parameters(&mut self, values: &EngineArrays, chain: usize, io: &mut EngineStreams)
        -> bool;

    /// Binds a named generator to one chain.
    fn set_rng_name(&mut self, name: &str, chain: usize, io: &mut EngineStreams) -> bool;

    /// Assigns samplers and completes missing initial values.
    fn initialize(&mut self, io: &mut EngineStreams) -> bool;

    /// Advances every chain by `iterations` steps.
    fn update(&mut self, iterations: u64, io: &mut EngineStreams) -> bool;

    /// Starts monitoring the whole of `name`.
    fn set_monitor(&mut self, name: &str, thin: u32, kind: &str, io: &mut EngineStreams) -> bool;

    /// Stops monitoring `name`.
    fn clear_monitor(&mut self, name: &str, kind: &str, io: &mut EngineStreams) -> bool;

    /// Dumps one chain's state.
    fn dump_state(
        &mut self,
        out: &mut StateDump,
        kind: DumpType,
        chain: usize,
        io: &mut EngineStreams,
    ) -> bool;

    /// Dumps accumulated samples of every monitor of type `kind`.
    fn dump_monitors(
        &mut self,
        out: &mut EngineArrays,
        kind: &str,
        flat: bool,
        io: &mut EngineStreams,
    ) -> bool;

    /// Lists assigned samplers.
    fn dump_samplers(&mut self, out: &mut Vec<SamplerInfo>, io: &mut EngineStreams) -> bool;

    /// Ends the adaptation phase.
    fn adapt_off(&mut self, io: &mut EngineStreams) -> bool;

    /// Writes whether adaptation has converged into `status`.
    fn check_adaptation(&mut self, status: &mut bool, io: &mut EngineStreams) -> bool;

    /// Completed iterations.
    fn iteration(&self) -> u64;

    /// Variables declared by the loaded model.
    fn variable_names(&self) -> Vec<String>;

    /// Number of compiled chains.
    fn nchain(&self) -> usize;

    /// Whether samplers are still adapting.
    fn is_adapting(&self) -> bool;

    /// Discards all model state. Problems are reported through `io` but the
    /// state is gone either way.
    fn clear_model(&mut self, io: &mut EngineStreams) -> bool;
}
