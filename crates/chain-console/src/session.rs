//! One engine instance and the protocol around it.

use std::fs::File;
use std::path::Path;

use chain_core::codec::{state_to_host, to_engine_map, to_host_map};
use chain_core::{
    reduce, ConsoleError, DiagnosticChannel, DumpType, Engine, EngineArrays, EngineStreams,
    HostState, MonitorSpec, NamedArrays, ParameterSet, SamplerInfo, StateDump,
};
use chain_engine::Console;

use crate::host_lock::HostGuard;
use crate::library;

/// Lifecycle phase, in the order a well-behaved client visits them.
///
/// The engine enforces ordering; the phase only records how far the session
/// got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Nothing loaded.
    Uninitialized,
    /// A model description passed the syntax check.
    ModelLoaded,
    /// The graph is compiled.
    Compiled,
    /// At least one chain received initial values or a generator.
    Parameterized,
    /// Samplers are assigned.
    Initialized,
    /// At least one update ran.
    Sampling,
}

/// A session wrapping exactly one engine instance.
///
/// Not safe for concurrent use: every call must be serialized by the
/// caller, including [`Session::update_released`], which lets unrelated host
/// work run but not a second call into this session.
#[derive(Debug)]
pub struct Session<E: Engine = Console> {
    engine: E,
    channel: DiagnosticChannel,
    phase: Phase,
}

impl Session<Console> {
    /// Creates a session over a fresh in-process engine, initialising the
    /// library first if needed.
    pub fn new() -> Self {
        library::ensure_initialized();
        Self::with_engine(Console::new())
    }
}

impl Default for Session<Console> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Engine> Session<E> {
    /// Wraps an existing engine instance.
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine,
            channel: DiagnosticChannel::new(),
            phase: Phase::Uninitialized,
        }
    }

    /// How far the session got through its lifecycle.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Informational text written by the most recent engine call.
    pub fn last_info(&self) -> &str {
        self.channel.info()
    }

    fn call<F>(&mut self, op: &'static str, f: F) -> Result<(), ConsoleError>
    where
        F: FnOnce(&mut E, &mut EngineStreams) -> bool,
    {
        tracing::debug!(op, "engine call");
        let engine = &mut self.engine;
        let outcome = self.channel.invoke(|io| f(engine, io));
        let info = self.channel.info();
        if !info.is_empty() {
            tracing::info!(op, message = info.trim_end(), "engine output");
        }
        if let Err(err) = &outcome {
            tracing::debug!(op, error = %err, "engine call failed");
        }
        outcome
    }

    fn advance(&mut self, phase: Phase) {
        self.phase = self.phase.max(phase);
    }

    /// Opens the file at `path` and hands it to the engine for a syntax check.
    pub fn check_model(&mut self, path: impl AsRef<Path>) -> Result<(), ConsoleError> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|err| ConsoleError::io(path, &err))?;
        self.call("check_model", |engine, io| engine.check_model(&mut file, io))?;
        self.phase = Phase::ModelLoaded;
        Ok(())
    }

    /// Compiles the loaded model for `chains` chains against `data`.
    pub fn compile(
        &mut self,
        data: &NamedArrays,
        chains: usize,
        generate_data: bool,
    ) -> Result<(), ConsoleError> {
        let data = to_engine_map(data)?;
        self.call("compile", |engine, io| {
            engine.compile(&data, chains, generate_data, io)
        })?;
        self.phase = Phase::Compiled;
        Ok(())
    }

    /// Installs initial values for one chain.
    pub fn set_parameters(&mut self, parameters: &ParameterSet) -> Result<(), ConsoleError> {
        let values = to_engine_map(&parameters.values)?;
        let chain = parameters.chain;
        self.call("set_parameters", |engine, io| {
            engine.set_parameters(&values, chain, io)
        })?;
        self.advance(Phase::Parameterized);
        Ok(())
    }

    /// Binds the generator algorithm `name` to one chain.
    pub fn set_rng_name(&mut self, name: &str, chain: usize) -> Result<(), ConsoleError> {
        self.call("set_rng_name", |engine, io| {
            engine.set_rng_name(name, chain, io)
        })?;
        self.advance(Phase::Parameterized);
        Ok(())
    }

    /// Assigns samplers and completes missing initial values.
    pub fn initialize(&mut self) -> Result<(), ConsoleError> {
        self.call("initialize", |engine, io| engine.initialize(io))?;
        self.phase = Phase::Initialized;
        Ok(())
    }

    /// Advances every chain by `iterations` steps.
    pub fn update(&mut self, iterations: u64) -> Result<(), ConsoleError> {
        self.call("update", |engine, io| engine.update(iterations, io))?;
        self.advance(Phase::Sampling);
        Ok(())
    }

    /// Like [`Session::update`], but gives up `host` for the duration of the
    /// engine call and takes it back before returning.
    pub fn update_released(
        &mut self,
        iterations: u64,
        host: &mut HostGuard,
    ) -> Result<(), ConsoleError> {
        host.release_during(|| self.update(iterations))
    }

    /// Starts monitoring the whole of `name`.
    pub fn set_monitor(&mut self, name: &str, thin: u32, kind: &str) -> Result<(), ConsoleError> {
        let spec = MonitorSpec::new(name, thin, kind)?;
        self.call("set_monitor", |engine, io| {
            engine.set_monitor(&spec.variable, spec.thin, &spec.kind, io)
        })
    }

    /// Stops monitoring `name`.
    pub fn clear_monitor(&mut self, name: &str, kind: &str) -> Result<(), ConsoleError> {
        self.call("clear_monitor", |engine, io| {
            engine.clear_monitor(name, kind, io)
        })
    }

    /// Dumps one chain's data, parameters or both.
    pub fn dump_state(&mut self, kind: DumpType, chain: usize) -> Result<HostState, ConsoleError> {
        let mut dump = StateDump::default();
        self.call("dump_state", |engine, io| {
            engine.dump_state(&mut dump, kind, chain, io)
        })?;
        state_to_host(dump)
    }

    /// Dumps the samples of every monitor of type `kind`.
    ///
    /// With `flat`, all chains are concatenated along the last axis;
    /// otherwise chains keep their own trailing axis.
    pub fn dump_monitors(&mut self, kind: &str, flat: bool) -> Result<NamedArrays, ConsoleError> {
        let mut out = EngineArrays::new();
        self.call("dump_monitors", |engine, io| {
            engine.dump_monitors(&mut out, kind, flat, io)
        })?;
        to_host_map(&out)
    }

    /// Lists assigned samplers with the node arrays each one governs.
    pub fn dump_samplers(&mut self) -> Result<Vec<SamplerInfo>, ConsoleError> {
        let mut out = Vec::new();
        self.call("dump_samplers", |engine, io| engine.dump_samplers(&mut out, io))?;
        Ok(out)
    }

    /// Ends the adaptation phase.
    pub fn adapt_off(&mut self) -> Result<(), ConsoleError> {
        self.call("adapt_off", |engine, io| engine.adapt_off(io))
    }

    /// Whether adaptation has converged.
    pub fn check_adaptation(&mut self) -> Result<bool, ConsoleError> {
        let mut status = false;
        self.call("check_adaptation", |engine, io| {
            engine.check_adaptation(&mut status, io)
        })?;
        Ok(status)
    }

    /// Whether samplers are still adapting.
    pub fn is_adapting(&self) -> bool {
        self.engine.is_adapting()
    }

    /// Completed iterations.
    pub fn iteration(&self) -> u64 {
        self.engine.iteration()
    }

    /// Variables declared by the loaded model.
    pub fn variable_names(&self) -> Vec<String> {
        self.engine.variable_names()
    }

    /// Number of compiled chains.
    pub fn nchain(&self) -> usize {
        self.engine.nchain()
    }

    /// Discards all engine-side state. Teardown problems are logged and
    /// dropped.
    pub fn clear_model(&mut self) {
        let mut io = EngineStreams::new();
        let returned = self.engine.clear_model(&mut io);
        if let Err(err) = reduce(returned, &io) {
            tracing::warn!(error = %err, "ignoring engine error during teardown");
        }
        self.phase = Phase::Uninitialized;
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }
}
