//! The compile, initialise, adapt and sample workflow.

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chain_core::{
    ConsoleError, DumpType, ErrorInfo, HostState, NamedArrays, ParameterSet, RngDescriptor,
    RNG_SEED_KEY, RNG_STATE_KEY,
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::checkpoint::ModelCheckpoint;
use crate::config::ConsoleConfig;
use crate::host_lock::HostGuard;
use crate::progress::ConstTimePartition;
use crate::session::Session;

/// Where the model description comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A model file.
    File(PathBuf),
    /// Model text, written to a temporary file for the syntax check.
    Text(String),
}

/// Initial values and generator settings for one chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainStart {
    /// Initial values keyed by variable.
    pub values: NamedArrays,
    /// Generator algorithm bound before the values are installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_name: Option<String>,
    /// Seed for the chain's generator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u32>,
    /// Exact generator state; needs `rng_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_state: Option<Vec<i32>>,
}

impl ChainStart {
    /// Start with the given initial values.
    pub fn new(values: NamedArrays) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    /// Binds the generator algorithm `name`.
    pub fn with_rng_name(mut self, name: impl Into<String>) -> Self {
        self.rng_name = Some(name.into());
        self
    }

    /// Seeds the chain's generator.
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}

impl From<NamedArrays> for ChainStart {
    fn from(values: NamedArrays) -> Self {
        Self::new(values)
    }
}

impl From<HostState> for ChainStart {
    fn from(state: HostState) -> Self {
        Self {
            values: state.values,
            rng_name: state.rng_name,
            rng_seed: None,
            rng_state: state.rng_state,
        }
    }
}

impl From<RngDescriptor> for ChainStart {
    fn from(rng: RngDescriptor) -> Self {
        Self {
            rng_name: Some(rng.name),
            rng_state: Some(rng.state),
            ..Self::default()
        }
    }
}

/// Start values for all chains.
#[derive(Debug, Clone, PartialEq)]
pub enum Start {
    /// The same start for every chain.
    Shared(ChainStart),
    /// One start per chain; the length must equal the chain count.
    PerChain(Vec<ChainStart>),
}

impl Default for Start {
    fn default() -> Self {
        Start::Shared(ChainStart::default())
    }
}

impl Start {
    fn per_chain(self, chains: usize) -> Result<Vec<ChainStart>, ConsoleError> {
        match self {
            Start::Shared(start) => Ok(vec![start; chains]),
            Start::PerChain(starts) if starts.len() == chains => Ok(starts),
            Start::PerChain(starts) => Err(ConsoleError::Conversion(
                ErrorInfo::new(
                    "model.start_length",
                    "length of start sequence should equal the number of chains",
                )
                .with_context("starts", starts.len().to_string())
                .with_context("chains", chains.to_string()),
            )),
        }
    }
}

/// Settings for [`Model::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    /// Observed data. Empty arrays are dropped.
    pub data: NamedArrays,
    /// Initial values.
    pub start: Start,
    /// Number of chains.
    pub chains: usize,
    /// Adaptation iterations run after initialisation.
    pub tune: u64,
    /// Forward-sample the `data` block for names not in `data`.
    pub generate_data: bool,
    /// Monitor type used by [`Model::sample_default`].
    pub monitor_type: String,
    /// Thinning used by [`Model::sample_default`].
    pub thin: u32,
    /// Target length of one update chunk.
    pub progress_period: Option<Duration>,
}

impl ModelOptions {
    /// Options taken from `config`, one chain, no data and no start values.
    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self {
            data: NamedArrays::new(),
            start: Start::default(),
            chains: 1,
            tune: config.tune,
            generate_data: config.generate_data,
            monitor_type: config.monitor_type.clone(),
            thin: config.thin,
            progress_period: config
                .progress_period_secs
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(Duration::from_secs_f64),
        }
    }

    /// Sets the observed data.
    pub fn with_data(mut self, data: NamedArrays) -> Self {
        self.data = data;
        self
    }

    /// Sets the start values.
    pub fn with_start(mut self, start: Start) -> Self {
        self.start = start;
        self
    }

    /// Sets the number of chains.
    pub fn with_chains(mut self, chains: usize) -> Self {
        self.chains = chains;
        self
    }

    /// Sets the adaptation length.
    pub fn with_tune(mut self, tune: u64) -> Self {
        self.tune = tune;
        self
    }
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self::from_config(&ConsoleConfig::default())
    }
}

fn unknown_names<'a>(
    names: impl Iterator<Item = &'a str>,
    variables: &[String],
    reserved: &[&str],
) -> Vec<&'a str> {
    names
        .filter(|name| !variables.iter().any(|var| var == name) && !reserved.contains(name))
        .collect()
}

/// A compiled, initialised model with its chains.
#[derive(Debug)]
pub struct Model {
    session: Session,
    iteration_offset: u64,
    monitor_type: String,
    thin: u32,
    progress_period: Option<Duration>,
}

impl Model {
    /// Loads, compiles and initialises a model, then adapts it for
    /// `options.tune` iterations.
    pub fn new(source: ModelSource, options: ModelOptions) -> Result<Self, ConsoleError> {
        let mut session = Session::new();
        match &source {
            ModelSource::File(path) => session.check_model(path)?,
            ModelSource::Text(text) => {
                let mut file = NamedTempFile::new()
                    .map_err(|err| ConsoleError::io(&std::env::temp_dir(), &err))?;
                file.write_all(text.as_bytes())
                    .and_then(|()| file.flush())
                    .map_err(|err| ConsoleError::io(file.path(), &err))?;
                session.check_model(file.path())?;
            }
        }

        let variables = session.variable_names();
        let mut data = options.data;
        data.retain_non_empty();
        let unused = unknown_names(data.names(), &variables, &[]);
        if !unused.is_empty() {
            return Err(ConsoleError::NotFound(
                ErrorInfo::new(
                    "model.unused_data",
                    format!("unused data for variables: {}", unused.join(",")),
                )
                .with_context("variables", unused.join(",")),
            ));
        }
        session.compile(&data, options.chains, options.generate_data)?;

        let starts = options.start.per_chain(session.nchain())?;
        for (chain, start) in starts.into_iter().enumerate() {
            apply_start(&mut session, chain, start, &variables)?;
        }
        session.initialize()?;

        let mut model = Self {
            session,
            iteration_offset: 0,
            monitor_type: options.monitor_type,
            thin: options.thin,
            progress_period: options.progress_period,
        };
        if options.tune > 0 {
            let converged = model.adapt(options.tune)?;
            tracing::debug!(tune = options.tune, converged, "adaptation finished");
        }
        Ok(model)
    }

    /// Rebuilds a model whose chains continue from `checkpoint`.
    ///
    /// The chain count comes from the checkpoint; no adaptation is run.
    pub fn resume(
        source: ModelSource,
        options: ModelOptions,
        checkpoint: ModelCheckpoint,
    ) -> Result<Self, ConsoleError> {
        let options = ModelOptions {
            chains: checkpoint.chains.len(),
            start: Start::PerChain(checkpoint.chains.into_iter().map(ChainStart::from).collect()),
            tune: 0,
            ..options
        };
        let mut model = Self::new(source, options)?;
        model.iteration_offset = checkpoint.iteration;
        tracing::info!(iteration = checkpoint.iteration, "model resumed");
        Ok(model)
    }

    /// Advances every chain by `iterations` steps.
    pub fn update(&mut self, iterations: u64) -> Result<(), ConsoleError> {
        self.run(iterations, None)
    }

    /// Like [`Model::update`], releasing `host` while the engine runs.
    pub fn update_released(
        &mut self,
        iterations: u64,
        host: &mut HostGuard,
    ) -> Result<(), ConsoleError> {
        self.run(iterations, Some(host))
    }

    fn run(
        &mut self,
        iterations: u64,
        mut host: Option<&mut HostGuard>,
    ) -> Result<(), ConsoleError> {
        let Some(period) = self.progress_period else {
            return self.step(iterations, host);
        };
        let started = Instant::now();
        let mut partition = ConstTimePartition::new(iterations, period);
        while let Some(chunk) = partition.next_chunk(started.elapsed()) {
            self.step(chunk, host.as_deref_mut())?;
            tracing::info!(done = partition.done(), total = iterations, "update progress");
        }
        Ok(())
    }

    fn step(&mut self, iterations: u64, host: Option<&mut HostGuard>) -> Result<(), ConsoleError> {
        match host {
            Some(host) => self.session.update_released(iterations, host),
            None => self.session.update(iterations),
        }
    }

    /// Runs adaptation for `iterations` steps and reports whether it
    /// converged. A model without adaptive samplers reports `true` at once.
    pub fn adapt(&mut self, iterations: u64) -> Result<bool, ConsoleError> {
        if !self.session.is_adapting() {
            return Ok(true);
        }
        self.update(iterations)?;
        self.session.check_adaptation()
    }

    /// Monitors `vars` (every variable when `None`), runs `iterations`
    /// steps and returns the per-chain samples. The monitors set here are
    /// always cleared again.
    pub fn sample(
        &mut self,
        iterations: u64,
        vars: Option<&[&str]>,
        thin: u32,
        monitor_type: &str,
    ) -> Result<NamedArrays, ConsoleError> {
        let vars: Vec<String> = match vars {
            Some(vars) => vars.iter().map(|var| var.to_string()).collect(),
            None => self.variables(),
        };
        let mut set = Vec::new();
        let samples = self.monitored(iterations, &vars, thin, monitor_type, &mut set);
        let mut cleared = Ok(());
        for name in &set {
            if let Err(err) = self.session.clear_monitor(name, monitor_type) {
                tracing::warn!(variable = %name, error = %err, "failed to clear monitor");
                if cleared.is_ok() {
                    cleared = Err(err);
                }
            }
        }
        let samples = samples?;
        cleared?;
        Ok(samples)
    }

    /// [`Model::sample`] over every variable with the configured thinning and
    /// monitor type.
    pub fn sample_default(&mut self, iterations: u64) -> Result<NamedArrays, ConsoleError> {
        let monitor_type = self.monitor_type.clone();
        self.sample(iterations, None, self.thin, &monitor_type)
    }

    fn monitored(
        &mut self,
        iterations: u64,
        vars: &[String],
        thin: u32,
        monitor_type: &str,
        set: &mut Vec<String>,
    ) -> Result<NamedArrays, ConsoleError> {
        for name in vars {
            self.session.set_monitor(name, thin, monitor_type)?;
            set.push(name.clone());
        }
        self.update(iterations)?;
        self.session.dump_monitors(monitor_type, false)
    }

    /// Variables of the model.
    pub fn variables(&self) -> Vec<String> {
        self.session.variable_names()
    }

    /// Number of chains.
    pub fn num_chains(&self) -> usize {
        self.session.nchain()
    }

    /// Chain indices, starting at 0.
    pub fn chains(&self) -> Vec<usize> {
        (0..self.num_chains()).collect()
    }

    /// Iterations completed, including those before a resume.
    pub fn iteration(&self) -> u64 {
        self.iteration_offset + self.session.iteration()
    }

    /// Full state of every chain.
    pub fn state(&mut self) -> Result<Vec<HostState>, ConsoleError> {
        self.chains()
            .into_iter()
            .map(|chain| self.session.dump_state(DumpType::All, chain))
            .collect()
    }

    /// Captures what [`Model::resume`] needs to continue the chains.
    pub fn checkpoint(&mut self) -> Result<ModelCheckpoint, ConsoleError> {
        let chains = self
            .chains()
            .into_iter()
            .map(|chain| self.session.dump_state(DumpType::Parameters, chain))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ModelCheckpoint {
            iteration: self.iteration(),
            chains,
        })
    }

    /// The underlying session.
    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }
}

fn apply_start(
    session: &mut Session,
    chain: usize,
    start: ChainStart,
    variables: &[String],
) -> Result<(), ConsoleError> {
    if let Some(name) = &start.rng_name {
        session.set_rng_name(name, chain)?;
    }
    let mut values = start.values;
    values.retain_non_empty();
    let unused = unknown_names(values.names(), variables, &[RNG_SEED_KEY, RNG_STATE_KEY]);
    if !unused.is_empty() {
        return Err(ConsoleError::NotFound(
            ErrorInfo::new(
                "model.unused_start",
                format!(
                    "unused initial values in chain {chain} for variables: {}",
                    unused.join(",")
                ),
            )
            .with_context("chain", chain.to_string()),
        ));
    }
    if let Some(seed) = start.rng_seed {
        values.insert(RNG_SEED_KEY, f64::from(seed))?;
    }
    if let Some(state) = start.rng_state {
        let words: Vec<f64> = state.into_iter().map(f64::from).collect();
        values.insert(RNG_STATE_KEY, words)?;
    }
    session.set_parameters(&ParameterSet::new(chain, values))
}
