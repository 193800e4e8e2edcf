//! The in-process engine instance.

use std::io::Read;

use chain_core::codec::collapse_dims;
use chain_core::{
    is_na, DumpType, Engine, EngineArrays, EngineStreams, SamplerInfo, SArray, StateDump, NA,
    RNG_NAME_KEY, RNG_SEED_KEY, RNG_STATE_KEY,
};

use crate::graph::{Compiled, Graph};
use crate::modules;
use crate::monitor::{Monitor, MonitorKind};
use crate::parser::{self, Program};
use crate::rng::EngineRng;
use crate::sampler::{Sampler, SamplerKind};

#[derive(Debug)]
struct ChainState {
    values: Vec<Vec<f64>>,
    rng: Option<Box<dyn EngineRng>>,
}

#[derive(Debug)]
struct ModelState {
    graph: Graph,
    chains: Vec<ChainState>,
    samplers: Vec<Sampler>,
    monitors: Vec<Monitor>,
    iteration: u64,
    initialized: bool,
    adapting: bool,
}

/// One engine instance: a loaded program and, once compiled, its chains.
///
/// Every fallible operation reports through its boolean return and the
/// streams it is handed, and enforces lifecycle ordering itself.
#[derive(Debug, Default)]
pub struct Console {
    program: Option<Program>,
    model: Option<ModelState>,
}

impl Console {
    /// Creates an empty engine instance.
    pub fn new() -> Self {
        Self::default()
    }
}

fn compiled<'a>(
    model: &'a mut Option<ModelState>,
    io: &mut EngineStreams,
    action: &str,
) -> Option<&'a mut ModelState> {
    if model.is_none() {
        io.fail(format!("Can't {action}. No model compiled"));
    }
    model.as_mut()
}

fn initialized<'a>(
    model: &'a mut Option<ModelState>,
    io: &mut EngineStreams,
    action: &str,
) -> Option<&'a mut ModelState> {
    match model {
        Some(state) if state.initialized => Some(state),
        Some(_) => {
            io.fail(format!("Can't {action}. Model not initialized"));
            None
        }
        None => {
            io.fail(format!("Can't {action}. No model!"));
            None
        }
    }
}

/// Fills every missing value of one chain from its prior and checks the
/// result has positive density everywhere.
fn complete_values(
    graph: &Graph,
    start: &[Vec<f64>],
    rng: &mut dyn EngineRng,
    chain: usize,
) -> Result<Vec<Vec<f64>>, String> {
    let mut values = start.to_vec();
    for &idx in graph.order() {
        for elem in 0..graph.node(idx).len() {
            if is_na(values[idx][elem]) {
                values[idx][elem] = graph.sample_prior(&values, idx, elem, rng)?;
            }
        }
    }
    match graph
        .order()
        .iter()
        .find(|&&idx| graph.log_density(&values, idx) == f64::NEG_INFINITY)
    {
        Some(&bad) => Err(format!(
            "Node {} inconsistent with parents in chain {chain}",
            graph.node(bad).name
        )),
        None => Ok(values),
    }
}

/// `value` as an integer when it is one exactly and lies in `[min, max]`.
fn exact_integer(value: f64, min: i64, max: i64) -> Option<i64> {
    (value.fract() == 0.0 && value >= min as f64 && value <= max as f64).then(|| value as i64)
}

fn valid_chain(state: &ModelState, chain: usize, io: &mut EngineStreams) -> bool {
    if chain >= state.chains.len() {
        return io.fail(format!("Invalid chain number {chain}"));
    }
    true
}

impl Engine for Console {
    fn check_model(&mut self, model: &mut dyn Read, io: &mut EngineStreams) -> bool {
        let mut text = String::new();
        if let Err(err) = model.read_to_string(&mut text) {
            return io.fail(format!("Unable to read model: {err}"));
        }
        match parser::parse(&text) {
            Ok(program) => {
                tracing::debug!(relations = program.model.len(), "model syntax ok");
                self.model = None;
                self.program = Some(program);
                true
            }
            Err(err) => io.fail(err),
        }
    }

    fn compile(
        &mut self,
        data: &EngineArrays,
        chains: usize,
        generate_data: bool,
        io: &mut EngineStreams,
    ) -> bool {
        let Some(program) = &self.program else {
            return io.fail("Can't compile. No model!");
        };
        if self.model.is_some() {
            return io.fail("Model already compiled");
        }
        if chains == 0 {
            return io.fail("Number of chains must be at least 1");
        }
        let Compiled { graph, notes } = match Graph::compile(program, data, generate_data) {
            Ok(compiled) => compiled,
            Err(message) => return io.fail(message),
        };
        for note in notes {
            io.note(note);
        }
        tracing::debug!(chains, nodes = graph.nodes().len(), "model compiled");
        let chains = (0..chains)
            .map(|_| ChainState {
                values: graph.initial_values(),
                rng: None,
            })
            .collect();
        self.model = Some(ModelState {
            graph,
            chains,
            samplers: Vec::new(),
            monitors: Vec::new(),
            iteration: 0,
            initialized: false,
            adapting: false,
        });
        true
    }

    fn set_parameters(
        &mut self,
        values: &EngineArrays,
        chain: usize,
        io: &mut EngineStreams,
    ) -> bool {
        let Some(state) = compiled(&mut self.model, io, "set initial values") else {
            return false;
        };
        if !valid_chain(state, chain, io) {
            return false;
        }
        let ModelState { graph, chains, .. } = state;

        let mut writes = Vec::new();
        let mut seed = None;
        let mut rng_state = None;
        for (name, array) in values {
            match name.as_str() {
                RNG_SEED_KEY => {
                    let word = match array.values() {
                        [value] => exact_integer(*value, 0, i64::from(u32::MAX)),
                        _ => None,
                    };
                    match word {
                        Some(word) => seed = Some(word as u32),
                        None => {
                            return io.fail(".RNG.seed must be a single integer in [0, 4294967295]")
                        }
                    }
                }
                RNG_STATE_KEY => {
                    let words: Option<Vec<i32>> = array
                        .values()
                        .iter()
                        .map(|&value| {
                            exact_integer(value, i64::from(i32::MIN), i64::from(i32::MAX))
                                .map(|word| word as i32)
                        })
                        .collect();
                    match words {
                        Some(words) => rng_state = Some(words),
                        None => return io.fail(".RNG.state must hold 32-bit integers"),
                    }
                }
                RNG_NAME_KEY => return io.fail("Use set_rng_name to bind .RNG.name"),
                _ => {
                    let Some(idx) = graph.lookup(name) else {
                        return io.fail(format!("Unknown variable {name}"));
                    };
                    let node = graph.node(idx);
                    if !node.is_stochastic() {
                        return io.fail(format!("Cannot set value of constant node {name}"));
                    }
                    if collapse_dims(array.dims()) != collapse_dims(&node.dims) {
                        return io.fail(format!("Dimension mismatch in values supplied for {name}"));
                    }
                    let overwrites = array
                        .values()
                        .iter()
                        .enumerate()
                        .any(|(elem, &value)| {
                            !is_na(value) && node.is_fixed(elem) && value != node.data[elem]
                        });
                    if overwrites {
                        return io.fail(format!("Cannot overwrite value of observed node {name}"));
                    }
                    writes.push((idx, array.values()));
                }
            }
        }

        let target = &mut chains[chain];
        if let Some(words) = rng_state {
            let Some(rng) = target.rng.as_mut() else {
                return io.fail(format!("There is no RNG associated with chain {chain}"));
            };
            if !rng.set_state(&words) {
                return io.fail(format!("Invalid .RNG.state for {}", rng.name()));
            }
        } else if let Some(seed) = seed {
            if target.rng.is_none() {
                target.rng = modules::default_rngs(1).and_then(|mut minted| minted.pop());
            }
            match target.rng.as_mut() {
                Some(rng) => rng.init(seed),
                None => return io.fail("No RNG factories available"),
            }
        }
        for (idx, supplied) in writes {
            let node = graph.node(idx);
            for (elem, &value) in supplied.iter().enumerate() {
                if !is_na(value) && !node.is_fixed(elem) {
                    target.values[idx][elem] = value;
                }
            }
        }
        true
    }

    fn set_rng_name(&mut self, name: &str, chain: usize, io: &mut EngineStreams) -> bool {
        let Some(state) = compiled(&mut self.model, io, "set RNG name") else {
            return false;
        };
        if !valid_chain(state, chain, io) {
            return false;
        }
        match modules::make_rng(name) {
            Some(rng) => {
                state.chains[chain].rng = Some(rng);
                true
            }
            None => io.fail(format!("RNG name {name} not found")),
        }
    }

    fn initialize(&mut self, io: &mut EngineStreams) -> bool {
        let Some(state) = compiled(&mut self.model, io, "initialize") else {
            return false;
        };
        if state.initialized {
            return io.fail("Model already initialized");
        }
        let ModelState {
            graph,
            chains,
            samplers,
            initialized,
            adapting,
            ..
        } = state;

        let mut assigned = Vec::new();
        for &idx in graph.order() {
            let node = graph.node(idx);
            if !node.has_unobserved() {
                continue;
            }
            let kind = match node.family() {
                Some(family) if family.is_discrete() => SamplerKind::Finite,
                _ => SamplerKind::RandomWalk,
            };
            if !modules::sampler_active(kind.name()) {
                return io.fail(format!("Unable to find appropriate sampler for {}", node.name));
            }
            assigned.push(Sampler::new(kind, idx, chains.len()));
        }

        let missing = chains.iter().filter(|chain| chain.rng.is_none()).count();
        let mut minted = match missing {
            0 => Vec::new(),
            count => match modules::default_rngs(count) {
                Some(minted) => minted,
                None => return io.fail("No RNG factories available"),
            },
        }
        .into_iter();
        let mut fresh: Vec<Option<Box<dyn EngineRng>>> = chains
            .iter()
            .map(|chain| chain.rng.is_none().then(|| minted.next()).flatten())
            .collect();
        let snapshots: Vec<Option<Vec<i32>>> = chains
            .iter()
            .map(|chain| chain.rng.as_ref().map(|rng| rng.state()))
            .collect();

        let mut completed = Vec::with_capacity(chains.len());
        let mut failure = None;
        for (chain_idx, (chain, fresh)) in chains.iter_mut().zip(fresh.iter_mut()).enumerate() {
            let Some(rng) = chain.rng.as_mut().or(fresh.as_mut()) else {
                failure = Some(format!("There is no RNG associated with chain {chain_idx}"));
                break;
            };
            match complete_values(graph, &chain.values, &mut **rng, chain_idx) {
                Ok(values) => completed.push(values),
                Err(message) => {
                    failure = Some(message);
                    break;
                }
            }
        }
        if let Some(message) = failure {
            for (chain, snapshot) in chains.iter_mut().zip(snapshots) {
                if let (Some(rng), Some(words)) = (chain.rng.as_mut(), snapshot) {
                    rng.set_state(&words);
                }
            }
            return io.fail(message);
        }

        for ((chain, values), fresh) in chains.iter_mut().zip(completed).zip(fresh) {
            chain.values = values;
            if chain.rng.is_none() {
                chain.rng = fresh;
            }
        }
        *adapting = assigned.iter().any(Sampler::is_adaptive);
        *samplers = assigned;
        *initialized = true;
        tracing::debug!(samplers = samplers.len(), adapting = *adapting, "model initialized");
        true
    }

    fn update(&mut self, iterations: u64, io: &mut EngineStreams) -> bool {
        let Some(state) = initialized(&mut self.model, io, "update") else {
            return false;
        };
        let ModelState {
            graph,
            chains,
            samplers,
            monitors,
            iteration,
            adapting,
            ..
        } = state;
        for _ in 0..iterations {
            for (chain_idx, chain) in chains.iter_mut().enumerate() {
                let Some(rng) = chain.rng.as_mut() else {
                    return io.fail(format!("There is no RNG associated with chain {chain_idx}"));
                };
                for sampler in samplers.iter_mut() {
                    sampler.step(graph, chain_idx, &mut chain.values, &mut **rng, *adapting);
                }
            }
            *iteration += 1;
            for monitor in monitors.iter_mut() {
                let node = monitor.node();
                monitor.record(
                    *iteration,
                    chains.iter().map(|chain| chain.values[node].as_slice()),
                );
            }
        }
        true
    }

    fn set_monitor(&mut self, name: &str, thin: u32, kind: &str, io: &mut EngineStreams) -> bool {
        let Some(state) = initialized(&mut self.model, io, "set monitor") else {
            return false;
        };
        if thin == 0 {
            return io.fail("Thinning interval must be at least 1");
        }
        let Some(monitor_kind) =
            MonitorKind::from_label(kind).filter(|_| modules::monitor_available(kind))
        else {
            return io.fail(format!(
                "Failed to set {kind} monitor for {name}: unknown monitor type"
            ));
        };
        let Some(node) = state.graph.lookup(name) else {
            return io.fail(format!("Failed to set {kind} monitor for {name}: unknown variable"));
        };
        if state
            .monitors
            .iter()
            .any(|monitor| monitor.name() == name && monitor.kind() == monitor_kind)
        {
            return io.fail(format!("Failed to set {kind} monitor for {name}: already set"));
        }
        if state.adapting {
            state.adapting = false;
            io.note("NOTE: Stopping adaptation");
        }
        let dims = state.graph.node(node).dims.clone();
        state.monitors.push(Monitor::new(
            node,
            name,
            dims,
            monitor_kind,
            thin,
            state.iteration + 1,
            state.chains.len(),
        ));
        true
    }

    fn clear_monitor(&mut self, name: &str, kind: &str, io: &mut EngineStreams) -> bool {
        let Some(state) = compiled(&mut self.model, io, "clear monitor") else {
            return false;
        };
        match state
            .monitors
            .iter()
            .position(|monitor| monitor.name() == name && monitor.kind().label() == kind)
        {
            Some(position) => {
                state.monitors.remove(position);
                true
            }
            None => io.fail(format!("Failed to clear {kind} monitor for node {name}")),
        }
    }

    fn dump_state(
        &mut self,
        out: &mut StateDump,
        kind: DumpType,
        chain: usize,
        io: &mut EngineStreams,
    ) -> bool {
        let Some(state) = compiled(&mut self.model, io, "dump state") else {
            return false;
        };
        if !valid_chain(state, chain, io) {
            return false;
        }
        let current = &state.chains[chain];
        out.values.clear();
        for (idx, node) in state.graph.nodes().iter().enumerate() {
            let values: Vec<f64> = match kind {
                DumpType::Data if node.is_stochastic() && !node.has_observed() => continue,
                DumpType::Data => node.data.clone(),
                DumpType::Parameters if !node.has_unobserved() => continue,
                DumpType::Parameters => current.values[idx]
                    .iter()
                    .zip(&node.data)
                    .map(|(&value, &fixed)| if is_na(fixed) { value } else { NA })
                    .collect(),
                DumpType::All => current.values[idx].clone(),
            };
            out.values.insert(node.name.clone(), node.to_array(&values));
        }
        if let (Some(rng), DumpType::Parameters | DumpType::All) = (&current.rng, kind) {
            let words: Vec<f64> = rng.state().into_iter().map(f64::from).collect();
            out.values
                .insert(RNG_STATE_KEY.to_string(), SArray::vector(words));
        }
        out.rng_name = current
            .rng
            .as_ref()
            .map(|rng| rng.name().to_string())
            .unwrap_or_default();
        true
    }

    fn dump_monitors(
        &mut self,
        out: &mut EngineArrays,
        kind: &str,
        flat: bool,
        io: &mut EngineStreams,
    ) -> bool {
        let Some(state) = compiled(&mut self.model, io, "dump monitors") else {
            return false;
        };
        out.clear();
        for monitor in state
            .monitors
            .iter()
            .filter(|monitor| monitor.kind().label() == kind)
        {
            match monitor.dump(flat) {
                Ok(array) => {
                    out.insert(monitor.name().to_string(), array);
                }
                Err(message) => return io.fail(message),
            }
        }
        if out.is_empty() {
            return io.fail(format!("No {kind} monitors set"));
        }
        true
    }

    fn dump_samplers(&mut self, out: &mut Vec<SamplerInfo>, io: &mut EngineStreams) -> bool {
        let Some(state) = initialized(&mut self.model, io, "dump samplers") else {
            return false;
        };
        out.clear();
        out.extend(state.samplers.iter().map(|sampler| SamplerInfo {
            name: sampler.kind().name().to_string(),
            nodes: vec![state.graph.node(sampler.node()).name.clone()],
        }));
        true
    }

    fn adapt_off(&mut self, io: &mut EngineStreams) -> bool {
        let Some(state) = initialized(&mut self.model, io, "adapt off") else {
            return false;
        };
        state.adapting = false;
        true
    }

    fn check_adaptation(&mut self, status: &mut bool, io: &mut EngineStreams) -> bool {
        let Some(state) = initialized(&mut self.model, io, "check adaptation") else {
            return false;
        };
        *status = state.samplers.iter().all(Sampler::converged);
        true
    }

    fn iteration(&self) -> u64 {
        self.model.as_ref().map_or(0, |state| state.iteration)
    }

    fn variable_names(&self) -> Vec<String> {
        self.program
            .as_ref()
            .map(Program::variable_names)
            .unwrap_or_default()
    }

    fn nchain(&self) -> usize {
        self.model.as_ref().map_or(0, |state| state.chains.len())
    }

    fn is_adapting(&self) -> bool {
        self.model.as_ref().map_or(false, |state| state.adapting)
    }

    fn clear_model(&mut self, _io: &mut EngineStreams) -> bool {
        self.model = None;
        self.program = None;
        true
    }
}
