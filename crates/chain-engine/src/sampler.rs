//! Update methods assigned to unobserved nodes.

use crate::graph::Graph;
use crate::modules::{FINITE_SAMPLER, RANDOM_WALK_SAMPLER};
use crate::rng::EngineRng;

/// Iterations per adaptation batch.
pub const ADAPT_BATCH: u32 = 50;
/// Acceptance rate random-walk proposals are tuned toward.
pub const TARGET_ACCEPTANCE: f64 = 0.234;
/// Distance from the target at which adaptation counts as converged.
pub const ACCEPTANCE_TOLERANCE: f64 = 0.1;

const ADAPT_GAIN: f64 = 2.0;

/// Sampling algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerKind {
    /// Exact Gibbs update over `{0, 1}`.
    Finite,
    /// Component-wise Metropolis with an adaptive normal proposal.
    RandomWalk,
}

impl SamplerKind {
    /// Factory name.
    pub fn name(&self) -> &'static str {
        match self {
            SamplerKind::Finite => FINITE_SAMPLER,
            SamplerKind::RandomWalk => RANDOM_WALK_SAMPLER,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Tuning {
    scale: f64,
    accepted: u32,
    proposed: u32,
    batch_iterations: u32,
    last_rate: Option<f64>,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            scale: 1.0,
            accepted: 0,
            proposed: 0,
            batch_iterations: 0,
            last_rate: None,
        }
    }
}

impl Tuning {
    fn close_batch(&mut self) {
        self.batch_iterations += 1;
        if self.batch_iterations < ADAPT_BATCH {
            return;
        }
        if self.proposed > 0 {
            let rate = f64::from(self.accepted) / f64::from(self.proposed);
            self.scale *= ((rate - TARGET_ACCEPTANCE) * ADAPT_GAIN).exp();
            self.last_rate = Some(rate);
        }
        self.accepted = 0;
        self.proposed = 0;
        self.batch_iterations = 0;
    }
}

/// A sampler bound to one node, with per-chain tuning state.
#[derive(Debug, Clone, PartialEq)]
pub struct Sampler {
    kind: SamplerKind,
    node: usize,
    tuning: Vec<Tuning>,
}

impl Sampler {
    /// Creates a sampler for `node` across `chains` chains.
    pub fn new(kind: SamplerKind, node: usize, chains: usize) -> Self {
        Self {
            kind,
            node,
            tuning: vec![Tuning::default(); chains],
        }
    }

    /// Algorithm.
    pub fn kind(&self) -> SamplerKind {
        self.kind
    }

    /// Governed node.
    pub fn node(&self) -> usize {
        self.node
    }

    /// Whether the sampler tunes itself while adapting.
    pub fn is_adaptive(&self) -> bool {
        self.kind == SamplerKind::RandomWalk
    }

    /// True when every chain's last batch acceptance is near the target.
    pub fn converged(&self) -> bool {
        !self.is_adaptive()
            || self.tuning.iter().all(|tune| {
                tune.last_rate
                    .map_or(false, |rate| (rate - TARGET_ACCEPTANCE).abs() <= ACCEPTANCE_TOLERANCE)
            })
    }

    /// Updates every unobserved element of the node for one chain.
    pub fn step(
        &mut self,
        graph: &Graph,
        chain: usize,
        values: &mut [Vec<f64>],
        rng: &mut dyn EngineRng,
        adapting: bool,
    ) {
        let node = self.node;
        for elem in 0..graph.node(node).len() {
            if graph.node(node).is_fixed(elem) {
                continue;
            }
            match self.kind {
                SamplerKind::Finite => finite_step(graph, node, elem, values, rng),
                SamplerKind::RandomWalk => {
                    let tune = &mut self.tuning[chain];
                    let accepted = metropolis_step(graph, node, elem, values, rng, tune.scale);
                    if adapting {
                        tune.proposed += 1;
                        tune.accepted += u32::from(accepted);
                    }
                }
            }
        }
        if adapting && self.is_adaptive() {
            self.tuning[chain].close_batch();
        }
    }
}

fn finite_step(
    graph: &Graph,
    node: usize,
    elem: usize,
    values: &mut [Vec<f64>],
    rng: &mut dyn EngineRng,
) {
    let current = values[node][elem];
    values[node][elem] = 0.0;
    let log_zero = graph.local_log_density(values, node, elem);
    values[node][elem] = 1.0;
    let log_one = graph.local_log_density(values, node, elem);
    let prob_one = match (log_zero.is_finite(), log_one.is_finite()) {
        (false, false) => {
            values[node][elem] = current;
            return;
        }
        (true, false) => 0.0,
        (false, true) => 1.0,
        (true, true) => 1.0 / (1.0 + (log_zero - log_one).exp()),
    };
    values[node][elem] = if rng.uniform() < prob_one { 1.0 } else { 0.0 };
}

fn metropolis_step(
    graph: &Graph,
    node: usize,
    elem: usize,
    values: &mut [Vec<f64>],
    rng: &mut dyn EngineRng,
    scale: f64,
) -> bool {
    let current = values[node][elem];
    let current_energy = -graph.local_log_density(values, node, elem);
    values[node][elem] = current + scale * rng.normal();
    let proposed_energy = -graph.local_log_density(values, node, elem);
    let delta = proposed_energy - current_energy;
    let acceptance = (-delta).exp().min(1.0);
    let draw = rng.uniform();
    let accepted = draw < acceptance;
    if !accepted {
        values[node][elem] = current;
    }
    accepted
}
