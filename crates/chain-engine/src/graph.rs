//! Compiled model graph.

use std::collections::VecDeque;

use chain_core::codec::collapse_dims;
use chain_core::{element_count, is_na, EngineArrays, SArray, NA};
use indexmap::IndexMap;

use crate::dist::Family;
use crate::modules;
use crate::parser::{Arg, DimSpec, Program, Relation};
use crate::rng::{EngineRng, WichmannHill};

const DATA_BLOCK_SEED: u32 = 0x5EED;

/// A resolved distribution parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param {
    /// Numeric literal.
    Literal(f64),
    /// Value of another node, broadcast when it has one element.
    Node(usize),
}

/// What a node is.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Fixed values supplied as data.
    Constant,
    /// Values drawn from a distribution.
    Stochastic {
        /// Distribution family.
        family: Family,
        /// Resolved parameters, in family order.
        params: Vec<Param>,
    },
}

/// One variable of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Variable name.
    pub name: String,
    /// Full dimension list.
    pub dims: Vec<usize>,
    /// Node kind.
    pub kind: NodeKind,
    /// Observed or constant values, [`NA`] where unobserved.
    pub data: Vec<f64>,
}

impl Node {
    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the node has no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True for stochastic nodes.
    pub fn is_stochastic(&self) -> bool {
        matches!(self.kind, NodeKind::Stochastic { .. })
    }

    /// Whether element `elem` carries a fixed value.
    pub fn is_fixed(&self, elem: usize) -> bool {
        !is_na(self.data[elem])
    }

    /// True for stochastic nodes with at least one observed element.
    pub fn has_observed(&self) -> bool {
        self.is_stochastic() && self.data.iter().any(|&value| !is_na(value))
    }

    /// True for stochastic nodes with at least one unobserved element.
    pub fn has_unobserved(&self) -> bool {
        self.is_stochastic() && self.data.iter().copied().any(is_na)
    }

    /// Distribution family of a stochastic node.
    pub fn family(&self) -> Option<Family> {
        match &self.kind {
            NodeKind::Stochastic { family, .. } => Some(*family),
            NodeKind::Constant => None,
        }
    }

    /// The node's values wrapped as an engine array.
    pub fn to_array(&self, values: &[f64]) -> SArray {
        SArray::from_parts(self.dims.clone(), values.to_vec())
            .unwrap_or_else(|_| SArray::vector(values.to_vec()))
    }
}

/// Nodes in declaration order plus the dependency structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    nodes: Vec<Node>,
    index: IndexMap<String, usize>,
    order: Vec<usize>,
    children: Vec<Vec<usize>>,
}

/// Result of compiling a program.
#[derive(Debug, Clone)]
pub struct Compiled {
    /// The graph.
    pub graph: Graph,
    /// Informational messages produced while compiling.
    pub notes: Vec<String>,
}

impl Graph {
    /// Builds the graph of `program` against `data`.
    pub fn compile(
        program: &Program,
        data: &EngineArrays,
        generate_data: bool,
    ) -> Result<Compiled, String> {
        let mut merged = data.clone();
        if generate_data && !program.data.is_empty() {
            for (name, array) in generate(&program.data, data)? {
                merged.entry(name).or_insert(array);
            }
        }

        let mut nodes = Vec::new();
        let mut index = IndexMap::new();
        let mut families = Vec::new();
        for relation in &program.model {
            let family = resolve_family(relation)?;
            let (dims, values) = resolve_dims(relation, merged.get(&relation.name))?;
            index.insert(relation.name.clone(), nodes.len());
            families.push(family);
            nodes.push(Node {
                name: relation.name.clone(),
                dims,
                kind: NodeKind::Constant,
                data: values,
            });
        }

        for (node_idx, relation) in program.model.iter().enumerate() {
            let len = nodes[node_idx].len();
            let mut params = Vec::with_capacity(relation.args.len());
            for (position, arg) in relation.args.iter().enumerate() {
                let param = match arg {
                    Arg::Value(value) => Param::Literal(*value),
                    Arg::Var(name) => {
                        let target = match index.get(name) {
                            Some(&target) => target,
                            None => add_constant(name, &merged, &mut nodes, &mut index)?,
                        };
                        let target_len = nodes[target].len();
                        if target_len != 1 && target_len != len {
                            return Err(format!(
                                "Length mismatch in parameter {} of {}",
                                position + 1,
                                relation.name
                            ));
                        }
                        Param::Node(target)
                    }
                };
                params.push(param);
            }
            nodes[node_idx].kind = NodeKind::Stochastic {
                family: families[node_idx],
                params,
            };
        }

        let notes = data
            .keys()
            .filter(|name| !index.contains_key(name.as_str()))
            .map(|name| format!("WARNING: Unused variable \"{name}\" in data"))
            .collect();

        let children = children_of(&nodes);
        let order = topological_order(&nodes, &children)?;
        Ok(Compiled {
            graph: Graph {
                nodes,
                index,
                order,
                children,
            },
            notes,
        })
    }

    /// All nodes in declaration order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node at `idx`.
    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    /// Index of the node called `name`.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Stochastic nodes, parents before children.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Fresh per-chain values: data where fixed, [`NA`] elsewhere.
    pub fn initial_values(&self) -> Vec<Vec<f64>> {
        self.nodes.iter().map(|node| node.data.clone()).collect()
    }

    /// Parameter values of element `elem` of `node`.
    pub fn params_at(&self, values: &[Vec<f64>], node: usize, elem: usize) -> Vec<f64> {
        match &self.nodes[node].kind {
            NodeKind::Stochastic { params, .. } => params
                .iter()
                .map(|param| match param {
                    Param::Literal(value) => *value,
                    Param::Node(source) => {
                        let source = &values[*source];
                        if source.len() == 1 {
                            source[0]
                        } else {
                            source[elem]
                        }
                    }
                })
                .collect(),
            NodeKind::Constant => Vec::new(),
        }
    }

    /// Log density of one element.
    pub fn element_log_density(&self, values: &[Vec<f64>], node: usize, elem: usize) -> f64 {
        match self.nodes[node].family() {
            Some(family) => {
                let params = self.params_at(values, node, elem);
                if params.iter().copied().any(is_na) {
                    return f64::NEG_INFINITY;
                }
                family.log_density(values[node][elem], &params)
            }
            None => 0.0,
        }
    }

    /// Log density of a whole node.
    pub fn log_density(&self, values: &[Vec<f64>], node: usize) -> f64 {
        (0..self.nodes[node].len())
            .map(|elem| self.element_log_density(values, node, elem))
            .sum()
    }

    /// Log of the full conditional of one element, up to a constant.
    pub fn local_log_density(&self, values: &[Vec<f64>], node: usize, elem: usize) -> f64 {
        self.element_log_density(values, node, elem)
            + self.children[node]
                .iter()
                .map(|&child| self.log_density(values, child))
                .sum::<f64>()
    }

    /// Draws element `elem` of `node` from its prior.
    pub fn sample_prior(
        &self,
        values: &[Vec<f64>],
        node: usize,
        elem: usize,
        rng: &mut dyn EngineRng,
    ) -> Result<f64, String> {
        let params = self.params_at(values, node, elem);
        match self.nodes[node].family() {
            Some(family) if family.valid_params(&params) && !params.iter().copied().any(is_na) => {
                Ok(family.sample(&params, rng))
            }
            _ => Err(format!(
                "Unable to generate initial value for {}",
                self.nodes[node].name
            )),
        }
    }
}

fn resolve_family(relation: &Relation) -> Result<Family, String> {
    let family = Family::from_name(&relation.family)
        .filter(|_| modules::has_distribution(&relation.family))
        .ok_or_else(|| format!("Unknown distribution: {}", relation.family))?;
    if relation.args.len() != family.arity() {
        return Err(format!(
            "Incorrect number of parameters for distribution {} in definition of {}",
            relation.family, relation.name
        ));
    }
    Ok(family)
}

fn resolve_dims(
    relation: &Relation,
    supplied: Option<&SArray>,
) -> Result<(Vec<usize>, Vec<f64>), String> {
    let dims = match (&relation.dims, supplied) {
        (DimSpec::Scalar, _) => vec![1],
        (DimSpec::Fixed(extents), _) => extents.clone(),
        (DimSpec::Infer, Some(array)) => array.dims().to_vec(),
        (DimSpec::Infer, None) => {
            return Err(format!("Cannot infer dimensions of {}", relation.name))
        }
    };
    match supplied {
        Some(array) if collapse_dims(array.dims()) != collapse_dims(&dims) => Err(format!(
            "Dimension mismatch between data and model for {}",
            relation.name
        )),
        Some(array) => Ok((dims, array.values().to_vec())),
        None => {
            let len = element_count(&dims)
                .ok_or_else(|| format!("Dimension too large for {}", relation.name))?;
            Ok((dims, vec![NA; len]))
        }
    }
}

fn add_constant(
    name: &str,
    data: &EngineArrays,
    nodes: &mut Vec<Node>,
    index: &mut IndexMap<String, usize>,
) -> Result<usize, String> {
    let array = data
        .get(name)
        .ok_or_else(|| format!("Unknown variable {name}"))?;
    if array.values().iter().copied().any(is_na) {
        return Err(format!("Missing values in constant {name}"));
    }
    let idx = nodes.len();
    nodes.push(Node {
        name: name.to_string(),
        dims: array.dims().to_vec(),
        kind: NodeKind::Constant,
        data: array.values().to_vec(),
    });
    index.insert(name.to_string(), idx);
    Ok(idx)
}

fn children_of(nodes: &[Node]) -> Vec<Vec<usize>> {
    let mut children = vec![Vec::new(); nodes.len()];
    for (child, node) in nodes.iter().enumerate() {
        if let NodeKind::Stochastic { params, .. } = &node.kind {
            for param in params {
                if let Param::Node(parent) = param {
                    if !children[*parent].contains(&child) {
                        children[*parent].push(child);
                    }
                }
            }
        }
    }
    children
}

fn topological_order(nodes: &[Node], children: &[Vec<usize>]) -> Result<Vec<usize>, String> {
    let mut pending = vec![0usize; nodes.len()];
    for kids in children {
        for &child in kids {
            pending[child] += 1;
        }
    }
    let mut ready: VecDeque<usize> = (0..nodes.len()).filter(|&idx| pending[idx] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(idx) = ready.pop_front() {
        if nodes[idx].is_stochastic() {
            order.push(idx);
        }
        for &child in &children[idx] {
            pending[child] -= 1;
            if pending[child] == 0 {
                ready.push_back(child);
            }
        }
    }
    let stuck: Vec<&str> = (0..nodes.len())
        .filter(|&idx| pending[idx] > 0)
        .map(|idx| nodes[idx].name.as_str())
        .collect();
    if !stuck.is_empty() {
        return Err(format!(
            "Possible directed cycle involving {}",
            stuck.join(", ")
        ));
    }
    Ok(order)
}

/// Forward-samples the data block for names the client did not supply.
fn generate(relations: &[Relation], supplied: &EngineArrays) -> Result<EngineArrays, String> {
    let mut rng = WichmannHill::new(DATA_BLOCK_SEED);
    let mut generated = EngineArrays::new();
    for relation in relations {
        if supplied.contains_key(&relation.name) {
            continue;
        }
        let family = resolve_family(relation)?;
        let (dims, mut values) = resolve_dims(relation, None)?;
        let lookup = |name: &str| generated.get(name).or_else(|| supplied.get(name));
        let mut args = Vec::with_capacity(relation.args.len());
        for arg in &relation.args {
            let source = match arg {
                Arg::Value(value) => vec![*value],
                Arg::Var(name) => lookup(name)
                    .ok_or_else(|| format!("Unknown variable {name} in data block"))?
                    .values()
                    .to_vec(),
            };
            if source.len() != 1 && source.len() != values.len() {
                return Err(format!(
                    "Length mismatch in data block definition of {}",
                    relation.name
                ));
            }
            args.push(source);
        }
        for (elem, slot) in values.iter_mut().enumerate() {
            let params: Vec<f64> = args
                .iter()
                .map(|source| if source.len() == 1 { source[0] } else { source[elem] })
                .collect();
            if !family.valid_params(&params) {
                return Err(format!(
                    "Invalid parameters in data block definition of {}",
                    relation.name
                ));
            }
            *slot = family.sample(&params, &mut rng);
        }
        let array = SArray::from_parts(dims, values).map_err(|err| err.to_string())?;
        generated.insert(relation.name.clone(), array);
    }
    Ok(generated)
}
