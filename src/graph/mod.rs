//! The Strategy Graph: a typed dataflow DAG executed against time-indexed
//! bar data (spec §3). A graph is validated and fingerprinted once, then
//! never mutated in place; the Compiler/Mutator own new graphs until they
//! are handed to the Evolution Driver.

mod catalogue;
mod fingerprint;
mod validate;

pub use catalogue::{ComparisonOp, NodeKind, OutputType, ParamDecl, PortDecl};
pub use fingerprint::Fingerprint;
pub use validate::validate_graph;

use crate::{impl_add_sub_mul_div_primitive, impl_from_primitive};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A node's identifier, unique within one graph (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable content-independent graph identifier, assigned once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphId(pub uuid::Uuid);
impl_from_primitive!(GraphId, uuid::Uuid);

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl GraphId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

/// Generation index within a run. Generation 0 is Adam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Generation(pub u32);
impl_from_primitive!(Generation, u32);
impl_add_sub_mul_div_primitive!(Generation, u32);

/// A scalar/string/bool parameter value attached to a node (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ParamValue::Null)
    }
}

/// A reference to another node's named output: `"<node_id>.<output_name>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub output: String,
}

impl PortRef {
    pub fn parse(raw: &str) -> Option<Self> {
        let (node, output) = raw.rsplit_once('.')?;
        Some(Self {
            node: NodeId(node.to_string()),
            output: output.to_string(),
        })
    }
}

impl std::fmt::Display for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.node, self.output)
    }
}

/// One node in a `StrategyGraph` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub params: HashMap<String, ParamValue>,
    pub inputs: HashMap<String, PortRef>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: NodeId(id.into()),
            kind,
            params: HashMap::new(),
            inputs: HashMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn with_input(mut self, port: impl Into<String>, src: PortRef) -> Self {
        self.inputs.insert(port.into(), src);
        self
    }
}

/// A typed dataflow DAG over a fixed node catalogue (spec §3).
///
/// Invariant: once constructed via [`StrategyGraph::new`] and passed through
/// [`validate_graph`], a graph is never mutated in place; the executor only
/// ever borrows it read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyGraph {
    pub graph_id: GraphId,
    pub parent_graph_id: Option<GraphId>,
    pub generation: Generation,
    pub fingerprint: Fingerprint,
    pub nodes: Vec<Node>,
}

impl StrategyGraph {
    /// Builds a graph from nodes, computing its content-derived fingerprint.
    /// Does not validate; call [`validate_graph`] before evaluating.
    pub fn new(nodes: Vec<Node>, parent_graph_id: Option<GraphId>, generation: Generation) -> Self {
        let fingerprint = Fingerprint::of_nodes(&nodes);
        Self {
            graph_id: GraphId::new(),
            parent_graph_id,
            generation,
            fingerprint,
            nodes,
        }
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Topological order of node ids. Errors with `GraphError::Cycle` if the
    /// graph contains one (I1), which [`validate_graph`] also checks.
    pub fn topo_sort(&self) -> crate::error::EvoResult<Vec<NodeId>> {
        let mut indegree: HashMap<&NodeId, usize> = HashMap::new();
        let mut dependents: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        let ids: HashSet<&NodeId> = self.nodes.iter().map(|n| &n.id).collect();

        for node in &self.nodes {
            indegree.entry(&node.id).or_insert(0);
            for src in node.inputs.values() {
                if ids.contains(&src.node) {
                    *indegree.entry(&node.id).or_insert(0) += 1;
                    dependents.entry(&src.node).or_default().push(&node.id);
                }
            }
        }

        let mut queue: Vec<&NodeId> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(id, _)| *id)
            .collect();
        queue.sort();

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut indegree = indegree;
        while let Some(id) = queue.pop() {
            order.push(id.clone());
            if let Some(deps) = dependents.get(id) {
                let mut newly_free = Vec::new();
                for dep in deps {
                    let e = indegree.get_mut(dep).unwrap();
                    *e -= 1;
                    if *e == 0 {
                        newly_free.push(*dep);
                    }
                }
                newly_free.sort();
                queue.extend(newly_free);
            }
        }

        if order.len() != self.nodes.len() {
            return Err(crate::error::GraphError::Cycle.into());
        }
        Ok(order)
    }
}
