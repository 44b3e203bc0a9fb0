// ids, subgraph tags and edge type tags
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::graph::Edge;

pub type NodeId = u32;
pub type EdgeId = u32;

/// Which of the reflexion graphs a node or edge belongs to.
///
/// Nodes are only ever `Implementation` or `Architecture`. `Mapping` edges
/// connect an implementation node to an architecture node, `Propagated`
/// edges are synthesized between architecture nodes by the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubgraphKind {
    Implementation,
    Architecture,
    Mapping,
    Propagated,
}

impl fmt::Display for SubgraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubgraphKind::Implementation => "implementation",
            SubgraphKind::Architecture => "architecture",
            SubgraphKind::Mapping => "mapping",
            SubgraphKind::Propagated => "propagated",
        };
        f.write_str(name)
    }
}

/// Dependency type tag of an edge ("call", "depends_on", ...).
///
/// Cloning shares the underlying string; comparison is by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeKind(Arc<str>);

impl EdgeKind {
    pub fn new(name: &str) -> Self {
        EdgeKind(Arc::from(name))
    }

    pub fn calls() -> Self {
        EdgeKind::new("call")
    }

    pub fn depends_on() -> Self {
        EdgeKind::new("depends_on")
    }

    pub fn maps_to() -> Self {
        EdgeKind::new("maps_to")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EdgeKind {
    fn from(name: &str) -> Self {
        EdgeKind::new(name)
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a propagated edge: architecture source, architecture target, type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropagatedKey {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

impl PropagatedKey {
    pub fn new(from: NodeId, to: NodeId, kind: EdgeKind) -> Self {
        PropagatedKey { from, to, kind }
    }

    pub fn of(edge: &Edge) -> Self {
        PropagatedKey::new(edge.from, edge.to, edge.kind.clone())
    }

    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

impl fmt::Display for PropagatedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({} -> {})", self.kind, self.from, self.to)
    }
}
