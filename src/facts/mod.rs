//! Input documents for the analysis: nodes, edges and mapping by name.

pub mod loader;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::config::ReflexionConfig;
use crate::core::error::GraphError;
use crate::core::types::SubgraphKind;

pub use loader::{from_toon, read_facts, to_toon};

/// A node of the implementation or the architecture graph. Names are unique
/// per graph; `parent` names a node of the same graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFact {
    pub name: String,
    pub graph: SubgraphKind,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeFact {
    pub from: String,
    pub to: String,
    pub graph: SubgraphKind,
    pub kind: String,
    #[serde(default)]
    pub optional: bool,
}

/// Implementation node `from` maps onto architecture node `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingFact {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facts {
    #[serde(default)]
    pub config: ReflexionConfig,
    #[serde(default)]
    pub nodes: Vec<NodeFact>,
    #[serde(default)]
    pub edges: Vec<EdgeFact>,
    #[serde(default)]
    pub mapping: Vec<MappingFact>,
}

#[derive(Debug, thiserror::Error)]
pub enum FactsError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed facts: {0}")]
    Decode(String),

    #[error("cannot encode facts: {0}")]
    Encode(String),

    #[error("{graph} node '{name}' is declared twice")]
    DuplicateNode { graph: SubgraphKind, name: String },

    #[error("no {graph} node named '{name}'")]
    UnknownNode { graph: SubgraphKind, name: String },

    #[error("edges must belong to the implementation or the architecture graph, got {0}")]
    UnsupportedEdgeGraph(SubgraphKind),

    #[error(transparent)]
    Graph(#[from] GraphError),
}
