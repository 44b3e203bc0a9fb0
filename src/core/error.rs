//! Errors reported by the reflexion graphs and the analysis facade.
//!
//! Every variant describes a rejected operation: the graphs and the analysis
//! state are left exactly as they were before the call.

use thiserror::Error;

use crate::core::types::{EdgeId, NodeId, SubgraphKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("edge {0} does not exist")]
    UnknownEdge(EdgeId),

    #[error("implementation node {impl_node} is not mapped onto architecture node {arch_node}")]
    UnknownMapping { impl_node: NodeId, arch_node: NodeId },

    #[error("implementation node {impl_node} is already mapped onto {existing}, cannot map it onto {requested}")]
    DuplicateDirectMapping {
        impl_node: NodeId,
        existing: NodeId,
        requested: NodeId,
    },

    #[error("node {node} belongs to the {found} graph, expected the {expected} graph")]
    InvalidEndpointKind {
        node: NodeId,
        expected: SubgraphKind,
        found: SubgraphKind,
    },

    /// Nodes belong to the implementation or the architecture graph only.
    #[error("nodes cannot belong to the {0} graph")]
    InvalidNodeKind(SubgraphKind),

    #[error("expected an edge of the {expected} graph, got one of the {found} graph")]
    WrongEdgeKind {
        expected: SubgraphKind,
        found: SubgraphKind,
    },

    #[error("propagated edges are owned by the analysis and cannot be added or removed directly")]
    EngineOwnedEdge,

    /// Making `parent` the parent of `child` would close a cycle in the hierarchy.
    #[error("making {parent} the parent of {child} would create a cycle")]
    CyclicHierarchy { child: NodeId, parent: NodeId },

    #[error("node {0} still has incident edges")]
    NodeHasEdges(NodeId),

    #[error("node {0} still has children")]
    NodeHasChildren(NodeId),

    #[error("the reflexion analysis has not been run yet")]
    NotRun,
}
