// node/edge arena shared by the implementation, architecture, mapping and propagated graphs
use std::collections::{BTreeMap, HashMap};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::core::error::GraphError;
use crate::core::state::EdgeState;
use crate::core::types::{EdgeId, EdgeKind, NodeId, PropagatedKey, SubgraphKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub node_type: String,
    pub subgraph: SubgraphKind,
    pub parent: Option<NodeId>,
    pub children: IndexSet<NodeId>,
}

impl Node {
    pub fn new(name: impl Into<String>, subgraph: SubgraphKind, parent: Option<NodeId>) -> Self {
        Node {
            id: 0, // overwritten by add_node
            name: name.into(),
            node_type: String::new(),
            subgraph,
            parent,
            children: IndexSet::new(),
        }
    }

    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = node_type.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    pub subgraph: SubgraphKind,
    pub state: EdgeState,
    /// Multiplicity for propagated edges; for architecture edges the summed
    /// multiplicity of every propagated edge they cover. Unused otherwise.
    pub counter: u32,
    /// Architecture edges only: an uncovered optional edge is not an absence.
    pub optional: bool,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, kind: EdgeKind, subgraph: SubgraphKind) -> Self {
        let state = if subgraph == SubgraphKind::Architecture {
            EdgeState::Specified
        } else {
            EdgeState::Undefined
        };
        Edge {
            id: 0, // overwritten by add_edge
            from,
            to,
            kind,
            subgraph,
            state,
            counter: 0,
            optional: false,
        }
    }

    pub fn implementation(from: NodeId, to: NodeId, kind: EdgeKind) -> Self {
        Edge::new(from, to, kind, SubgraphKind::Implementation)
    }

    pub fn architecture(from: NodeId, to: NodeId, kind: EdgeKind) -> Self {
        Edge::new(from, to, kind, SubgraphKind::Architecture)
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn key(&self) -> PropagatedKey {
        PropagatedKey::of(self)
    }
}

/// Single owned arena holding every node and edge of the analysis.
///
/// Nodes form a forest per subgraph through their `parent` pointers. Edges are
/// indexed by both endpoints so hierarchy walks and incident-edge lookups stay
/// proportional to the local neighbourhood.
#[derive(Debug, Clone, Default)]
pub struct ReflexionGraph {
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    pub(crate) edges: BTreeMap<EdgeId, Edge>,
    outgoing: HashMap<NodeId, IndexSet<EdgeId>>,
    incoming: HashMap<NodeId, IndexSet<EdgeId>>,
    next_node: NodeId,
    next_edge: EdgeId,
}

impl ReflexionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- nodes ----

    pub fn add_node(&mut self, mut node: Node) -> Result<NodeId, GraphError> {
        if !matches!(node.subgraph, SubgraphKind::Implementation | SubgraphKind::Architecture) {
            return Err(GraphError::InvalidNodeKind(node.subgraph));
        }
        if let Some(parent) = node.parent {
            let found = self.node_subgraph(parent)?;
            if found != node.subgraph {
                return Err(GraphError::InvalidEndpointKind { node: parent, expected: node.subgraph, found });
            }
        }

        let id = self.next_node;
        node.id = id;
        node.children.clear();
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.insert(id);
        }
        self.nodes.insert(id, node);
        self.next_node += 1;
        Ok(id)
    }

    /// Removes a leaf node without incident edges.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, GraphError> {
        let node = self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))?;
        if !node.children.is_empty() {
            return Err(GraphError::NodeHasChildren(id));
        }
        if self.degree(id) > 0 {
            return Err(GraphError::NodeHasEdges(id));
        }

        let node = self.nodes.remove(&id).ok_or(GraphError::UnknownNode(id))?;
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.shift_remove(&id);
        }
        self.outgoing.remove(&id);
        self.incoming.remove(&id);
        Ok(node)
    }

    /// Moves `child` under `parent` (or makes it a root); returns the previous parent.
    ///
    /// A move that would put `child` below itself is rejected with
    /// `GraphError::CyclicHierarchy` and leaves the hierarchy untouched; the
    /// forest invariant is never violated, so no caller has to recover from it.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> Result<Option<NodeId>, GraphError> {
        let subgraph = self.node_subgraph(child)?;
        if let Some(parent) = parent {
            let found = self.node_subgraph(parent)?;
            if found != subgraph {
                return Err(GraphError::InvalidEndpointKind { node: parent, expected: subgraph, found });
            }
            if self.is_within(parent, child) {
                return Err(GraphError::CyclicHierarchy { child, parent });
            }
        }

        let old = self.parent(child);
        if old == parent {
            return Ok(old);
        }
        if let Some(old_parent) = old.and_then(|p| self.nodes.get_mut(&p)) {
            old_parent.children.shift_remove(&child);
        }
        if let Some(new_parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            new_parent.children.insert(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = parent;
        }
        Ok(old)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_subgraph(&self, id: NodeId) -> Result<SubgraphKind, GraphError> {
        self.nodes
            .get(&id)
            .map(|n| n.subgraph)
            .ok_or(GraphError::UnknownNode(id))
    }

    pub(crate) fn expect_subgraph(&self, node: NodeId, expected: SubgraphKind) -> Result<(), GraphError> {
        let found = self.node_subgraph(node)?;
        if found != expected {
            return Err(GraphError::InvalidEndpointKind { node, expected, found });
        }
        Ok(())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    pub fn nodes_in(&self, subgraph: SubgraphKind) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values().filter(move |n| n.subgraph == subgraph)
    }

    pub fn find_node(&self, subgraph: SubgraphKind, name: &str) -> Option<NodeId> {
        self.nodes_in(subgraph).find(|n| n.name == name).map(|n| n.id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ---- hierarchy ----

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(&id)
            .into_iter()
            .flat_map(|n| n.children.iter().copied())
    }

    /// `id` followed by its parent, grandparent, ... up to the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut cursor = self.nodes.get(&id).map(|n| n.id);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.parent(current);
        }
        chain
    }

    /// `id` and every node below it, in pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        if !self.nodes.contains_key(&id) {
            return result;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            result.push(current);
            let mut children: Vec<NodeId> = self.children(current).collect();
            children.reverse();
            stack.extend(children);
        }
        result
    }

    /// True if `ancestor` is `node` itself or one of its ancestors.
    pub fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = self.nodes.get(&node).map(|n| n.id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    pub fn is_strict_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        node != ancestor && self.is_within(node, ancestor)
    }

    // ---- edges ----

    pub fn add_edge(&mut self, edge: Edge) -> Result<EdgeId, GraphError> {
        if edge.subgraph == SubgraphKind::Propagated {
            return Err(GraphError::EngineOwnedEdge);
        }
        self.check_endpoints(&edge)?;
        Ok(self.insert_edge(edge))
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Result<Edge, GraphError> {
        let edge = self.edges.get(&id).ok_or(GraphError::UnknownEdge(id))?;
        if edge.subgraph == SubgraphKind::Propagated {
            return Err(GraphError::EngineOwnedEdge);
        }
        self.take_edge(id).ok_or(GraphError::UnknownEdge(id))
    }

    fn check_endpoints(&self, edge: &Edge) -> Result<(), GraphError> {
        let (from_kind, to_kind) = match edge.subgraph {
            SubgraphKind::Implementation => (SubgraphKind::Implementation, SubgraphKind::Implementation),
            SubgraphKind::Architecture | SubgraphKind::Propagated => {
                (SubgraphKind::Architecture, SubgraphKind::Architecture)
            }
            SubgraphKind::Mapping => (SubgraphKind::Implementation, SubgraphKind::Architecture),
        };
        self.expect_subgraph(edge.from, from_kind)?;
        self.expect_subgraph(edge.to, to_kind)
    }

    /// Inserts an edge whose endpoints the caller has already validated.
    pub(crate) fn insert_edge(&mut self, mut edge: Edge) -> EdgeId {
        let id = self.next_edge;
        self.next_edge += 1;
        edge.id = id;
        self.outgoing.entry(edge.from).or_default().insert(id);
        self.incoming.entry(edge.to).or_default().insert(id);
        self.edges.insert(id, edge);
        id
    }

    pub(crate) fn take_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(&id)?;
        if let Some(out) = self.outgoing.get_mut(&edge.from) {
            out.shift_remove(&id);
        }
        if let Some(inc) = self.incoming.get_mut(&edge.to) {
            inc.shift_remove(&id);
        }
        Some(edge)
    }

    pub(crate) fn clear_propagated(&mut self) {
        let ids: Vec<EdgeId> = self
            .edges_in(SubgraphKind::Propagated)
            .map(|e| e.id)
            .collect();
        for id in ids {
            self.take_edge(id);
        }
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub(crate) fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(&id)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.values()
    }

    pub fn edges_in(&self, subgraph: SubgraphKind) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.values().filter(move |e| e.subgraph == subgraph)
    }

    pub(crate) fn edges_in_mut(&mut self, subgraph: SubgraphKind) -> impl Iterator<Item = &mut Edge> + '_ {
        self.edges.values_mut().filter(move |e| e.subgraph == subgraph)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn outgoing(&self, node: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.outgoing
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id))
    }

    pub fn incoming(&self, node: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.incoming
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id))
    }

    pub fn outgoing_in(&self, node: NodeId, subgraph: SubgraphKind) -> impl Iterator<Item = &Edge> + '_ {
        self.outgoing(node).filter(move |e| e.subgraph == subgraph)
    }

    pub fn incoming_in(&self, node: NodeId, subgraph: SubgraphKind) -> impl Iterator<Item = &Edge> + '_ {
        self.incoming(node).filter(move |e| e.subgraph == subgraph)
    }

    fn degree(&self, node: NodeId) -> usize {
        self.outgoing.get(&node).map_or(0, |s| s.len()) + self.incoming.get(&node).map_or(0, |s| s.len())
    }
}
