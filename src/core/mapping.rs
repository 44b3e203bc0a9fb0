// maps_to edges and effective (transitive) mapping
use std::collections::HashMap;

use tracing::debug;

use crate::core::error::GraphError;
use crate::core::graph::{Edge, ReflexionGraph};
use crate::core::types::{EdgeId, EdgeKind, NodeId, SubgraphKind};

impl ReflexionGraph {
    //store a direct mapping from implementation node to architecture node as a maps_to edge.
    //1. impl_node must exist and must be in the Implementation subgraph.
    //2. arch_node must exist and must be in the Architecture subgraph.
    //3. each impl node maps to at most one arch node; many impl nodes may share an arch node.
    //used to populate the graphs before the analysis runs; afterwards go through Reflexion::add_to_mapping.
    pub fn set_mapping(&mut self, impl_node: NodeId, arch_node: NodeId) -> Result<EdgeId, GraphError> {
        self.expect_subgraph(impl_node, SubgraphKind::Implementation)?;
        self.expect_subgraph(arch_node, SubgraphKind::Architecture)?;

        if let Some(existing) = self.get_arch_node(impl_node)? {
            return Err(GraphError::DuplicateDirectMapping { impl_node, existing, requested: arch_node });
        }
        self.add_edge(Edge::new(impl_node, arch_node, EdgeKind::maps_to(), SubgraphKind::Mapping))
    }

    //returns Ok(Some(arch)) if directly mapped, Ok(None) if not. errors only if impl_node
    //doesn't exist or lives in the wrong subgraph.
    pub fn get_arch_node(&self, impl_node: NodeId) -> Result<Option<NodeId>, GraphError> {
        self.expect_subgraph(impl_node, SubgraphKind::Implementation)?;
        Ok(self
            .outgoing_in(impl_node, SubgraphKind::Mapping)
            .next()
            .map(|e| e.to))
    }

    pub fn is_mapped(&self, impl_node: NodeId) -> Result<bool, GraphError> {
        Ok(self.get_arch_node(impl_node)?.is_some())
    }

    //for reports
    pub fn iter_mapping(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.edges_in(SubgraphKind::Mapping).map(|e| (e.from, e.to))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectMapping {
    pub target: NodeId,
    pub edge: EdgeId,
}

/// Resolves implementation nodes to their effective architecture node.
///
/// The effective mapping of a node is the target of the nearest ancestor
/// (inclusive) carrying a direct mapping. It is cached for every node, so a
/// lookup is O(1); a mapping change only rewrites the subtree below the
/// changed node, cut at nested direct mappings.
#[derive(Debug, Clone, Default)]
pub struct MappingIndex {
    explicit: HashMap<NodeId, DirectMapping>,
    effective: HashMap<NodeId, NodeId>,
}

impl MappingIndex {
    /// Builds the index from the maps_to edges currently in `graph`.
    pub fn rebuild(graph: &ReflexionGraph) -> Result<Self, GraphError> {
        let mut index = MappingIndex::default();
        for edge in graph.edges_in(SubgraphKind::Mapping) {
            if let Some(existing) = index.explicit.get(&edge.from) {
                return Err(GraphError::DuplicateDirectMapping {
                    impl_node: edge.from,
                    existing: existing.target,
                    requested: edge.to,
                });
            }
            index.explicit.insert(edge.from, DirectMapping { target: edge.to, edge: edge.id });
        }

        //explicit table must be complete before the subtrees are filled,
        //the walk stops at every other mapper
        let mappers: Vec<(NodeId, NodeId)> = index.explicit.iter().map(|(&n, m)| (n, m.target)).collect();
        for (mapper, target) in mappers {
            for node in index.affected_subtree(graph, mapper) {
                index.effective.insert(node, target);
            }
        }
        Ok(index)
    }

    pub fn effective_mapping(&self, impl_node: NodeId) -> Option<NodeId> {
        self.effective.get(&impl_node).copied()
    }

    pub fn direct_mapping(&self, impl_node: NodeId) -> Option<DirectMapping> {
        self.explicit.get(&impl_node).copied()
    }

    pub fn is_mapper(&self, impl_node: NodeId) -> bool {
        self.explicit.contains_key(&impl_node)
    }

    pub fn direct_mappings(&self) -> impl Iterator<Item = (NodeId, DirectMapping)> + '_ {
        self.explicit.iter().map(|(&n, &m)| (n, m))
    }

    /// `root` plus its descendants, not descending into nodes that carry
    /// their own direct mapping.
    pub fn affected_subtree(&self, graph: &ReflexionGraph, root: NodeId) -> Vec<NodeId> {
        let mut affected = vec![root];
        let mut stack: Vec<NodeId> = graph.children(root).collect();
        while let Some(node) = stack.pop() {
            if self.is_mapper(node) {
                continue;
            }
            affected.push(node);
            stack.extend(graph.children(node));
        }
        affected
    }

    /// Records a direct mapping and returns the nodes whose effective mapping
    /// now resolves through it.
    pub fn set_direct_mapping(
        &mut self,
        graph: &ReflexionGraph,
        impl_node: NodeId,
        arch_node: NodeId,
        edge: EdgeId,
    ) -> Result<Vec<NodeId>, GraphError> {
        if let Some(existing) = self.explicit.get(&impl_node) {
            return Err(GraphError::DuplicateDirectMapping {
                impl_node,
                existing: existing.target,
                requested: arch_node,
            });
        }

        let affected = self.affected_subtree(graph, impl_node);
        self.explicit.insert(impl_node, DirectMapping { target: arch_node, edge });
        for &node in &affected {
            self.effective.insert(node, arch_node);
        }
        debug!(impl_node, arch_node, affected = affected.len(), "direct mapping set");
        Ok(affected)
    }

    /// Drops the direct mapping of `impl_node`; its subtree falls back to the
    /// mapping of the nearest mapped ancestor, if any. Returns `None` when the
    /// node has no direct mapping.
    pub fn clear_direct_mapping(
        &mut self,
        graph: &ReflexionGraph,
        impl_node: NodeId,
    ) -> Option<(DirectMapping, Vec<NodeId>)> {
        let removed = self.explicit.remove(&impl_node)?;
        let fallback = graph.parent(impl_node).and_then(|p| self.effective_mapping(p));
        let affected = self.affected_subtree(graph, impl_node);
        self.assign(&affected, fallback);
        debug!(impl_node, arch_node = removed.target, ?fallback, affected = affected.len(), "direct mapping cleared");
        Some((removed, affected))
    }

    /// A freshly added leaf inherits the mapping of its parent.
    pub fn node_added(&mut self, graph: &ReflexionGraph, node: NodeId) {
        if let Some(target) = graph.parent(node).and_then(|p| self.effective_mapping(p)) {
            self.effective.insert(node, target);
        }
    }

    pub fn node_removed(&mut self, node: NodeId) {
        self.effective.remove(&node);
        self.explicit.remove(&node);
    }

    /// Re-resolves `node`'s subtree after it moved under a new parent.
    /// A node with its own direct mapping keeps resolving to it, so nothing changes.
    pub fn reparented(&mut self, graph: &ReflexionGraph, node: NodeId) -> Vec<NodeId> {
        if self.is_mapper(node) {
            return Vec::new();
        }
        let target = graph.parent(node).and_then(|p| self.effective_mapping(p));
        let affected = self.affected_subtree(graph, node);
        self.assign(&affected, target);
        affected
    }

    fn assign(&mut self, nodes: &[NodeId], target: Option<NodeId>) {
        for &node in nodes {
            match target {
                Some(t) => self.effective.insert(node, t),
                None => self.effective.remove(&node),
            };
        }
    }
}
