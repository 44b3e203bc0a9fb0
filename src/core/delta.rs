// incremental diffs
//every operation validates first, then mutates, then dispatches:
//  mutation event -> propagated edges added/removed -> state transitions
use indexmap::IndexSet;
use tracing::debug;

use crate::core::error::GraphError;
use crate::core::events::ChangeEvent;
use crate::core::graph::{Edge, Node};
use crate::core::propagate::PropagationDelta;
use crate::core::reflexion::Reflexion;
use crate::core::state::EdgeState;
use crate::core::types::{EdgeId, NodeId, SubgraphKind};

impl Reflexion {
    /// Maps `impl_node` directly onto `arch_node` and re-routes every
    /// implementation edge whose effective mapping changed.
    pub fn add_to_mapping(&mut self, impl_node: NodeId, arch_node: NodeId) -> Result<EdgeId, GraphError> {
        self.ensure_ready()?;
        self.graph.expect_subgraph(impl_node, SubgraphKind::Implementation)?;
        self.graph.expect_subgraph(arch_node, SubgraphKind::Architecture)?;
        if let Some(existing) = self.mapping.direct_mapping(impl_node) {
            return Err(GraphError::DuplicateDirectMapping {
                impl_node,
                existing: existing.target,
                requested: arch_node,
            });
        }

        let id = self.graph.set_mapping(impl_node, arch_node)?;
        let affected = self
            .mapping
            .set_direct_mapping(&self.graph, impl_node, arch_node, id)?;
        debug!(impl_node, arch_node, affected = affected.len(), "add to mapping");

        let mut events = Vec::new();
        events.extend(self.graph.edge(id).cloned().map(ChangeEvent::MapsToEdgeAdded));
        events.extend(self.reroute(&affected));
        self.notify(&events);
        Ok(id)
    }

    pub fn delete_from_mapping(&mut self, impl_node: NodeId, arch_node: NodeId) -> Result<(), GraphError> {
        self.ensure_ready()?;
        self.graph.expect_subgraph(impl_node, SubgraphKind::Implementation)?;
        self.graph.expect_subgraph(arch_node, SubgraphKind::Architecture)?;
        let direct = self
            .mapping
            .direct_mapping(impl_node)
            .filter(|m| m.target == arch_node)
            .ok_or(GraphError::UnknownMapping { impl_node, arch_node })?;

        let removed = self.graph.remove_edge(direct.edge)?;
        let affected = self
            .mapping
            .clear_direct_mapping(&self.graph, impl_node)
            .map(|(_, affected)| affected)
            .unwrap_or_default();
        debug!(impl_node, arch_node, affected = affected.len(), "delete from mapping");

        let mut events = vec![ChangeEvent::MapsToEdgeRemoved(removed)];
        events.extend(self.reroute(&affected));
        self.notify(&events);
        Ok(())
    }

    pub fn add_to_implementation(&mut self, edge: Edge) -> Result<EdgeId, GraphError> {
        self.ensure_ready()?;
        expect_edge_kind(&edge, SubgraphKind::Implementation)?;

        let id = self.graph.add_edge(edge)?;
        let Some(edge) = self.graph.edge(id).cloned() else {
            return Err(GraphError::UnknownEdge(id));
        };
        debug!(edge = id, from = edge.from, to = edge.to, kind = %edge.kind, "add to implementation");

        let mut delta = PropagationDelta::default();
        self.propagation
            .on_implementation_edge_added(&edge, &self.mapping, &mut delta);
        let mut events = vec![ChangeEvent::ImplementationEdgeAdded(edge)];
        events.extend(self.settle(delta));
        self.notify(&events);
        Ok(id)
    }

    pub fn delete_from_implementation(&mut self, id: EdgeId) -> Result<(), GraphError> {
        self.ensure_ready()?;
        let edge = self.graph.edge(id).ok_or(GraphError::UnknownEdge(id))?;
        expect_edge_kind(edge, SubgraphKind::Implementation)?;

        let edge = self.graph.remove_edge(id)?;
        debug!(edge = id, from = edge.from, to = edge.to, kind = %edge.kind, "delete from implementation");

        let mut delta = PropagationDelta::default();
        self.propagation.on_implementation_edge_removed(&edge, &mut delta);
        let mut events = vec![ChangeEvent::ImplementationEdgeRemoved(edge)];
        events.extend(self.settle(delta));
        self.notify(&events);
        Ok(())
    }

    pub fn add_to_architecture(&mut self, edge: Edge) -> Result<EdgeId, GraphError> {
        self.ensure_ready()?;
        expect_edge_kind(&edge, SubgraphKind::Architecture)?;

        let mut edge = edge;
        edge.counter = 0;
        edge.state = EdgeState::Specified;
        let id = self.graph.add_edge(edge)?;

        let Some(added) = self.graph.edge(id).cloned() else {
            return Err(GraphError::UnknownEdge(id));
        };
        let covered: IndexSet<EdgeId> = self
            .graph
            .covered_propagated(added.from, added.to, &added.kind)
            .into_iter()
            .collect();
        let counter = self.graph.covered_multiplicity(added.from, added.to, &added.kind);
        if let Some(e) = self.graph.edge_mut(id) {
            e.counter = counter;
        }
        debug!(edge = id, from = added.from, to = added.to, kind = %added.kind, covered = covered.len(), "add to architecture");

        let mut events = vec![ChangeEvent::ArchitectureEdgeAdded(added)];
        events.extend(self.reclassify_edges(&covered, &IndexSet::from([id])));
        self.notify(&events);
        Ok(id)
    }

    pub fn delete_from_architecture(&mut self, id: EdgeId) -> Result<(), GraphError> {
        self.ensure_ready()?;
        let edge = self.graph.edge(id).ok_or(GraphError::UnknownEdge(id))?;
        expect_edge_kind(edge, SubgraphKind::Architecture)?;

        let covered: IndexSet<EdgeId> = self
            .graph
            .covered_propagated(edge.from, edge.to, &edge.kind)
            .into_iter()
            .collect();
        let removed = self.graph.remove_edge(id)?;
        debug!(edge = id, from = removed.from, to = removed.to, kind = %removed.kind, covered = covered.len(), "delete from architecture");

        let mut events = vec![ChangeEvent::ArchitectureEdgeRemoved(removed)];
        events.extend(self.reclassify_edges(&covered, &IndexSet::new()));
        self.notify(&events);
        Ok(())
    }

    /// Adds a node after the analysis has run. A new implementation node
    /// inherits the effective mapping of its parent.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, GraphError> {
        self.ensure_ready()?;
        let id = self.graph.add_node(node)?;
        self.mapping.node_added(&self.graph, id);
        debug!(node = id, "node added");
        Ok(id)
    }

    /// Removes a leaf node without incident edges (mapping edges included).
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, GraphError> {
        self.ensure_ready()?;
        let node = self.graph.remove_node(id)?;
        self.mapping.node_removed(id);
        debug!(node = id, name = %node.name, "node removed");
        Ok(node)
    }

    /// Moves `child` under `parent` (or makes it a root).
    ///
    /// Moving an implementation node re-routes its subtree like a mapping
    /// change; moving an architecture node recounts the architecture edges
    /// whose scope may have changed and reclassifies the propagated edges
    /// attached to the moved subtree.
    ///
    /// A cyclic move is rejected with `GraphError::CyclicHierarchy` before
    /// anything changes, like every other invalid precondition.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> Result<(), GraphError> {
        self.ensure_ready()?;
        let subgraph = self.graph.node_subgraph(child)?;
        let old_parent = self.graph.parent(child);
        if old_parent == parent {
            //still validate the target
            if let Some(p) = parent {
                self.graph.expect_subgraph(p, subgraph)?;
            }
            return Ok(());
        }

        let mut events = Vec::new();
        match subgraph {
            SubgraphKind::Implementation => {
                self.graph.set_parent(child, parent)?;
                events.push(ChangeEvent::HierarchyChanged { node: child, old_parent, new_parent: parent });
                let affected = self.mapping.reparented(&self.graph, child);
                debug!(node = child, ?old_parent, ?parent, affected = affected.len(), "implementation node moved");
                events.extend(self.reroute(&affected));
            }
            _ => {
                let subtree = self.graph.descendants(child);
                let old_chain = old_parent.map(|p| self.graph.ancestors(p)).unwrap_or_default();
                self.graph.set_parent(child, parent)?;
                events.push(ChangeEvent::HierarchyChanged { node: child, old_parent, new_parent: parent });
                let new_chain = parent.map(|p| self.graph.ancestors(p)).unwrap_or_default();

                let mut architecture = IndexSet::new();
                let mut propagated = IndexSet::new();
                for &node in subtree.iter().chain(&old_chain).chain(&new_chain) {
                    architecture.extend(self.graph.outgoing_in(node, SubgraphKind::Architecture).map(|e| e.id));
                    architecture.extend(self.graph.incoming_in(node, SubgraphKind::Architecture).map(|e| e.id));
                }
                for &node in &subtree {
                    propagated.extend(self.graph.outgoing_in(node, SubgraphKind::Propagated).map(|e| e.id));
                    propagated.extend(self.graph.incoming_in(node, SubgraphKind::Propagated).map(|e| e.id));
                }
                self.recount_architecture(&architecture);
                debug!(
                    node = child,
                    ?old_parent,
                    ?parent,
                    architecture = architecture.len(),
                    propagated = propagated.len(),
                    "architecture node moved"
                );
                events.extend(self.reclassify_edges(&propagated, &architecture));
            }
        }
        self.notify(&events);
        Ok(())
    }

    //old contribution out, new contribution in, one transaction for the whole set
    fn reroute(&mut self, affected: &[NodeId]) -> Vec<ChangeEvent> {
        let mut delta = PropagationDelta::default();
        self.propagation
            .on_mapping_changed(&self.graph, &self.mapping, affected, &mut delta);
        self.settle(delta)
    }

    fn recount_architecture(&mut self, architecture: &IndexSet<EdgeId>) {
        for &id in architecture {
            let Some(edge) = self.graph.edge(id) else { continue };
            let counter = self.graph.covered_multiplicity(edge.from, edge.to, &edge.kind);
            if let Some(e) = self.graph.edge_mut(id) {
                e.counter = counter;
            }
        }
    }
}

fn expect_edge_kind(edge: &Edge, expected: SubgraphKind) -> Result<(), GraphError> {
    if edge.subgraph != expected {
        if edge.subgraph == SubgraphKind::Propagated {
            return Err(GraphError::EngineOwnedEdge);
        }
        return Err(GraphError::WrongEdgeKind { expected, found: edge.subgraph });
    }
    Ok(())
}
