use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use crate::core::graph::{Edge, ReflexionGraph};
use crate::core::mapping::MappingIndex;
use crate::core::types::{EdgeId, NodeId, PropagatedKey, SubgraphKind};

/// Multiplicities seen before the first touch of each key within one operation.
///
/// Routing changes are applied to the table immediately but only become
/// visible (arena edges created or destroyed) on `PropagationTable::commit`,
/// so a key that drops to zero and comes back inside one operation is never
/// reported.
#[derive(Debug, Default)]
pub struct PropagationDelta {
    before: IndexMap<PropagatedKey, u32>,
}

impl PropagationDelta {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationChange {
    pub key: PropagatedKey,
    pub before: u32,
    pub after: u32,
    /// Arena edge carrying the key after the change, `None` once destroyed.
    pub edge: Option<EdgeId>,
}

impl PropagationChange {
    pub fn is_creation(&self) -> bool {
        self.before == 0 && self.after > 0
    }

    pub fn is_destruction(&self) -> bool {
        self.before > 0 && self.after == 0
    }

    pub fn delta(&self) -> i64 {
        i64::from(self.after) - i64::from(self.before)
    }
}

/// Aggregates implementation edges into propagated edges keyed by
/// (architecture source, architecture target, type).
///
/// Invariant: the multiplicity of a key equals the number of implementation
/// edges recorded as its causes, and an arena edge exists for the key iff
/// that number is positive.
#[derive(Debug, Clone, Default)]
pub struct PropagationTable {
    causes: HashMap<PropagatedKey, IndexSet<EdgeId>>,
    edges: HashMap<PropagatedKey, EdgeId>,
    routes: HashMap<EdgeId, PropagatedKey>,
    // implementation edges waiting for a mapping, keyed by each unmapped endpoint.
    // reporting only: activation goes through the adjacency of the re-mapped nodes
    pending: HashMap<NodeId, IndexSet<EdgeId>>,
}

impl PropagationTable {
    pub fn multiplicity(&self, key: &PropagatedKey) -> u32 {
        self.causes.get(key).map_or(0, |s| count(key, s))
    }

    pub fn edge_id(&self, key: &PropagatedKey) -> Option<EdgeId> {
        self.edges.get(key).copied()
    }

    /// Key the implementation edge currently contributes to.
    pub fn route(&self, impl_edge: EdgeId) -> Option<&PropagatedKey> {
        self.routes.get(&impl_edge)
    }

    /// Implementation edges aggregated into `key`.
    pub fn causes(&self, key: &PropagatedKey) -> impl Iterator<Item = EdgeId> + '_ {
        self.causes.get(key).into_iter().flatten().copied()
    }

    /// True while `edge` has an unmapped endpoint.
    ///
    /// The pending index is a query surface for reports and derived states:
    /// `on_mapping_changed` activates waiting edges by walking the adjacency
    /// of the affected nodes, which covers pending and routed edges alike.
    pub fn is_pending(&self, edge: &Edge) -> bool {
        [edge.from, edge.to]
            .iter()
            .any(|n| self.pending.get(n).is_some_and(|s| s.contains(&edge.id)))
    }

    pub fn pending_at(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.pending.get(&node).into_iter().flatten().copied()
    }

    pub fn pending_edges(&self) -> Vec<EdgeId> {
        let mut all: Vec<EdgeId> = self.pending.values().flatten().copied().collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    /// Live propagated keys with their multiplicity.
    pub fn iter(&self) -> impl Iterator<Item = (&PropagatedKey, u32)> + '_ {
        self.causes
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(k, s)| (k, count(k, s)))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Routes a new implementation edge through the effective mapping of its
    /// endpoints, or parks it as pending when either endpoint is unmapped.
    pub fn on_implementation_edge_added(&mut self, edge: &Edge, mapping: &MappingIndex, delta: &mut PropagationDelta) {
        let from = mapping.effective_mapping(edge.from);
        let to = mapping.effective_mapping(edge.to);

        match (from, to) {
            (Some(from), Some(to)) => {
                let key = PropagatedKey::new(from, to, edge.kind.clone());
                self.touch(&key, delta);
                self.causes.entry(key.clone()).or_default().insert(edge.id);
                trace!(edge = edge.id, %key, "implementation edge propagated");
                self.routes.insert(edge.id, key);
            }
            _ => {
                if from.is_none() {
                    self.pending.entry(edge.from).or_default().insert(edge.id);
                }
                if to.is_none() {
                    self.pending.entry(edge.to).or_default().insert(edge.id);
                }
                trace!(edge = edge.id, "implementation edge pending, endpoint unmapped");
            }
        }
    }

    pub fn on_implementation_edge_removed(&mut self, edge: &Edge, delta: &mut PropagationDelta) {
        self.unpend(edge);
        let Some(key) = self.routes.remove(&edge.id) else {
            return;
        };
        self.touch(&key, delta);
        let counted = self
            .causes
            .get_mut(&key)
            .is_some_and(|s| s.shift_remove(&edge.id));
        if !counted {
            panic!("negative multiplicity: implementation edge {} routed through {key} was never counted", edge.id);
        }
        trace!(edge = edge.id, %key, "implementation edge unpropagated");
    }

    /// Re-routes every implementation edge incident to a node whose effective
    /// mapping changed: old contribution out, new contribution in.
    pub fn on_mapping_changed(
        &mut self,
        graph: &ReflexionGraph,
        mapping: &MappingIndex,
        affected: &[NodeId],
        delta: &mut PropagationDelta,
    ) {
        let mut incident = IndexSet::new();
        for &node in affected {
            incident.extend(graph.outgoing_in(node, SubgraphKind::Implementation).map(|e| e.id));
            incident.extend(graph.incoming_in(node, SubgraphKind::Implementation).map(|e| e.id));
        }
        for id in incident {
            if let Some(edge) = graph.edge(id) {
                self.on_implementation_edge_removed(edge, delta);
                self.on_implementation_edge_added(edge, mapping, delta);
            }
        }
    }

    /// Materializes the net effect of `delta` in the arena: creates propagated
    /// edges whose multiplicity left zero, destroys those that reached zero and
    /// refreshes the counter of the rest. Keys whose multiplicity ended where
    /// it started are not reported.
    pub fn commit(&mut self, graph: &mut ReflexionGraph, delta: PropagationDelta) -> Vec<PropagationChange> {
        let mut changes = Vec::new();
        for (key, before) in delta.before {
            let after = self.multiplicity(&key);
            if after == 0 {
                self.causes.remove(&key);
            }
            if after == before {
                continue;
            }

            let edge = if after == 0 {
                if let Some(id) = self.edges.remove(&key) {
                    graph.take_edge(id);
                }
                None
            } else if before == 0 {
                let mut edge = Edge::new(key.from, key.to, key.kind.clone(), SubgraphKind::Propagated);
                edge.counter = after;
                let id = graph.insert_edge(edge);
                self.edges.insert(key.clone(), id);
                Some(id)
            } else {
                let id = self.edges.get(&key).copied();
                if let Some(e) = id.and_then(|id| graph.edge_mut(id)) {
                    e.counter = after;
                }
                id
            };
            changes.push(PropagationChange { key, before, after, edge });
        }
        changes
    }

    fn touch(&self, key: &PropagatedKey, delta: &mut PropagationDelta) {
        if !delta.before.contains_key(key) {
            delta.before.insert(key.clone(), self.multiplicity(key));
        }
    }

    fn unpend(&mut self, edge: &Edge) {
        for node in [edge.from, edge.to] {
            if let Some(set) = self.pending.get_mut(&node) {
                set.shift_remove(&edge.id);
                if set.is_empty() {
                    self.pending.remove(&node);
                }
            }
        }
    }
}

fn count(key: &PropagatedKey, causes: &IndexSet<EdgeId>) -> u32 {
    u32::try_from(causes.len())
        .unwrap_or_else(|_| panic!("multiplicity overflow: {key} has {} causes", causes.len()))
}

/*
What the tests below pin down:

    1. an implementation edge between mapped nodes is projected into
       architecture space, counter == number of contributing impl edges,
       and the causes set keeps the provenance
    2. edges with an unmapped endpoint create nothing and wait as pending
    3. a propagated edge survives until its last contributor is gone
    4. re-routing inside one delta only reports the net effect
*/
