//! Deterministic, comparable views of an analysis result.
//!
//! Propagated edges are identified by key rather than by arena id, so an
//! incrementally maintained analysis and a fresh one over the same graphs
//! produce equal snapshots.

use serde::{Deserialize, Serialize};

use crate::core::error::GraphError;
use crate::core::reflexion::Reflexion;
use crate::core::state::EdgeState;
use crate::core::types::{EdgeId, EdgeKind, NodeId, PropagatedKey, SubgraphKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagatedEntry {
    pub key: PropagatedKey,
    pub multiplicity: u32,
    pub state: EdgeState,
    /// Sorted ids of the implementation edges behind the key.
    pub causes: Vec<EdgeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureEntry {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    pub optional: bool,
    pub counter: u32,
    pub state: EdgeState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationEntry {
    pub id: EdgeId,
    pub state: EdgeState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub propagated: Vec<PropagatedEntry>,
    pub architecture: Vec<ArchitectureEntry>,
    pub implementation: Vec<ImplementationEntry>,
}

/// Edge counts per classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub convergent: usize,
    pub absent: usize,
    pub allowed_absent: usize,
    pub allowed: usize,
    pub implicitly_allowed: usize,
    pub divergent: usize,
    pub unmapped: usize,
    pub propagated: usize,
}

impl Summary {
    pub fn violations(&self) -> usize {
        self.absent + self.divergent
    }
}

impl Snapshot {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            propagated: self.propagated.len(),
            ..Summary::default()
        };
        let states = self
            .propagated
            .iter()
            .map(|p| p.state)
            .chain(self.architecture.iter().map(|a| a.state))
            .chain(
                self.implementation
                    .iter()
                    .map(|i| i.state)
                    .filter(|s| *s == EdgeState::Unmapped),
            );
        for state in states {
            match state {
                EdgeState::Convergent => summary.convergent += 1,
                EdgeState::Absent => summary.absent += 1,
                EdgeState::AllowedAbsent => summary.allowed_absent += 1,
                EdgeState::Allowed => summary.allowed += 1,
                EdgeState::ImplicitlyAllowed => summary.implicitly_allowed += 1,
                EdgeState::Divergent => summary.divergent += 1,
                EdgeState::Unmapped => summary.unmapped += 1,
                EdgeState::Undefined | EdgeState::Specified => {}
            }
        }
        summary
    }

    pub fn propagated_entry(&self, key: &PropagatedKey) -> Option<&PropagatedEntry> {
        self.propagated
            .binary_search_by(|p| p.key.cmp(key))
            .ok()
            .map(|i| &self.propagated[i])
    }
}

impl Reflexion {
    pub fn snapshot(&self) -> Snapshot {
        let mut propagated: Vec<PropagatedEntry> = self
            .graph
            .edges_in(SubgraphKind::Propagated)
            .map(|e| {
                let key = e.key();
                let mut causes: Vec<EdgeId> = self.propagation.causes(&key).collect();
                causes.sort_unstable();
                PropagatedEntry {
                    multiplicity: self.propagation.multiplicity(&key),
                    state: e.state,
                    causes,
                    key,
                }
            })
            .collect();
        propagated.sort_by(|a, b| a.key.cmp(&b.key));

        //edges live in a BTreeMap, so both lists below are already sorted by id
        let architecture = self
            .graph
            .edges_in(SubgraphKind::Architecture)
            .map(|e| ArchitectureEntry {
                id: e.id,
                from: e.from,
                to: e.to,
                kind: e.kind.clone(),
                optional: e.optional,
                counter: e.counter,
                state: e.state,
            })
            .collect();
        let implementation = self
            .graph
            .edges_in(SubgraphKind::Implementation)
            .map(|e| ImplementationEntry {
                id: e.id,
                state: self
                    .propagation
                    .route(e.id)
                    .and_then(|key| self.propagated_edge(key))
                    .map_or(EdgeState::Unmapped, |p| p.state),
            })
            .collect();

        Snapshot { propagated, architecture, implementation }
    }

    /// Result of a fresh from-scratch analysis over a copy of the current
    /// graphs. Observers are not involved.
    pub fn recompute_snapshot(&self) -> Result<Snapshot, GraphError> {
        let mut graph = self.graph.clone();
        graph.clear_propagated();
        for arch in graph.edges_in_mut(SubgraphKind::Architecture) {
            arch.counter = 0;
            arch.state = EdgeState::Specified;
        }
        let mut fresh = Reflexion::new(graph, self.config.clone());
        fresh.run()?;
        Ok(fresh.snapshot())
    }

    pub fn summary(&self) -> Summary {
        self.snapshot().summary()
    }
}
