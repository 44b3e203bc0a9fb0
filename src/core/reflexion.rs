//! The reflexion analysis: owns the graphs and every derived index, and is the
//! single entry point for mutations once the first `run` has happened.

use std::fmt;

use crate::core::config::ReflexionConfig;
use crate::core::error::GraphError;
use crate::core::events::{ChangeEvent, Observer};
use crate::core::graph::{Edge, ReflexionGraph};
use crate::core::mapping::MappingIndex;
use crate::core::propagate::PropagationTable;
use crate::core::state::EdgeState;
use crate::core::types::{EdgeId, PropagatedKey, SubgraphKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Graphs populated, nothing derived yet.
    Uninitialized,
    /// Propagated edges and classifications are current.
    Ready,
}

/// Incremental reflexion analysis over one [`ReflexionGraph`].
///
/// Populate the graph, hand it over with [`Reflexion::new`], call
/// [`Reflexion::run`] once, then edit it through the incremental operations.
/// After each operation the result equals a from-scratch run over the edited
/// graphs.
pub struct Reflexion {
    pub(crate) graph: ReflexionGraph,
    pub(crate) mapping: MappingIndex,
    pub(crate) propagation: PropagationTable,
    pub(crate) config: ReflexionConfig,
    pub(crate) phase: Phase,
    observers: Vec<Box<dyn Observer>>,
}

impl fmt::Debug for Reflexion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reflexion")
            .field("phase", &self.phase)
            .field("config", &self.config)
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .field("propagated", &self.propagation.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Reflexion {
    pub fn new(graph: ReflexionGraph, config: ReflexionConfig) -> Self {
        Reflexion {
            graph,
            mapping: MappingIndex::default(),
            propagation: PropagationTable::default(),
            config,
            phase: Phase::Uninitialized,
            observers: Vec::new(),
        }
    }

    pub fn register(&mut self, observer: impl Observer + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn graph(&self) -> &ReflexionGraph {
        &self.graph
    }

    pub fn into_graph(self) -> ReflexionGraph {
        self.graph
    }

    pub fn mapping(&self) -> &MappingIndex {
        &self.mapping
    }

    pub fn propagation(&self) -> &PropagationTable {
        &self.propagation
    }

    pub fn config(&self) -> &ReflexionConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn ensure_ready(&self) -> Result<(), GraphError> {
        match self.phase {
            Phase::Ready => Ok(()),
            Phase::Uninitialized => Err(GraphError::NotRun),
        }
    }

    pub(crate) fn notify(&mut self, events: &[ChangeEvent]) {
        for event in events {
            for observer in self.observers.iter_mut() {
                observer.update(event);
            }
        }
    }

    pub fn propagated_edge(&self, key: &PropagatedKey) -> Option<&Edge> {
        self.propagation.edge_id(key).and_then(|id| self.graph.edge(id))
    }

    /// Implementation edges that make up the propagated edge `key`.
    pub fn causes(&self, key: &PropagatedKey) -> Vec<EdgeId> {
        self.propagation.causes(key).collect()
    }

    /// `Unmapped` while an endpoint has no effective mapping, otherwise the
    /// state of the propagated edge the implementation edge contributes to.
    pub fn implementation_state(&self, edge: EdgeId) -> Result<EdgeState, GraphError> {
        self.ensure_ready()?;
        let e = self.graph.edge(edge).ok_or(GraphError::UnknownEdge(edge))?;
        if e.subgraph != SubgraphKind::Implementation {
            return Err(GraphError::WrongEdgeKind {
                expected: SubgraphKind::Implementation,
                found: e.subgraph,
            });
        }
        Ok(self
            .propagation
            .route(edge)
            .and_then(|key| self.propagated_edge(key))
            .map_or(EdgeState::Unmapped, |p| p.state))
    }

    pub fn state(&self, edge: EdgeId) -> Option<EdgeState> {
        self.graph.edge(edge).map(|e| e.state)
    }

    /// Divergent propagated edges plus absent architecture edges.
    pub fn count_violations(&self) -> usize {
        self.graph
            .edges()
            .filter(|e| matches!(e.subgraph, SubgraphKind::Architecture | SubgraphKind::Propagated))
            .filter(|e| e.state.is_violation())
            .count()
    }
}
