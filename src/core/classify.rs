// classification logic
/*

Propagated edge (first rule that applies):
    source == target                         -> ImplicitlyAllowed
    covered by an architecture edge          -> Allowed
    source below target (parents allowed)    -> ImplicitlyAllowed
    otherwise                                -> Divergent

Architecture edge:
    counter > 0                              -> Convergent
    counter == 0, optional                   -> AllowedAbsent
    counter == 0                             -> Absent

counter of an architecture edge = summed multiplicity of the propagated edges it covers.
every covering architecture edge is convergent, not only the closest one.

*/
use std::collections::HashMap;

use indexmap::IndexSet;
use tracing::info;

use crate::core::error::GraphError;
use crate::core::events::ChangeEvent;
use crate::core::graph::Edge;
use crate::core::mapping::MappingIndex;
use crate::core::propagate::{PropagationDelta, PropagationTable};
use crate::core::reflexion::{Phase, Reflexion};
use crate::core::state::EdgeState;
use crate::core::types::{EdgeId, PropagatedKey, SubgraphKind};

impl Reflexion {
    pub(crate) fn classify_propagated(&self, edge: &Edge) -> EdgeState {
        if edge.from == edge.to {
            EdgeState::ImplicitlyAllowed
        } else if self.graph.is_lifted(edge.from, edge.to, &edge.kind) {
            EdgeState::Allowed
        } else if self.config.allow_dependencies_to_parents && self.graph.is_strict_descendant(edge.from, edge.to) {
            EdgeState::ImplicitlyAllowed
        } else {
            EdgeState::Divergent
        }
    }

    pub(crate) fn classify_architecture(edge: &Edge) -> EdgeState {
        if edge.counter > 0 {
            EdgeState::Convergent
        } else if edge.optional {
            EdgeState::AllowedAbsent
        } else {
            EdgeState::Absent
        }
    }

    //Run a full reflexion analysis from scratch:
    // - rebuilds the mapping index and the propagation table
    // - recounts every architecture edge
    // - classifies everything and reports what differs from the previous result
    //the first run reports every propagated edge as added.
    pub fn run(&mut self) -> Result<(), GraphError> {
        let mapping = MappingIndex::rebuild(&self.graph)?;
        let previous: HashMap<PropagatedKey, EdgeState> = self
            .graph
            .edges_in(SubgraphKind::Propagated)
            .map(|e| (e.key(), e.state))
            .collect();

        self.graph.clear_propagated();
        self.mapping = mapping;
        self.propagation = PropagationTable::default();

        let mut delta = PropagationDelta::default();
        let impl_edges: Vec<Edge> = self
            .graph
            .edges_in(SubgraphKind::Implementation)
            .cloned()
            .collect();
        for edge in &impl_edges {
            self.propagation
                .on_implementation_edge_added(edge, &self.mapping, &mut delta);
        }
        let changes = self.propagation.commit(&mut self.graph, delta);

        for arch in self.graph.edges_in_mut(SubgraphKind::Architecture) {
            arch.counter = 0;
        }

        let mut added = Vec::new();
        let mut propagated = IndexSet::new();
        for change in &changes {
            self.adjust_architecture_counters(&change.key, change.delta());
            let Some(id) = change.edge else { continue };
            match previous.get(&change.key) {
                //same key as before the run: keep the memoized state so only real changes surface
                Some(&state) => {
                    if let Some(e) = self.graph.edge_mut(id) {
                        e.state = state;
                    }
                }
                None => added.push(ChangeEvent::PropagatedEdgeAdded(change.key.clone())),
            }
            propagated.insert(id);
        }

        let mut vanished: Vec<&PropagatedKey> = previous
            .keys()
            .filter(|k| self.propagation.edge_id(k).is_none())
            .collect();
        vanished.sort();
        let mut events: Vec<ChangeEvent> = vanished
            .into_iter()
            .map(|k| ChangeEvent::PropagatedEdgeRemoved(k.clone()))
            .collect();
        events.extend(added);

        let architecture: IndexSet<EdgeId> = self
            .graph
            .edges_in(SubgraphKind::Architecture)
            .map(|e| e.id)
            .collect();
        events.extend(self.reclassify_edges(&propagated, &architecture));

        self.phase = Phase::Ready;
        info!(
            implementation_edges = impl_edges.len(),
            propagated = self.propagation.len(),
            architecture_edges = architecture.len(),
            pending = self.propagation.pending_edges().len(),
            events = events.len(),
            "reflexion analysis computed from scratch"
        );
        self.notify(&events);
        Ok(())
    }

    /// Re-derives the state of the given propagated and architecture edges,
    /// dispatches and returns the transitions. Edges whose state is already
    /// current produce nothing.
    pub fn reclassify(&mut self, keys: &[PropagatedKey], architecture: &[EdgeId]) -> Result<Vec<ChangeEvent>, GraphError> {
        self.ensure_ready()?;
        let propagated: IndexSet<EdgeId> = keys.iter().filter_map(|k| self.propagation.edge_id(k)).collect();
        let architecture: IndexSet<EdgeId> = architecture.iter().copied().collect();
        let events = self.reclassify_edges(&propagated, &architecture);
        self.notify(&events);
        Ok(events)
    }

    pub(crate) fn reclassify_edges(
        &mut self,
        propagated: &IndexSet<EdgeId>,
        architecture: &IndexSet<EdgeId>,
    ) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        for &id in propagated {
            let Some(edge) = self.graph.edge(id) else { continue };
            if edge.subgraph != SubgraphKind::Propagated {
                continue;
            }
            let state = self.classify_propagated(edge);
            events.extend(self.transition(id, state));
        }
        for &id in architecture {
            let Some(edge) = self.graph.edge(id) else { continue };
            if edge.subgraph != SubgraphKind::Architecture {
                continue;
            }
            let state = Self::classify_architecture(edge);
            events.extend(self.transition(id, state));
        }
        events
    }

    fn transition(&mut self, id: EdgeId, new_state: EdgeState) -> Option<ChangeEvent> {
        let edge = self.graph.edge_mut(id)?;
        if edge.state == new_state {
            return None;
        }
        let old_state = edge.state;
        edge.state = new_state;
        Some(ChangeEvent::EdgeStateChanged {
            edge: edge.clone(),
            old_state,
            new_state,
        })
    }

    //applies a multiplicity change of `key` to every architecture edge covering it.
    //returns the architecture edges touched.
    pub(crate) fn adjust_architecture_counters(&mut self, key: &PropagatedKey, delta: i64) -> Vec<EdgeId> {
        let lifted = self.graph.lift(key.from, key.to, &key.kind);
        for &id in &lifted {
            if let Some(arch) = self.graph.edge_mut(id) {
                let counter = i64::from(arch.counter) + delta;
                if counter < 0 {
                    panic!("negative multiplicity: architecture edge {id} would drop to {counter} applying {delta} for {key}");
                }
                arch.counter = counter as u32;
            }
        }
        lifted
    }

    /// Commits a propagation delta: events for propagated edges that appeared
    /// or vanished, architecture counters, then the resulting state transitions.
    pub(crate) fn settle(&mut self, delta: PropagationDelta) -> Vec<ChangeEvent> {
        let changes = self.propagation.commit(&mut self.graph, delta);
        let mut events = Vec::new();
        let mut propagated = IndexSet::new();
        let mut architecture = IndexSet::new();
        for change in &changes {
            architecture.extend(self.adjust_architecture_counters(&change.key, change.delta()));
            if change.is_destruction() {
                events.push(ChangeEvent::PropagatedEdgeRemoved(change.key.clone()));
            } else if change.is_creation() {
                events.push(ChangeEvent::PropagatedEdgeAdded(change.key.clone()));
                propagated.extend(change.edge);
            }
        }
        events.extend(self.reclassify_edges(&propagated, &architecture));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ReflexionConfig;
    use crate::core::events::EventLog;
    use crate::core::graph::{Node, ReflexionGraph};
    use crate::core::types::{EdgeKind, NodeId};

    fn mk_node(g: &mut ReflexionGraph, name: &str, subgraph: SubgraphKind, parent: Option<NodeId>) -> NodeId {
        g.add_node(Node::new(name, subgraph, parent)).unwrap()
    }

    fn mk_edge(from: NodeId, to: NodeId, subgraph: SubgraphKind, kind: EdgeKind) -> Edge {
        Edge::new(from, to, kind, subgraph)
    }

    fn analyse(g: ReflexionGraph, config: ReflexionConfig) -> (Reflexion, EventLog) {
        let log = EventLog::new();
        let mut r = Reflexion::new(g, config);
        r.register(log.clone());
        r.run().unwrap();
        (r, log)
    }

    #[test]
    fn run_marks_convergent_allowed_and_no_divergence() {
        let mut g = ReflexionGraph::new();

        //architecture nodes
        let ui = mk_node(&mut g, "UI", SubgraphKind::Architecture, None);
        let service = mk_node(&mut g, "Service", SubgraphKind::Architecture, None);

        //implementation nodes
        let login_page = mk_node(&mut g, "LoginPage", SubgraphKind::Implementation, None);
        let user_service = mk_node(&mut g, "UserService", SubgraphKind::Implementation, None);

        //arch edge UI -> Service (specified)
        let arch_eid = g
            .add_edge(mk_edge(ui, service, SubgraphKind::Architecture, EdgeKind::calls()))
            .unwrap();

        //impl edge LoginPage -> UserService
        let impl_eid = g
            .add_edge(mk_edge(login_page, user_service, SubgraphKind::Implementation, EdgeKind::calls()))
            .unwrap();

        //mapping impl -> arch
        g.set_mapping(login_page, ui).unwrap();
        g.set_mapping(user_service, service).unwrap();

        //act
        let (r, log) = analyse(g, ReflexionConfig::default());
        assert_eq!(r.phase(), Phase::Ready);

        //assert arch edge convergent + counter incremented
        let arch_edge = r.graph().edge(arch_eid).unwrap();
        assert_eq!(arch_edge.state, EdgeState::Convergent);
        assert_eq!(arch_edge.counter, 1);

        //impl edge inherits the state of the propagated edge it lifted onto
        assert_eq!(r.implementation_state(impl_eid).unwrap(), EdgeState::Allowed);
        let key = PropagatedKey::new(ui, service, EdgeKind::calls());
        assert_eq!(r.propagated_edge(&key).unwrap().state, EdgeState::Allowed);
        assert_eq!(r.causes(&key), vec![impl_eid]);

        assert_eq!(r.count_violations(), 0);

        //first run: the propagated edge appears, then both states settle
        let events = log.take();
        assert_eq!(events[0], ChangeEvent::PropagatedEdgeAdded(key));
        assert_eq!(events.iter().filter(|e| e.is_state_change()).count(), 2);
    }

    ///architecture has UI -> Service specified, but impl has no corresponding edge.
    #[test]
    fn mismatch_missing_impl_edge_marks_arch_absent() {
        let mut g = ReflexionGraph::new();

        let ui = mk_node(&mut g, "UI", SubgraphKind::Architecture, None);
        let service = mk_node(&mut g, "Service", SubgraphKind::Architecture, None);

        let e_arch = g
            .add_edge(mk_edge(ui, service, SubgraphKind::Architecture, EdgeKind::depends_on()))
            .unwrap();

        //no impl edges at all
        let (r, log) = analyse(g, ReflexionConfig::default());

        let arch_e = r.graph().edge(e_arch).unwrap();
        assert_eq!(arch_e.state, EdgeState::Absent);
        assert_eq!(arch_e.counter, 0);
        assert_eq!(r.count_violations(), 1);
        assert!(matches!(
            log.take().as_slice(),
            [ChangeEvent::EdgeStateChanged { old_state: EdgeState::Specified, new_state: EdgeState::Absent, .. }]
        ));
    }

    ///architecture specifies only UI -> Service.
    ///implementation produces UI -> DB (mapped), which is not specified.
    #[test]
    fn mismatch_divergent_impl_edge_is_marked_divergent() {
        let mut g = ReflexionGraph::new();

        //arch nodes
        let ui = mk_node(&mut g, "UI", SubgraphKind::Architecture, None);
        let service = mk_node(&mut g, "Service", SubgraphKind::Architecture, None);
        let db = mk_node(&mut g, "DB", SubgraphKind::Architecture, None);

        //only specified edge: UI -> Service
        let e_arch = g
            .add_edge(mk_edge(ui, service, SubgraphKind::Architecture, EdgeKind::depends_on()))
            .unwrap();

        //impl nodes
        let login = mk_node(&mut g, "LoginPage", SubgraphKind::Implementation, None);
        let db_impl = mk_node(&mut g, "DBClient", SubgraphKind::Implementation, None);

        //mapping: LoginPage -> UI, DBClient -> DB
        g.set_mapping(login, ui).unwrap();
        g.set_mapping(db_impl, db).unwrap();

        //impl edge: LoginPage -> DBClient (mapped to UI -> DB), which is NOT specified
        let e_impl = g
            .add_edge(mk_edge(login, db_impl, SubgraphKind::Implementation, EdgeKind::depends_on()))
            .unwrap();

        let (r, _log) = analyse(g, ReflexionConfig::default());

        assert_eq!(r.implementation_state(e_impl).unwrap(), EdgeState::Divergent);
        assert_eq!(r.graph().edge(e_arch).unwrap().state, EdgeState::Absent);
        assert_eq!(r.count_violations(), 2);
    }

    ///impl edge endpoints have no maps_to entries: nothing propagates.
    #[test]
    fn mismatch_unmapped_impl_edge_marks_unmapped() {
        let mut g = ReflexionGraph::new();

        let a = mk_node(&mut g, "A_Impl", SubgraphKind::Implementation, None);
        let b = mk_node(&mut g, "B_Impl", SubgraphKind::Implementation, None);

        let e_impl = g
            .add_edge(mk_edge(a, b, SubgraphKind::Implementation, EdgeKind::depends_on()))
            .unwrap();

        let (r, log) = analyse(g, ReflexionConfig::default());

        assert_eq!(r.implementation_state(e_impl).unwrap(), EdgeState::Unmapped);
        assert!(r.propagation().is_empty());
        assert_eq!(r.propagation().pending_edges(), vec![e_impl]);
        assert!(log.is_empty());
    }

    #[test]
    fn propagated_self_loop_is_implicitly_allowed_and_converges_an_arch_self_loop() {
        let mut g = ReflexionGraph::new();
        let core = mk_node(&mut g, "Core", SubgraphKind::Architecture, None);
        let other = mk_node(&mut g, "Other", SubgraphKind::Architecture, None);
        let i1 = mk_node(&mut g, "i1", SubgraphKind::Implementation, None);
        let i2 = mk_node(&mut g, "i2", SubgraphKind::Implementation, None);
        g.set_mapping(i1, core).unwrap();
        g.set_mapping(i2, core).unwrap();
        g.add_edge(mk_edge(i1, i2, SubgraphKind::Implementation, EdgeKind::calls()))
            .unwrap();
        let on_core = g
            .add_edge(mk_edge(core, core, SubgraphKind::Architecture, EdgeKind::calls()))
            .unwrap();
        let on_other = g
            .add_edge(mk_edge(other, other, SubgraphKind::Architecture, EdgeKind::calls()))
            .unwrap();

        let (r, _log) = analyse(g, ReflexionConfig::default());

        let key = PropagatedKey::new(core, core, EdgeKind::calls());
        assert_eq!(r.propagated_edge(&key).unwrap().state, EdgeState::ImplicitlyAllowed);
        assert_eq!(r.state(on_core), Some(EdgeState::Convergent));
        assert_eq!(r.state(on_other), Some(EdgeState::Absent), "architecture self-loops are not special");
    }

    /// Platform ⊃ Net; an edge from inside Net to Platform itself.
    fn dependency_to_parent() -> (ReflexionGraph, PropagatedKey) {
        let mut g = ReflexionGraph::new();
        let platform = mk_node(&mut g, "Platform", SubgraphKind::Architecture, None);
        let net = mk_node(&mut g, "Net", SubgraphKind::Architecture, Some(platform));
        let socket = mk_node(&mut g, "Socket", SubgraphKind::Implementation, None);
        let runtime = mk_node(&mut g, "Runtime", SubgraphKind::Implementation, None);
        g.set_mapping(socket, net).unwrap();
        g.set_mapping(runtime, platform).unwrap();
        g.add_edge(mk_edge(socket, runtime, SubgraphKind::Implementation, EdgeKind::calls()))
            .unwrap();
        (g, PropagatedKey::new(net, platform, EdgeKind::calls()))
    }

    #[test]
    fn dependency_to_parent_is_implicitly_allowed_unless_disabled() {
        let (g, key) = dependency_to_parent();
        let (r, _) = analyse(g, ReflexionConfig::default());
        assert_eq!(r.propagated_edge(&key).unwrap().state, EdgeState::ImplicitlyAllowed);

        let (g, key) = dependency_to_parent();
        let (r, _) = analyse(g, ReflexionConfig::strict());
        assert_eq!(r.propagated_edge(&key).unwrap().state, EdgeState::Divergent);
    }

    #[test]
    fn optional_arch_edge_without_implementation_is_allowed_absent() {
        let mut g = ReflexionGraph::new();
        let ui = mk_node(&mut g, "UI", SubgraphKind::Architecture, None);
        let cache = mk_node(&mut g, "Cache", SubgraphKind::Architecture, None);
        let e = g
            .add_edge(Edge::architecture(ui, cache, EdgeKind::calls()).with_optional(true))
            .unwrap();

        let (r, _) = analyse(g, ReflexionConfig::default());
        assert_eq!(r.state(e), Some(EdgeState::AllowedAbsent));
        assert_eq!(r.count_violations(), 0);
    }

    #[test]
    fn every_covering_level_converges_and_counts_the_full_multiplicity() {
        let mut g = ReflexionGraph::new();
        let front = mk_node(&mut g, "Front", SubgraphKind::Architecture, None);
        let ui = mk_node(&mut g, "UI", SubgraphKind::Architecture, Some(front));
        let back = mk_node(&mut g, "Back", SubgraphKind::Architecture, None);
        let service = mk_node(&mut g, "Service", SubgraphKind::Architecture, Some(back));
        let coarse = g
            .add_edge(mk_edge(front, back, SubgraphKind::Architecture, EdgeKind::calls()))
            .unwrap();
        let fine = g
            .add_edge(mk_edge(ui, service, SubgraphKind::Architecture, EdgeKind::calls()))
            .unwrap();

        let page = mk_node(&mut g, "Page", SubgraphKind::Implementation, None);
        let form = mk_node(&mut g, "Form", SubgraphKind::Implementation, None);
        let handler = mk_node(&mut g, "Handler", SubgraphKind::Implementation, None);
        g.set_mapping(page, ui).unwrap();
        g.set_mapping(form, front).unwrap();
        g.set_mapping(handler, service).unwrap();
        g.add_edge(mk_edge(page, handler, SubgraphKind::Implementation, EdgeKind::calls()))
            .unwrap();
        g.add_edge(mk_edge(form, handler, SubgraphKind::Implementation, EdgeKind::calls()))
            .unwrap();

        let (r, _) = analyse(g, ReflexionConfig::default());

        assert_eq!(r.graph().edge(coarse).unwrap().counter, 2);
        assert_eq!(r.graph().edge(fine).unwrap().counter, 1);
        assert_eq!(r.state(coarse), Some(EdgeState::Convergent));
        assert_eq!(r.state(fine), Some(EdgeState::Convergent));
        let front_key = PropagatedKey::new(front, service, EdgeKind::calls());
        assert_eq!(r.propagated_edge(&front_key).unwrap().state, EdgeState::Allowed);
    }

    #[test]
    fn running_again_reports_nothing() {
        let mut g = ReflexionGraph::new();
        let ui = mk_node(&mut g, "UI", SubgraphKind::Architecture, None);
        let db = mk_node(&mut g, "DB", SubgraphKind::Architecture, None);
        let page = mk_node(&mut g, "Page", SubgraphKind::Implementation, None);
        let sql = mk_node(&mut g, "Sql", SubgraphKind::Implementation, None);
        g.set_mapping(page, ui).unwrap();
        g.set_mapping(sql, db).unwrap();
        g.add_edge(mk_edge(page, sql, SubgraphKind::Implementation, EdgeKind::calls()))
            .unwrap();
        g.add_edge(mk_edge(db, ui, SubgraphKind::Architecture, EdgeKind::calls()))
            .unwrap();

        let (mut r, log) = analyse(g, ReflexionConfig::default());
        assert!(!log.take().is_empty());
        let before = r.snapshot();

        r.run().unwrap();
        assert!(log.is_empty());
        assert_eq!(r.snapshot(), before);
    }

    #[test]
    fn reclassify_is_silent_when_states_are_current() {
        let mut g = ReflexionGraph::new();
        let ui = mk_node(&mut g, "UI", SubgraphKind::Architecture, None);
        let db = mk_node(&mut g, "DB", SubgraphKind::Architecture, None);
        let arch = g
            .add_edge(mk_edge(ui, db, SubgraphKind::Architecture, EdgeKind::calls()))
            .unwrap();

        let mut r = Reflexion::new(g, ReflexionConfig::default());
        assert_eq!(r.reclassify(&[], &[arch]).unwrap_err(), GraphError::NotRun);

        r.run().unwrap();
        let key = PropagatedKey::new(ui, db, EdgeKind::calls());
        assert!(r.reclassify(&[key], &[arch]).unwrap().is_empty());
    }
}
