// lifting/hierarchy logic
//does this propagated relationship correspond to something the architecture explicitly allows?
/*

an architecture edge A -> B of type t covers a propagated edge a -> b of type t
iff a lies in the subtree of A and b lies in the subtree of B (both inclusive).

seen from the propagated edge: walk the ancestor pairs of (a, b)
seen from the architecture edge: walk the descendants of A

*/
use std::collections::HashSet;

use crate::core::graph::ReflexionGraph;
use crate::core::types::{EdgeId, EdgeKind, NodeId, SubgraphKind};

impl ReflexionGraph {
    //architecture edges of type `kind` between any (ancestor-of-from, ancestor-of-to) pair.
    //bounded by the depth of the two chains, never a whole-graph scan
    pub fn lift(&self, from: NodeId, to: NodeId, kind: &EdgeKind) -> Vec<EdgeId> {
        let targets: HashSet<NodeId> = self.ancestors(to).into_iter().collect();
        self.ancestors(from)
            .into_iter()
            .flat_map(|source| self.outgoing_in(source, SubgraphKind::Architecture))
            .filter(|e| &e.kind == kind && targets.contains(&e.to))
            .map(|e| e.id)
            .collect()
    }

    pub fn is_lifted(&self, from: NodeId, to: NodeId, kind: &EdgeKind) -> bool {
        !self.lift(from, to, kind).is_empty()
    }

    //propagated edges of type `kind` leaving the subtree of `from` and landing in the subtree of `to`
    pub fn covered_propagated(&self, from: NodeId, to: NodeId, kind: &EdgeKind) -> Vec<EdgeId> {
        self.descendants(from)
            .into_iter()
            .flat_map(|source| self.outgoing_in(source, SubgraphKind::Propagated))
            .filter(|e| &e.kind == kind && self.is_within(e.to, to))
            .map(|e| e.id)
            .collect()
    }

    //summed multiplicity of everything an architecture edge between (from, to) would cover
    pub fn covered_multiplicity(&self, from: NodeId, to: NodeId, kind: &EdgeKind) -> u32 {
        self.covered_propagated(from, to, kind)
            .into_iter()
            .filter_map(|id| self.edge(id))
            .map(|e| e.counter)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::{Edge, Node};

    fn mk_node(g: &mut ReflexionGraph, name: &str, parent: Option<NodeId>) -> NodeId {
        g.add_node(Node::new(name, SubgraphKind::Architecture, parent)).unwrap()
    }

    fn mk_propagated(g: &mut ReflexionGraph, from: NodeId, to: NodeId, counter: u32) -> EdgeId {
        let mut edge = Edge::new(from, to, EdgeKind::calls(), SubgraphKind::Propagated);
        edge.counter = counter;
        g.insert_edge(edge)
    }

    /// top ⊃ {ui ⊃ login, service ⊃ session}, db
    fn layered() -> (ReflexionGraph, [NodeId; 6]) {
        let mut g = ReflexionGraph::new();
        let top = mk_node(&mut g, "top", None);
        let ui = mk_node(&mut g, "ui", Some(top));
        let login = mk_node(&mut g, "login", Some(ui));
        let service = mk_node(&mut g, "service", Some(top));
        let session = mk_node(&mut g, "session", Some(service));
        let db = mk_node(&mut g, "db", None);
        (g, [top, ui, login, service, session, db])
    }

    #[test]
    fn lift_finds_exact_and_ancestor_level_architecture_edges() {
        let (mut g, [top, ui, login, service, session, db]) = layered();
        let exact = g
            .add_edge(Edge::architecture(login, session, EdgeKind::calls()))
            .unwrap();
        let coarse = g
            .add_edge(Edge::architecture(ui, service, EdgeKind::calls()))
            .unwrap();
        let _other_kind = g
            .add_edge(Edge::architecture(ui, service, EdgeKind::depends_on()))
            .unwrap();
        let _unrelated = g.add_edge(Edge::architecture(top, db, EdgeKind::calls())).unwrap();

        let mut found = g.lift(login, session, &EdgeKind::calls());
        found.sort_unstable();
        assert_eq!(found, vec![exact, coarse], "every matching level counts");

        assert_eq!(g.lift(ui, session, &EdgeKind::calls()), vec![coarse]);
        assert!(g.lift(service, ui, &EdgeKind::calls()).is_empty(), "direction matters");
        assert!(!g.is_lifted(login, db, &EdgeKind::depends_on()));
        assert!(g.is_lifted(login, db, &EdgeKind::calls()));
    }

    #[test]
    fn lift_ignores_propagated_edges() {
        let (mut g, [_top, ui, _login, service, _session, _db]) = layered();
        mk_propagated(&mut g, ui, service, 1);
        assert!(g.lift(ui, service, &EdgeKind::calls()).is_empty());
    }

    #[test]
    fn covered_propagated_collects_descendant_pairs_and_sums_multiplicity() {
        let (mut g, [top, ui, login, service, session, db]) = layered();
        let p1 = mk_propagated(&mut g, login, session, 2);
        let p2 = mk_propagated(&mut g, ui, service, 1);
        let _outside = mk_propagated(&mut g, service, ui, 5);
        let _to_db = mk_propagated(&mut g, login, db, 7);

        let mut covered = g.covered_propagated(ui, service, &EdgeKind::calls());
        covered.sort_unstable();
        assert_eq!(covered, vec![p1, p2]);
        assert_eq!(g.covered_multiplicity(ui, service, &EdgeKind::calls()), 3);

        //a self-loop on an ancestor covers everything beneath it, both directions
        assert_eq!(g.covered_multiplicity(top, top, &EdgeKind::calls()), 8);
        assert_eq!(g.covered_multiplicity(ui, service, &EdgeKind::depends_on()), 0);
    }
}
