// facts files are TOON documents
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::core::graph::{Edge, Node, ReflexionGraph};
use crate::core::types::{EdgeKind, NodeId, SubgraphKind};
use crate::facts::{Facts, FactsError};

pub fn from_toon(input: &str) -> Result<Facts, FactsError> {
    toon_format::decode_default(input).map_err(|e| FactsError::Decode(e.to_string()))
}

pub fn to_toon(facts: &Facts) -> Result<String, FactsError> {
    toon_format::encode_default(facts).map_err(|e| FactsError::Encode(e.to_string()))
}

pub fn read_facts(path: &Path) -> Result<Facts, FactsError> {
    let input = fs::read_to_string(path).map_err(|source| FactsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_toon(&input)
}

impl Facts {
    /// Builds the implementation, architecture and mapping graphs.
    ///
    /// Nodes may be listed in any order: parents are linked once every node
    /// exists.
    pub fn load(&self) -> Result<ReflexionGraph, FactsError> {
        let mut g = ReflexionGraph::new();
        let mut ids: HashMap<(SubgraphKind, &str), NodeId> = HashMap::new();

        for fact in &self.nodes {
            let key = (fact.graph, fact.name.as_str());
            if ids.contains_key(&key) {
                return Err(FactsError::DuplicateNode { graph: fact.graph, name: fact.name.clone() });
            }
            let id = g.add_node(Node::new(fact.name.as_str(), fact.graph, None).with_type(fact.node_type.as_str()))?;
            ids.insert(key, id);
        }

        let lookup = |graph: SubgraphKind, name: &str| {
            ids.get(&(graph, name))
                .copied()
                .ok_or_else(|| FactsError::UnknownNode { graph, name: name.to_string() })
        };

        for fact in &self.nodes {
            if let Some(parent) = &fact.parent {
                let child = lookup(fact.graph, fact.name.as_str())?;
                let parent = lookup(fact.graph, parent.as_str())?;
                g.set_parent(child, Some(parent))?;
            }
        }

        for fact in &self.edges {
            if !matches!(fact.graph, SubgraphKind::Implementation | SubgraphKind::Architecture) {
                return Err(FactsError::UnsupportedEdgeGraph(fact.graph));
            }
            let from = lookup(fact.graph, fact.from.as_str())?;
            let to = lookup(fact.graph, fact.to.as_str())?;
            let edge = Edge::new(from, to, EdgeKind::new(&fact.kind), fact.graph).with_optional(fact.optional);
            g.add_edge(edge)?;
        }

        for fact in &self.mapping {
            let from = lookup(SubgraphKind::Implementation, fact.from.as_str())?;
            let to = lookup(SubgraphKind::Architecture, fact.to.as_str())?;
            g.set_mapping(from, to)?;
        }

        debug!(
            nodes = g.node_count(),
            edges = g.edge_count(),
            mapping = self.mapping.len(),
            "facts loaded"
        );
        Ok(g)
    }
}
