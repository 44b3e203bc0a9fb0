//! Change notifications dispatched by the reflexion analysis.
//!
//! Within one operation observers see the mutation event first, then the
//! propagated edges that appeared or disappeared, then every state transition.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::graph::Edge;
use crate::core::state::EdgeState;
use crate::core::types::{NodeId, PropagatedKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeEvent {
    MapsToEdgeAdded(Edge),
    MapsToEdgeRemoved(Edge),
    ImplementationEdgeAdded(Edge),
    ImplementationEdgeRemoved(Edge),
    ArchitectureEdgeAdded(Edge),
    ArchitectureEdgeRemoved(Edge),
    PropagatedEdgeAdded(PropagatedKey),
    PropagatedEdgeRemoved(PropagatedKey),
    /// `edge` is the propagated or architecture edge after the transition.
    EdgeStateChanged {
        edge: Edge,
        old_state: EdgeState,
        new_state: EdgeState,
    },
    HierarchyChanged {
        node: NodeId,
        old_parent: Option<NodeId>,
        new_parent: Option<NodeId>,
    },
}

impl ChangeEvent {
    pub fn is_state_change(&self) -> bool {
        matches!(self, ChangeEvent::EdgeStateChanged { .. })
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::MapsToEdgeAdded(e) => write!(f, "maps_to added {} -> {}", e.from, e.to),
            ChangeEvent::MapsToEdgeRemoved(e) => write!(f, "maps_to removed {} -> {}", e.from, e.to),
            ChangeEvent::ImplementationEdgeAdded(e) => {
                write!(f, "implementation edge added {}", e.key())
            }
            ChangeEvent::ImplementationEdgeRemoved(e) => {
                write!(f, "implementation edge removed {}", e.key())
            }
            ChangeEvent::ArchitectureEdgeAdded(e) => write!(f, "architecture edge added {}", e.key()),
            ChangeEvent::ArchitectureEdgeRemoved(e) => {
                write!(f, "architecture edge removed {}", e.key())
            }
            ChangeEvent::PropagatedEdgeAdded(key) => write!(f, "propagated {key}"),
            ChangeEvent::PropagatedEdgeRemoved(key) => write!(f, "unpropagated {key}"),
            ChangeEvent::EdgeStateChanged { edge, old_state, new_state } => {
                write!(f, "{} edge {}: {old_state} -> {new_state}", edge.subgraph, edge.key())
            }
            ChangeEvent::HierarchyChanged { node, old_parent, new_parent } => {
                write!(f, "node {node} moved from {old_parent:?} to {new_parent:?}")
            }
        }
    }
}

/// Receives every change event synchronously. Must not call back into the analysis.
pub trait Observer {
    fn update(&mut self, event: &ChangeEvent);
}

/// Records events; clones share the same log, so a handle can stay with the
/// caller while another is registered on the analysis.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<ChangeEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains everything recorded so far.
    pub fn take(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn snapshot(&self) -> Vec<ChangeEvent> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl Observer for EventLog {
    fn update(&mut self, event: &ChangeEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// Forwards events to `tracing`: state changes at debug, the rest at trace.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn update(&mut self, event: &ChangeEvent) {
        if event.is_state_change() {
            debug!(%event, "reflexion");
        } else {
            trace!(%event, "reflexion");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EdgeKind;

    #[test]
    fn event_log_clones_share_one_buffer() {
        let log = EventLog::new();
        let mut registered = log.clone();
        registered.update(&ChangeEvent::PropagatedEdgeAdded(PropagatedKey::new(1, 2, EdgeKind::calls())));

        assert_eq!(log.len(), 1);
        assert_eq!(log.take().len(), 1);
        assert!(registered.is_empty());
    }

    #[test]
    fn state_change_display_names_subgraph_and_states() {
        let mut edge = Edge::architecture(1, 2, EdgeKind::calls());
        edge.state = EdgeState::Convergent;
        let event = ChangeEvent::EdgeStateChanged {
            edge,
            old_state: EdgeState::Absent,
            new_state: EdgeState::Convergent,
        };
        assert_eq!(event.to_string(), "architecture edge call(1 -> 2): absent -> convergent");
    }

    #[test]
    fn events_serialize_with_a_tag() {
        let event = ChangeEvent::HierarchyChanged { node: 3, old_parent: None, new_parent: Some(1) };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "hierarchy_changed");
        assert_eq!(json["new_parent"], 1);
    }
}
