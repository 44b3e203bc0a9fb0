//! Incremental reflexion analysis.
//!
//! Compares the dependencies of an implementation against an architecture
//! through a mapping, classifies every architecture and propagated edge, and
//! keeps that classification current under edits to any of the three graphs.

pub mod core;
pub mod facts;

pub use crate::core::config::ReflexionConfig;
pub use crate::core::error::GraphError;
pub use crate::core::events::{ChangeEvent, EventLog, Observer, TracingObserver};
pub use crate::core::graph::{Edge, Node, ReflexionGraph};
pub use crate::core::mapping::MappingIndex;
pub use crate::core::propagate::PropagationTable;
pub use crate::core::reflexion::{Phase, Reflexion};
pub use crate::core::snapshot::{Snapshot, Summary};
pub use crate::core::state::EdgeState;
pub use crate::core::types::{EdgeId, EdgeKind, NodeId, PropagatedKey, SubgraphKind};
