pub mod classify;
pub mod config;
pub mod delta;
pub mod error;
pub mod events;
pub mod graph;
pub mod lifting;
pub mod mapping;
pub mod propagate;
pub mod reflexion;
pub mod snapshot;
pub mod state;
pub mod types;
