use serde::{Deserialize, Serialize};

/// Tunables of the classification rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflexionConfig {
    /// A dependency from a component to one of its enclosing components is
    /// implicitly allowed when no architecture edge allows it.
    pub allow_dependencies_to_parents: bool,
}

impl Default for ReflexionConfig {
    fn default() -> Self {
        ReflexionConfig { allow_dependencies_to_parents: true }
    }
}

impl ReflexionConfig {
    pub fn strict() -> Self {
        ReflexionConfig { allow_dependencies_to_parents: false }
    }
}
