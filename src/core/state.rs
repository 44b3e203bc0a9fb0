// reflexion states of edges
use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of an edge in the reflexion model.
///
/// Architecture edges move between `Specified`, `Absent`, `AllowedAbsent`
/// and `Convergent`. Propagated edges start `Undefined` and settle on
/// `Allowed`, `ImplicitlyAllowed` or `Divergent`. `Unmapped` is only ever
/// reported for implementation edges whose endpoints are not both mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeState {
    Undefined,
    Specified,
    Absent,
    AllowedAbsent,
    Convergent,
    Allowed,
    ImplicitlyAllowed,
    Divergent,
    Unmapped,
}

impl EdgeState {
    pub fn is_violation(self) -> bool {
        matches!(self, EdgeState::Divergent | EdgeState::Absent)
    }
}

impl fmt::Display for EdgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeState::Undefined => "undefined",
            EdgeState::Specified => "specified",
            EdgeState::Absent => "absent",
            EdgeState::AllowedAbsent => "allowed_absent",
            EdgeState::Convergent => "convergent",
            EdgeState::Allowed => "allowed",
            EdgeState::ImplicitlyAllowed => "implicitly_allowed",
            EdgeState::Divergent => "divergent",
            EdgeState::Unmapped => "unmapped",
        };
        f.write_str(name)
    }
}
