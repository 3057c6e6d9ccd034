use serde::{Deserialize, Serialize};

/// How a viewer is connected to someone they follow. Closed set: event
/// visibility maps every variant to exactly one allow flag, so adding a
/// variant here forces the flag mapping to be revisited at compile time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Friend,
    Family,
    Partner,
    Colleague,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 4] = [
        Self::Friend,
        Self::Family,
        Self::Partner,
        Self::Colleague,
    ];
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Friend => write!(f, "friend"),
            Self::Family => write!(f, "family"),
            Self::Partner => write!(f, "partner"),
            Self::Colleague => write!(f, "colleague"),
        }
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "friend" => Ok(Self::Friend),
            "family" => Ok(Self::Family),
            "partner" => Ok(Self::Partner),
            "colleague" => Ok(Self::Colleague),
            other => Err(format!("unknown relationship type: {other}")),
        }
    }
}
