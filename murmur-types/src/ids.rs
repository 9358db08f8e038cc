use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

const PROVISIONAL_PREFIX: &str = "provisional:";

/// Identifier of a post or comment.
///
/// `Stable` ids are assigned by the remote authority. `Provisional` ids are
/// generated locally for optimistic entities and are swapped for a stable id
/// once the server confirms the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Stable(Uuid),
    Provisional(Uuid),
}

impl EntityId {
    /// Fresh provisional id, unique for the lifetime of the process
    pub fn provisional() -> Self {
        EntityId::Provisional(Uuid::new_v4())
    }

    pub fn stable(id: Uuid) -> Self {
        EntityId::Stable(id)
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, EntityId::Provisional(_))
    }

    pub fn is_stable(&self) -> bool {
        matches!(self, EntityId::Stable(_))
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            EntityId::Stable(id) | EntityId::Provisional(id) => *id,
        }
    }
}

impl From<Uuid> for EntityId {
    fn from(id: Uuid) -> Self {
        EntityId::Stable(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Stable(id) => write!(f, "{}", id),
            EntityId::Provisional(id) => write!(f, "{}{}", PROVISIONAL_PREFIX, id),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid entity id: {0}")]
pub struct IdParseError(pub String);

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (raw, provisional) = match s.strip_prefix(PROVISIONAL_PREFIX) {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let id = Uuid::parse_str(raw).map_err(|_| IdParseError(s.to_string()))?;
        Ok(if provisional {
            EntityId::Provisional(id)
        } else {
            EntityId::Stable(id)
        })
    }
}

impl Serialize for EntityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
