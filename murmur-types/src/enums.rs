use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of entity an id refers to. Posts and comments are liked
/// through different remote endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Post,
    Comment,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Post => "post",
            EntityKind::Comment => "comment",
        }
    }
}

/// Kind of optimistic mutation. At most one mutation per
/// `(entity, kind)` pair may be in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Like,
    Comment,
    PollVote,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Like => "like",
            MutationKind::Comment => "comment",
            MutationKind::PollVote => "poll_vote",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported by the server after a like toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeStatus {
    Liked,
    Unliked,
}

impl LikeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LikeStatus::Liked => "liked",
            LikeStatus::Unliked => "unliked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "liked" => Some(LikeStatus::Liked),
            "unliked" => Some(LikeStatus::Unliked),
            _ => None,
        }
    }

    pub fn is_liked(&self) -> bool {
        matches!(self, LikeStatus::Liked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_status_parse() {
        assert_eq!(LikeStatus::parse("LIKED"), Some(LikeStatus::Liked));
        assert_eq!(LikeStatus::parse("unliked"), Some(LikeStatus::Unliked));
        assert_eq!(LikeStatus::parse("meh"), None);
    }

    #[test]
    fn test_mutation_kind_wire_names() {
        let json = serde_json::to_string(&MutationKind::PollVote).unwrap();
        assert_eq!(json, "\"poll_vote\"");
        assert_eq!(MutationKind::Like.to_string(), "like");
    }
}
