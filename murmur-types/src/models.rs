use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::enums::{LikeStatus, MutationKind};
use crate::events::SyncEvent;
use crate::ids::EntityId;

// Custom serde module for DateTime to ensure RFC3339 string format
mod datetime_format {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<DateTime<Utc>>().map_err(serde::de::Error::custom)
    }
}

/// The local user, as far as authoring comments is concerned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: Uuid,
    pub name: String,
}

impl Author {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Poll results as displayed, plus the option the local user voted for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollTally {
    pub results: BTreeMap<u32, u32>,
    #[serde(default)]
    pub voted_option: Option<u32>,
}

impl PollTally {
    /// Tally with every option at zero votes
    pub fn with_options(options: impl IntoIterator<Item = u32>) -> Self {
        Self {
            results: options.into_iter().map(|option| (option, 0)).collect(),
            voted_option: None,
        }
    }

    pub fn has_option(&self, option: u32) -> bool {
        self.results.contains_key(&option)
    }

    pub fn votes_for(&self, option: u32) -> u32 {
        self.results.get(&option).copied().unwrap_or(0)
    }

    pub fn total_votes(&self) -> u32 {
        self.results.values().sum()
    }

    /// Move the local user's vote to `option`. Returns false when the option
    /// is unknown or already chosen, leaving the tally untouched.
    pub fn cast(&mut self, option: u32) -> bool {
        if !self.has_option(option) || self.voted_option == Some(option) {
            return false;
        }
        if let Some(previous) = self.voted_option {
            if let Some(count) = self.results.get_mut(&previous) {
                *count = count.saturating_sub(1);
            }
        }
        *self.results.entry(option).or_insert(0) += 1;
        self.voted_option = Some(option);
        true
    }
}

/// Displayed state of a likeable/commentable entity.
///
/// Snapshots are always copied between views, never shared, so rolling back
/// one view cannot corrupt another's copy. Each mutation kind owns a disjoint
/// group of fields (see [`EntitySnapshot::restore_from`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    pub id: EntityId,
    pub is_liked: bool,
    pub like_count: u32,
    #[serde(default)]
    pub comment_count: u32,
    #[serde(default)]
    pub poll: Option<PollTally>,
}

impl EntitySnapshot {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            is_liked: false,
            like_count: 0,
            comment_count: 0,
            poll: None,
        }
    }

    pub fn with_likes(mut self, is_liked: bool, like_count: u32) -> Self {
        self.is_liked = is_liked;
        self.like_count = like_count;
        self
    }

    pub fn with_comment_count(mut self, comment_count: u32) -> Self {
        self.comment_count = comment_count;
        self
    }

    pub fn with_poll(mut self, poll: PollTally) -> Self {
        self.poll = Some(poll);
        self
    }

    /// Flip the liked flag and adjust the count the way the server would
    pub fn toggle_like(&mut self) {
        if self.is_liked {
            self.is_liked = false;
            self.like_count = self.like_count.saturating_sub(1);
        } else {
            self.is_liked = true;
            self.like_count += 1;
        }
    }

    /// Copy back the fields owned by `kind` from `previous`
    pub fn restore_from(&mut self, previous: &EntitySnapshot, kind: MutationKind) {
        match kind {
            MutationKind::Like => {
                self.is_liked = previous.is_liked;
                self.like_count = previous.like_count;
            }
            MutationKind::Comment => {
                self.comment_count = previous.comment_count;
            }
            MutationKind::PollVote => {
                self.poll = previous.poll.clone();
            }
        }
    }

    /// Apply a confirmed event. Returns true if the event concerned this entity.
    pub fn apply(&mut self, event: &SyncEvent) -> bool {
        if event.entity_id() != self.id {
            return false;
        }
        match event {
            SyncEvent::ReactionUpdated(update) => {
                self.is_liked = update.is_liked;
                self.like_count = update.like_count;
            }
            SyncEvent::CommentCountUpdated(update) => {
                self.comment_count = update.comment_count;
            }
            SyncEvent::PollResultsUpdated(update) => {
                let tally = self.poll.get_or_insert_with(PollTally::default);
                tally.results = update.poll_results.clone();
                tally.voted_option = update.voted_option;
            }
        }
        true
    }
}

/// A comment or reply in a post's thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: EntityId,
    pub post_id: EntityId,
    pub author_id: Uuid,
    pub author_name: String,
    pub content: String,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
    /// Depth-0 ancestor of this reply (None for top-level comments)
    #[serde(default)]
    pub root_comment_id: Option<EntityId>,
    /// Direct parent (None for top-level comments)
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    #[serde(default)]
    pub depth: u32,
    /// User being replied to, for @mentions
    #[serde(default)]
    pub mentioned_user_id: Option<Uuid>,
    pub reaction: EntitySnapshot,
    #[serde(default)]
    pub replies: Vec<Comment>,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }
}

// Request/Response types for the remote API

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub post_id: EntityId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentioned_user_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub status: LikeStatus,
    pub like_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollVoteRequest {
    pub option_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollVoteResponse {
    pub poll_results: BTreeMap<u32, u32>,
}
