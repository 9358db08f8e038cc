use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::EntityId;

/// Confirmed change to an entity's like state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionUpdate {
    pub entity_id: EntityId,
    pub is_liked: bool,
    pub like_count: u32,
}

/// Confirmed change to a post's comment count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentCountUpdate {
    pub post_id: EntityId,
    pub comment_count: u32,
}

/// Confirmed poll results after a vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResultsUpdate {
    pub post_id: EntityId,
    pub poll_results: BTreeMap<u32, u32>,
    #[serde(default)]
    pub voted_option: Option<u32>,
}

/// Events broadcast between independently mounted views.
///
/// Only values the server has accepted are ever published; field names are
/// part of the contract every view depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    ReactionUpdated(ReactionUpdate),
    CommentCountUpdated(CommentCountUpdate),
    PollResultsUpdated(PollResultsUpdate),
}

impl SyncEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::ReactionUpdated(_) => EventKind::ReactionUpdated,
            SyncEvent::CommentCountUpdated(_) => EventKind::CommentCountUpdated,
            SyncEvent::PollResultsUpdated(_) => EventKind::PollResultsUpdated,
        }
    }

    /// The entity whose displayed state this event replaces
    pub fn entity_id(&self) -> EntityId {
        match self {
            SyncEvent::ReactionUpdated(update) => update.entity_id,
            SyncEvent::CommentCountUpdated(update) => update.post_id,
            SyncEvent::PollResultsUpdated(update) => update.post_id,
        }
    }
}

/// Discriminant used to subscribe to one kind of [`SyncEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ReactionUpdated,
    CommentCountUpdated,
    PollResultsUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::ReactionUpdated,
        EventKind::CommentCountUpdated,
        EventKind::PollResultsUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ReactionUpdated => "reaction_updated",
            EventKind::CommentCountUpdated => "comment_count_updated",
            EventKind::PollResultsUpdated => "poll_results_updated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
