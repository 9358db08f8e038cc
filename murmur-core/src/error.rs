use murmur_types::{EntityId, MutationKind};
use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum MutationError {
    /// A mutation of the same kind is still pending for this entity
    #[error("{kind} mutation already in flight for {entity_id}")]
    InFlight {
        entity_id: EntityId,
        kind: MutationKind,
    },

    #[error("parent comment {0} not found in thread")]
    ParentNotFound(EntityId),

    #[error("remote call failed: {0}")]
    Remote(#[from] ApiError),

    #[error("comment content is empty")]
    EmptyContent,

    #[error("comment exceeds {max} characters (current: {actual})")]
    ContentTooLong { max: usize, actual: usize },

    #[error("poll option {0} does not exist")]
    UnknownPollOption(u32),

    /// The view that owned the snapshot is no longer mounted
    #[error("view for {0} is no longer mounted")]
    Detached(EntityId),
}

impl MutationError {
    /// Whether the error should be surfaced to the user at all
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, MutationError::InFlight { .. })
    }
}

/// Turn an error into a short message suitable for a view's error flag
pub fn categorize_error(err: &MutationError) -> String {
    match err {
        MutationError::Remote(ApiError::Network(_)) => {
            "Network Error: Connection failed. Check your network and try again".to_string()
        }
        MutationError::Remote(ApiError::Unauthorized(_)) => {
            "Authorization Error: Session expired or insufficient permissions".to_string()
        }
        MutationError::Remote(ApiError::BadRequest(msg)) => format!("Validation Error: {}", msg),
        MutationError::Remote(ApiError::NotFound(msg)) => format!("Not Found: {}", msg),
        MutationError::Remote(other) => format!("Server Error: {}", other),
        MutationError::EmptyContent => "Validation Error: Cannot post empty comment.".to_string(),
        MutationError::ContentTooLong { .. } | MutationError::UnknownPollOption(_) => {
            format!("Validation Error: {}", err)
        }
        other => format!("Error: {}", other),
    }
}
