use async_trait::async_trait;
use murmur_types::*;

use super::ApiResult;

/// Remote operations the sync engine depends on.
///
/// The engine runs on a single-threaded event loop, so implementations are
/// not required to be `Send`.
#[async_trait(?Send)]
pub trait CommunityApi {
    /// Toggle the local user's like on a post or comment
    async fn toggle_like(&self, kind: EntityKind, entity_id: EntityId) -> ApiResult<LikeResponse>;

    /// Create a comment or reply; the returned comment carries a stable id
    async fn create_comment(&self, request: CreateCommentRequest) -> ApiResult<Comment>;

    /// Vote for a poll option on a post
    async fn vote_poll(&self, post_id: EntityId, option_id: u32) -> ApiResult<PollVoteResponse>;
}
