use async_trait::async_trait;
use chrono::Utc;
use murmur_types::*;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Notify;
use uuid::Uuid;

use super::{ApiError, ApiResult, CommunityApi};

#[derive(Debug, Clone, Copy, Default)]
struct LikeRecord {
    liked: bool,
    count: u32,
}

#[derive(Debug, Clone, Copy)]
struct CommentRecord {
    depth: u32,
    root: Option<EntityId>,
}

#[derive(Debug, Default)]
struct AuthorityState {
    likes: HashMap<EntityId, LikeRecord>,
    comments: HashMap<EntityId, CommentRecord>,
    polls: HashMap<EntityId, BTreeMap<u32, u32>>,
    votes: HashMap<EntityId, u32>,
}

/// In-process stand-in for the remote authority.
///
/// Counts likes server-side, assigns stable comment ids and tallies polls.
/// Calls can be held in flight with [`pause`](Self::pause) and made to fail
/// with [`fail_next`](Self::fail_next) or [`set_failing`](Self::set_failing).
pub struct InMemoryCommunity {
    viewer: Author,
    state: RefCell<AuthorityState>,
    fail_next: RefCell<Option<ApiError>>,
    failing: Cell<bool>,
    paused: Cell<bool>,
    gate: Notify,
    calls: Cell<usize>,
}

impl InMemoryCommunity {
    /// Create an authority that attributes new comments to `viewer`
    pub fn new(viewer: Author) -> Self {
        Self {
            viewer,
            state: RefCell::new(AuthorityState::default()),
            fail_next: RefCell::new(None),
            failing: Cell::new(false),
            paused: Cell::new(false),
            gate: Notify::new(),
            calls: Cell::new(0),
        }
    }

    pub fn viewer(&self) -> &Author {
        &self.viewer
    }

    /// Seed the server-side like state of an entity
    pub fn seed_like(&self, entity_id: EntityId, liked: bool, count: u32) {
        self.state
            .borrow_mut()
            .likes
            .insert(entity_id, LikeRecord { liked, count });
    }

    /// Register an existing comment (and its replies) so replies to it resolve
    pub fn seed_comment(&self, comment: &Comment) {
        let mut state = self.state.borrow_mut();
        let mut stack = vec![comment];
        while let Some(current) = stack.pop() {
            state.comments.insert(
                current.id,
                CommentRecord {
                    depth: current.depth,
                    root: current.root_comment_id,
                },
            );
            state.likes.insert(
                current.id,
                LikeRecord {
                    liked: current.reaction.is_liked,
                    count: current.reaction.like_count,
                },
            );
            stack.extend(current.replies.iter());
        }
    }

    /// Open a poll on a post with every option at zero votes
    pub fn seed_poll(&self, post_id: EntityId, options: impl IntoIterator<Item = u32>) {
        let results = options.into_iter().map(|option| (option, 0)).collect();
        self.state.borrow_mut().polls.insert(post_id, results);
    }

    /// A like registered from another session, invisible to local views
    pub fn add_external_like(&self, entity_id: EntityId) {
        let mut state = self.state.borrow_mut();
        state.likes.entry(entity_id).or_default().count += 1;
    }

    /// Make the next call fail with `error`
    pub fn fail_next(&self, error: ApiError) {
        *self.fail_next.borrow_mut() = Some(error);
    }

    /// Make every call fail until switched off
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    /// Hold every subsequent call in flight until [`resume`](Self::resume)
    pub fn pause(&self) {
        self.paused.set(true);
    }

    pub fn resume(&self) {
        self.paused.set(false);
        self.gate.notify_waiters();
    }

    /// Number of calls received so far, including failed ones
    pub fn call_count(&self) -> usize {
        self.calls.get()
    }

    /// Server-side `(liked, count)` for an entity
    pub fn like_state(&self, entity_id: EntityId) -> Option<(bool, u32)> {
        self.state
            .borrow()
            .likes
            .get(&entity_id)
            .map(|record| (record.liked, record.count))
    }

    pub fn poll_results(&self, post_id: EntityId) -> Option<BTreeMap<u32, u32>> {
        self.state.borrow().polls.get(&post_id).cloned()
    }

    async fn enter(&self) -> ApiResult<()> {
        self.calls.set(self.calls.get() + 1);
        while self.paused.get() {
            self.gate.notified().await;
        }
        if let Some(error) = self.fail_next.borrow_mut().take() {
            return Err(error);
        }
        if self.failing.get() {
            return Err(ApiError::Network("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl CommunityApi for InMemoryCommunity {
    async fn toggle_like(&self, _kind: EntityKind, entity_id: EntityId) -> ApiResult<LikeResponse> {
        self.enter().await?;
        if entity_id.is_provisional() {
            return Err(ApiError::BadRequest(format!(
                "cannot like unconfirmed entity {}",
                entity_id
            )));
        }

        let mut state = self.state.borrow_mut();
        let record = state.likes.entry(entity_id).or_default();
        if record.liked {
            record.liked = false;
            record.count = record.count.saturating_sub(1);
        } else {
            record.liked = true;
            record.count += 1;
        }

        Ok(LikeResponse {
            status: if record.liked {
                LikeStatus::Liked
            } else {
                LikeStatus::Unliked
            },
            like_count: record.count,
        })
    }

    async fn create_comment(&self, request: CreateCommentRequest) -> ApiResult<Comment> {
        self.enter().await?;
        if request.content.trim().is_empty() {
            return Err(ApiError::BadRequest("content must not be empty".to_string()));
        }

        let mut state = self.state.borrow_mut();
        let (depth, root) = match request.parent_id {
            None => (0, None),
            Some(parent_id) => {
                let parent = state
                    .comments
                    .get(&parent_id)
                    .ok_or_else(|| ApiError::NotFound(format!("comment {}", parent_id)))?;
                (parent.depth + 1, Some(parent.root.unwrap_or(parent_id)))
            }
        };

        let id = EntityId::Stable(Uuid::new_v4());
        state.comments.insert(id, CommentRecord { depth, root });
        state.likes.insert(id, LikeRecord::default());

        Ok(Comment {
            id,
            post_id: request.post_id,
            author_id: self.viewer.id,
            author_name: self.viewer.name.clone(),
            content: request.content,
            created_at: Utc::now(),
            root_comment_id: root,
            parent_id: request.parent_id,
            depth,
            mentioned_user_id: request.mentioned_user_id,
            reaction: EntitySnapshot::new(id),
            replies: Vec::new(),
        })
    }

    async fn vote_poll(&self, post_id: EntityId, option_id: u32) -> ApiResult<PollVoteResponse> {
        self.enter().await?;

        let mut state = self.state.borrow_mut();
        let previous = state.votes.get(&post_id).copied();
        let results = state
            .polls
            .get_mut(&post_id)
            .ok_or_else(|| ApiError::NotFound(format!("poll on post {}", post_id)))?;
        if !results.contains_key(&option_id) {
            return Err(ApiError::BadRequest(format!("unknown poll option {}", option_id)));
        }

        if previous != Some(option_id) {
            if let Some(previous) = previous {
                if let Some(count) = results.get_mut(&previous) {
                    *count = count.saturating_sub(1);
                }
            }
            *results.entry(option_id).or_insert(0) += 1;
        }
        let poll_results = results.clone();
        state.votes.insert(post_id, option_id);

        Ok(PollVoteResponse { poll_results })
    }
}
