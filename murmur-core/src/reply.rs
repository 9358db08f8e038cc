use chrono::Utc;
use murmur_types::{Author, Comment, EntityId, EntitySnapshot};
use uuid::Uuid;

/// Where a reply being composed will land in the thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyContext {
    pub target_comment_id: EntityId,
    pub target_author_name: String,
    pub target_user_id: Uuid,
    pub root_comment_id: EntityId,
    pub new_reply_depth: u32,
}

impl ReplyContext {
    /// Resolve the context for replying to `target`.
    ///
    /// Replies to a top-level comment are rooted at that comment; deeper
    /// replies inherit the target's root so a whole thread shares one root.
    pub fn for_target(target: &Comment) -> Self {
        let root_comment_id = if target.depth == 0 {
            target.id
        } else {
            target.root_comment_id.unwrap_or(target.id)
        };
        Self {
            target_comment_id: target.id,
            target_author_name: target.author_name.clone(),
            target_user_id: target.author_id,
            root_comment_id,
            new_reply_depth: target.depth + 1,
        }
    }

    fn repoint(&mut self, from: EntityId, to: EntityId) {
        if self.target_comment_id == from {
            self.target_comment_id = to;
        }
        if self.root_comment_id == from {
            self.root_comment_id = to;
        }
    }
}

/// Build the provisional comment shown while a submission is in flight
pub fn provisional_comment(
    post_id: EntityId,
    author: &Author,
    content: &str,
    context: Option<&ReplyContext>,
) -> Comment {
    let id = EntityId::provisional();
    Comment {
        id,
        post_id,
        author_id: author.id,
        author_name: author.name.clone(),
        content: content.to_string(),
        created_at: Utc::now(),
        root_comment_id: context.map(|ctx| ctx.root_comment_id),
        parent_id: context.map(|ctx| ctx.target_comment_id),
        depth: context.map(|ctx| ctx.new_reply_depth).unwrap_or(0),
        mentioned_user_id: context.map(|ctx| ctx.target_user_id),
        reaction: EntitySnapshot::new(id),
        replies: Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReplyState {
    #[default]
    Idle,
    Composing(ReplyContext),
}

/// Tracks the "replying to X" state of one open thread view
#[derive(Debug, Clone, Default)]
pub struct ReplyContextTracker {
    state: ReplyState,
    last: Option<ReplyContext>,
}

impl ReplyContextTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ReplyState {
        &self.state
    }

    pub fn active(&self) -> Option<&ReplyContext> {
        match &self.state {
            ReplyState::Composing(ctx) => Some(ctx),
            ReplyState::Idle => None,
        }
    }

    pub fn is_composing(&self) -> bool {
        matches!(self.state, ReplyState::Composing(_))
    }

    /// Context of the most recent successful reply
    pub fn last(&self) -> Option<&ReplyContext> {
        self.last.as_ref()
    }

    /// Start (or retarget) a reply to `target`
    pub fn reply_to(&mut self, target: &Comment) -> ReplyContext {
        self.enter(ReplyContext::for_target(target))
    }

    pub fn cancel(&mut self) -> Option<ReplyContext> {
        self.take()
    }

    /// Leave composing because the reply was handed off for submission
    pub fn take(&mut self) -> Option<ReplyContext> {
        match std::mem::take(&mut self.state) {
            ReplyState::Composing(ctx) => Some(ctx),
            ReplyState::Idle => None,
        }
    }

    /// Re-enter composing with a context whose submission failed
    pub fn restore(&mut self, ctx: ReplyContext) {
        self.state = ReplyState::Composing(ctx);
    }

    /// Remember a context whose reply the server accepted
    pub fn remember(&mut self, ctx: ReplyContext) {
        self.last = Some(ctx);
    }

    /// "Reply again" is offered only while idle with a blank draft
    pub fn can_reply_again(&self, draft: &str) -> bool {
        !self.is_composing() && self.last.is_some() && draft.trim().is_empty()
    }

    /// Re-enter composing with the last used context
    pub fn reply_again(&mut self) -> Option<ReplyContext> {
        if self.is_composing() {
            return None;
        }
        let ctx = self.last.clone()?;
        Some(self.enter(ctx))
    }

    /// A top-level comment was accepted, so "reply again" no longer applies
    pub fn forget(&mut self) {
        self.last = None;
    }

    /// Swap `from` for `to` in both the active and the remembered context.
    ///
    /// Called when a provisional comment is reconciled to its stable id.
    pub fn repoint(&mut self, from: EntityId, to: EntityId) {
        if let ReplyState::Composing(ctx) = &mut self.state {
            ctx.repoint(from, to);
        }
        if let Some(ctx) = self.last.as_mut() {
            ctx.repoint(from, to);
        }
    }

    /// The view closed; nothing survives
    pub fn close(&mut self) {
        self.state = ReplyState::Idle;
        self.last = None;
    }

    fn enter(&mut self, ctx: ReplyContext) -> ReplyContext {
        self.state = ReplyState::Composing(ctx.clone());
        ctx
    }
}
