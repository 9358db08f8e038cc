use chrono::{DateTime, Utc};
use murmur_types::{
    Author, Comment, CommentCountUpdate, CreateCommentRequest, EntityId, EntityKind,
    EntitySnapshot, EventKind, LikeResponse, MutationKind, ReactionUpdate, SyncEvent,
};
use std::cell::{Ref, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};

use super::{clear_error, record_outcome, Engine};
use crate::bus::Subscription;
use crate::coordinator::{EntitySlot, SnapshotSlot};
use crate::error::MutationError;
use crate::reply::{provisional_comment, ReplyContext, ReplyContextTracker};
use crate::tree::CommentTree;

/// Slot for the reaction state of one comment node inside a thread
#[derive(Debug, Clone)]
pub struct CommentSlot {
    id: EntityId,
    tree: Weak<RefCell<CommentTree>>,
}

impl CommentSlot {
    pub fn new(tree: &Rc<RefCell<CommentTree>>, id: EntityId) -> Self {
        Self {
            id,
            tree: Rc::downgrade(tree),
        }
    }
}

impl SnapshotSlot for CommentSlot {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn read(&self) -> Option<EntitySnapshot> {
        let tree = self.tree.upgrade()?;
        let reaction = tree.borrow().find(self.id).map(|comment| comment.reaction.clone());
        reaction
    }

    fn write(&self, snapshot: EntitySnapshot) {
        if let Some(tree) = self.tree.upgrade() {
            if let Some(comment) = tree.borrow_mut().find_mut(self.id) {
                comment.reaction = snapshot;
            }
        }
    }
}

/// An open post detail view: the post header, its comment thread, the
/// comment input and the "replying to" state.
///
/// Dropping the view (or calling [`close`](Self::close)) tears down its
/// subscriptions and forgets the reply context. Submissions still in flight
/// complete on the server but no longer touch this view.
pub struct ThreadView {
    post: Rc<RefCell<EntitySnapshot>>,
    tree: Rc<RefCell<CommentTree>>,
    replies: Rc<RefCell<ReplyContextTracker>>,
    draft: Rc<RefCell<String>>,
    error: Rc<RefCell<Option<String>>>,
    author: Author,
    engine: Engine,
    _subscriptions: Vec<Subscription>,
}

/// Weak handles a pending submission holds on its view
struct ThreadHandles {
    post_id: EntityId,
    post: EntitySlot,
    tree: Weak<RefCell<CommentTree>>,
    replies: Weak<RefCell<ReplyContextTracker>>,
    draft: Weak<RefCell<String>>,
    error: Weak<RefCell<Option<String>>>,
    author: Author,
    engine: Engine,
}

impl ThreadView {
    pub(crate) fn open(engine: Engine, post: EntitySnapshot, author: Author, comments: Vec<Comment>) -> Self {
        let post_id = post.id;
        let post = Rc::new(RefCell::new(post));
        let tree = Rc::new(RefCell::new(CommentTree::from_nested(post_id, comments)));

        let subscriptions = EventKind::ALL
            .iter()
            .map(|&event_kind| {
                let post = Rc::downgrade(&post);
                let tree = Rc::downgrade(&tree);
                engine
                    .bus()
                    .subscribe(event_kind, move |event| apply_to_thread(&post, &tree, post_id, event))
            })
            .collect();
        log_tree!(
            engine.log(),
            "opened thread {} with {} comment(s)",
            post_id,
            tree.borrow().count_all()
        );

        Self {
            post,
            tree,
            replies: Rc::new(RefCell::new(ReplyContextTracker::new())),
            draft: Rc::new(RefCell::new(String::new())),
            error: Rc::new(RefCell::new(None)),
            author,
            engine,
            _subscriptions: subscriptions,
        }
    }

    pub fn post_id(&self) -> EntityId {
        self.post.borrow().id
    }

    /// Copy of the post header's snapshot
    pub fn post(&self) -> EntitySnapshot {
        self.post.borrow().clone()
    }

    /// Stored comment count of the post (the number feed cards show)
    pub fn comment_count(&self) -> u32 {
        self.post.borrow().comment_count
    }

    /// Number of comments actually present in the loaded thread
    pub fn displayed_total(&self) -> usize {
        self.tree.borrow().count_all()
    }

    pub fn tree(&self) -> Ref<'_, CommentTree> {
        self.tree.borrow()
    }

    pub fn comment(&self, id: EntityId) -> Option<Comment> {
        self.tree.borrow().find(id).cloned()
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.tree.borrow().last_activity()
    }

    /// Distinct commenter names in thread order
    pub fn commenters(&self) -> Vec<String> {
        self.tree.borrow().commenters()
    }

    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn draft(&self) -> String {
        self.draft.borrow().clone()
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        *self.draft.borrow_mut() = text.into();
    }

    /// Context of the reply being composed, if any
    pub fn reply_context(&self) -> Option<ReplyContext> {
        self.replies.borrow().active().cloned()
    }

    pub fn last_reply_context(&self) -> Option<ReplyContext> {
        self.replies.borrow().last().cloned()
    }

    /// Start replying to `comment_id`
    pub fn reply_to(&self, comment_id: EntityId) -> Result<ReplyContext, MutationError> {
        let tree = self.tree.borrow();
        let target = tree
            .find(comment_id)
            .ok_or(MutationError::ParentNotFound(comment_id))?;
        let ctx = self.replies.borrow_mut().reply_to(target);
        log_reply!(
            self.engine.log(),
            "replying to {} ({}) at depth {}",
            ctx.target_author_name,
            ctx.target_comment_id,
            ctx.new_reply_depth
        );
        Ok(ctx)
    }

    pub fn cancel_reply(&self) {
        if let Some(ctx) = self.replies.borrow_mut().cancel() {
            log_reply!(self.engine.log(), "cancelled reply to {}", ctx.target_comment_id);
        }
    }

    /// Whether the "reply again" shortcut should be offered
    pub fn can_reply_again(&self) -> bool {
        self.replies.borrow().can_reply_again(&self.draft.borrow())
    }

    pub fn reply_again(&self) -> Option<ReplyContext> {
        if !self.can_reply_again() {
            return None;
        }
        let ctx = self.replies.borrow_mut().reply_again()?;
        log_reply!(self.engine.log(), "replying again to {}", ctx.target_comment_id);
        Some(ctx)
    }

    /// Submit the draft, as a reply if one is being composed
    pub fn submit(&self) -> impl Future<Output = Result<Comment, MutationError>> + 'static {
        let context = self.reply_context();
        let content = self.draft();
        self.add_reply(context, content)
    }

    /// Add a comment (`context` is `None`) or a reply to the thread.
    ///
    /// The provisional comment appears immediately, the input is cleared and
    /// the post's comment count goes up by one. On failure all three are
    /// undone and the reply context is restored.
    pub fn add_reply(
        &self,
        context: Option<ReplyContext>,
        content: String,
    ) -> impl Future<Output = Result<Comment, MutationError>> + 'static {
        let handles = self.handles();
        async move {
            clear_error(&handles.error);
            let result = handles.submit_comment(context, content).await;
            record_outcome(&handles.error, result)
        }
    }

    /// Like or unlike a comment in this thread
    pub fn toggle_comment_like(
        &self,
        comment_id: EntityId,
    ) -> impl Future<Output = Result<EntitySnapshot, MutationError>> + 'static {
        let engine = self.engine.clone();
        let slot = CommentSlot::new(&self.tree, comment_id);
        let error = Rc::downgrade(&self.error);

        async move {
            clear_error(&error);
            log_api_call!(engine.log(), "toggle_like comment {}", comment_id);
            let result = engine
                .coordinator()
                .perform(
                    slot,
                    MutationKind::Like,
                    |snapshot| {
                        snapshot.toggle_like();
                        Ok(())
                    },
                    engine.api().toggle_like(EntityKind::Comment, comment_id),
                    |entity_id, response: LikeResponse| {
                        SyncEvent::ReactionUpdated(ReactionUpdate {
                            entity_id,
                            is_liked: response.status.is_liked(),
                            like_count: response.like_count,
                        })
                    },
                )
                .await;
            record_outcome(&error, result)
        }
    }

    /// Swap a provisional comment for its authoritative version
    pub fn reconcile_cache(&self, provisional_id: EntityId, authoritative: Comment) -> bool {
        let stable_id = authoritative.id;
        let reconciled = self.tree.borrow_mut().reconcile(provisional_id, authoritative);
        if reconciled {
            self.replies.borrow_mut().repoint(provisional_id, stable_id);
        }
        reconciled
    }

    /// Close the view. Equivalent to dropping it.
    pub fn close(self) {
        self.replies.borrow_mut().close();
        log_tree!(self.engine.log(), "closed thread {}", self.post_id());
    }

    fn handles(&self) -> ThreadHandles {
        ThreadHandles {
            post_id: self.post_id(),
            post: EntitySlot::new(&self.post),
            tree: Rc::downgrade(&self.tree),
            replies: Rc::downgrade(&self.replies),
            draft: Rc::downgrade(&self.draft),
            error: Rc::downgrade(&self.error),
            author: self.author.clone(),
            engine: self.engine.clone(),
        }
    }
}

impl ThreadHandles {
    async fn submit_comment(
        &self,
        context: Option<ReplyContext>,
        content: String,
    ) -> Result<Comment, MutationError> {
        validate_content(&content, self.engine.max_comment_chars())?;
        let tree = self
            .tree
            .upgrade()
            .ok_or(MutationError::Detached(self.post_id))?;

        let provisional = provisional_comment(self.post_id, &self.author, &content, context.as_ref());
        let provisional_id = provisional.id;

        let in_flight = self.engine.coordinator().begin(
            self.post.clone(),
            MutationKind::Comment,
            |snapshot| {
                let mut tree = tree.borrow_mut();
                match &context {
                    Some(ctx) => tree
                        .insert_reply(ctx.target_comment_id, provisional.clone())
                        .map_err(|err| {
                            log::error!("dropping reply on {}: {}", self.post_id, err);
                            MutationError::ParentNotFound(ctx.target_comment_id)
                        })?,
                    None => tree.insert_root(provisional.clone()),
                }
                snapshot.comment_count += 1;
                Ok(())
            },
        )?;
        drop(tree);
        log_tree!(
            self.engine.log(),
            "inserted provisional {} at depth {}",
            provisional_id,
            provisional.depth
        );

        if let Some(draft) = self.draft.upgrade() {
            draft.borrow_mut().clear();
        }
        if let Some(replies) = self.replies.upgrade() {
            replies.borrow_mut().take();
        }

        let request = CreateCommentRequest {
            post_id: self.post_id,
            content: content.clone(),
            parent_id: context.as_ref().map(|ctx| ctx.target_comment_id),
            mentioned_user_id: context.as_ref().map(|ctx| ctx.target_user_id),
        };
        log_api_call!(self.engine.log(), "create_comment on {}", self.post_id);

        match self.engine.api().create_comment(request).await {
            Ok(authoritative) => {
                let mut reconciled = false;
                if let Some(tree) = self.tree.upgrade() {
                    reconciled = tree.borrow_mut().reconcile(provisional_id, authoritative.clone());
                }
                if reconciled {
                    log_tree!(
                        self.engine.log(),
                        "reconciled {} -> {}",
                        provisional_id,
                        authoritative.id
                    );
                }
                if let Some(replies) = self.replies.upgrade() {
                    let mut replies = replies.borrow_mut();
                    match context {
                        Some(ctx) => replies.remember(ctx),
                        None => replies.forget(),
                    }
                    if reconciled {
                        replies.repoint(provisional_id, authoritative.id);
                    }
                }
                let comment_count = in_flight.previous().comment_count + 1;
                in_flight.confirm(SyncEvent::CommentCountUpdated(CommentCountUpdate {
                    post_id: self.post_id,
                    comment_count,
                }));
                Ok(authoritative)
            }
            Err(err) => {
                if let Some(tree) = self.tree.upgrade() {
                    tree.borrow_mut().remove(provisional_id);
                }
                if let Some(draft) = self.draft.upgrade() {
                    *draft.borrow_mut() = content;
                }
                if let (Some(ctx), Some(replies)) = (context, self.replies.upgrade()) {
                    log_reply!(self.engine.log(), "restoring reply to {}", ctx.target_comment_id);
                    replies.borrow_mut().restore(ctx);
                }
                Err(in_flight.rollback(err.into()))
            }
        }
    }
}

fn validate_content(content: &str, max_chars: usize) -> Result<(), MutationError> {
    if content.trim().is_empty() {
        return Err(MutationError::EmptyContent);
    }
    let actual = content.chars().count();
    if actual > max_chars {
        return Err(MutationError::ContentTooLong {
            max: max_chars,
            actual,
        });
    }
    Ok(())
}

fn apply_to_thread(
    post: &Weak<RefCell<EntitySnapshot>>,
    tree: &Weak<RefCell<CommentTree>>,
    post_id: EntityId,
    event: &SyncEvent,
) -> anyhow::Result<()> {
    let (post, tree) = match (post.upgrade(), tree.upgrade()) {
        (Some(post), Some(tree)) => (post, tree),
        _ => anyhow::bail!("thread view for {} is no longer mounted", post_id),
    };
    if event.entity_id() == post_id {
        post.try_borrow_mut()?.apply(event);
    } else if event.kind() == EventKind::ReactionUpdated {
        tree.try_borrow_mut()?.apply_event(event);
    }
    Ok(())
}
