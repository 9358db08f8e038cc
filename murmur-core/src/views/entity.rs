use murmur_types::{
    EntityId, EntityKind, EntitySnapshot, EventKind, LikeResponse, MutationKind, PollResultsUpdate,
    PollTally, PollVoteResponse, ReactionUpdate, SyncEvent,
};
use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

use super::{clear_error, record_outcome, Engine};
use crate::bus::Subscription;
use crate::coordinator::EntitySlot;
use crate::error::MutationError;

/// A mounted view of a single post or comment, e.g. a feed card.
///
/// The view owns its snapshot. Confirmed events from other views are applied
/// through bus subscriptions that end when the view is dropped.
pub struct EntityView {
    kind: EntityKind,
    snapshot: Rc<RefCell<EntitySnapshot>>,
    error: Rc<RefCell<Option<String>>>,
    engine: Engine,
    _subscriptions: Vec<Subscription>,
}

impl EntityView {
    pub(crate) fn mount(engine: Engine, kind: EntityKind, snapshot: EntitySnapshot) -> Self {
        let id = snapshot.id;
        let snapshot = Rc::new(RefCell::new(snapshot));

        let subscriptions = EventKind::ALL
            .iter()
            .map(|&event_kind| {
                let cell = Rc::downgrade(&snapshot);
                engine.bus().subscribe(event_kind, move |event| apply_to(&cell, id, event))
            })
            .collect();
        log_event!(engine.log(), "mounted {} view for {}", kind.as_str(), id);

        Self {
            kind,
            snapshot,
            error: Rc::new(RefCell::new(None)),
            engine,
            _subscriptions: subscriptions,
        }
    }

    pub fn id(&self) -> EntityId {
        self.snapshot.borrow().id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Copy of the displayed snapshot
    pub fn snapshot(&self) -> EntitySnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn is_liked(&self) -> bool {
        self.snapshot.borrow().is_liked
    }

    pub fn like_count(&self) -> u32 {
        self.snapshot.borrow().like_count
    }

    pub fn comment_count(&self) -> u32 {
        self.snapshot.borrow().comment_count
    }

    pub fn poll(&self) -> Option<PollTally> {
        self.snapshot.borrow().poll.clone()
    }

    /// Message of the last failed mutation, cleared by the next attempt
    pub fn error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    pub fn is_pending(&self, kind: MutationKind) -> bool {
        self.engine.coordinator().is_in_flight(self.id(), kind)
    }

    /// Like or unlike the entity.
    ///
    /// The displayed state flips immediately. Other views only change once
    /// the server confirms. A toggle while another is pending resolves to
    /// `MutationError::InFlight` without touching state or the network.
    pub fn toggle_like(&self) -> impl Future<Output = Result<EntitySnapshot, MutationError>> + 'static {
        let engine = self.engine.clone();
        let slot = EntitySlot::new(&self.snapshot);
        let error = Rc::downgrade(&self.error);
        let kind = self.kind;
        let id = self.id();

        async move {
            clear_error(&error);
            log_api_call!(engine.log(), "toggle_like {} {}", kind.as_str(), id);
            let result = engine
                .coordinator()
                .perform(
                    slot,
                    MutationKind::Like,
                    |snapshot| {
                        snapshot.toggle_like();
                        Ok(())
                    },
                    engine.api().toggle_like(kind, id),
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

    /// Vote for `option_id` in the post's poll.
    ///
    /// Voting for the option already chosen is ignored. Switching options
    /// moves the vote.
    pub fn vote_poll(&self, option_id: u32) -> impl Future<Output = Result<EntitySnapshot, MutationError>> + 'static {
        let engine = self.engine.clone();
        let slot = EntitySlot::new(&self.snapshot);
        let cell = Rc::downgrade(&self.snapshot);
        let error = Rc::downgrade(&self.error);
        let id = self.id();
        let is_post = self.kind == EntityKind::Post;

        async move {
            clear_error(&error);
            let current = cell.upgrade().map(|cell| cell.borrow().clone());
            let current = match current {
                Some(current) => current,
                None => return Err(MutationError::Detached(id)),
            };
            let poll = match current.poll.as_ref() {
                Some(poll) if is_post && poll.has_option(option_id) => poll,
                _ => return record_outcome(&error, Err(MutationError::UnknownPollOption(option_id))),
            };
            if poll.voted_option == Some(option_id) {
                log_mutation!(engine.log(), "ignore repeat vote for option {} on {}", option_id, id);
                return Ok(current);
            }

            log_api_call!(engine.log(), "vote_poll {} option {}", id, option_id);
            let result = engine
                .coordinator()
                .perform(
                    slot,
                    MutationKind::PollVote,
                    |snapshot| match snapshot.poll.as_mut().map(|poll| poll.cast(option_id)) {
                        Some(true) => Ok(()),
                        _ => Err(MutationError::UnknownPollOption(option_id)),
                    },
                    engine.api().vote_poll(id, option_id),
                    |post_id, response: PollVoteResponse| {
                        SyncEvent::PollResultsUpdated(PollResultsUpdate {
                            post_id,
                            poll_results: response.poll_results,
                            voted_option: Some(option_id),
                        })
                    },
                )
                .await;
            record_outcome(&error, result)
        }
    }
}

fn apply_to(cell: &Weak<RefCell<EntitySnapshot>>, id: EntityId, event: &SyncEvent) -> anyhow::Result<()> {
    let cell = match cell.upgrade() {
        Some(cell) => cell,
        None => anyhow::bail!("view for {} is no longer mounted", id),
    };
    let mut snapshot = cell.try_borrow_mut()?;
    snapshot.apply(event);
    Ok(())
}
