//! Mounted views of posts, comments and threads.
//!
//! Each view owns its own copy of the state it renders and converges with
//! other views only through confirmed bus events. Mutation methods return
//! `'static` futures that hold weak references to the view, so a view can be
//! dropped (unmounted) while its mutation is still in flight.

mod entity;
mod thread;

#[cfg(test)]
mod tests;

pub use entity::EntityView;
pub use thread::{CommentSlot, ThreadView};

use murmur_types::{Author, Comment, EntityKind, EntitySnapshot};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::api::CommunityApi;
use crate::bus::EventBus;
use crate::config::{Settings, DEFAULT_MAX_COMMENT_CHARS};
use crate::coordinator::MutationCoordinator;
use crate::error::{categorize_error, MutationError};
use crate::logging::LogConfig;

/// Everything a view needs to mutate state: the remote API, the coordinator
/// and the bus it publishes on. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    api: Rc<dyn CommunityApi>,
    coordinator: MutationCoordinator,
    log: LogConfig,
    max_comment_chars: usize,
}

impl Engine {
    pub fn new(api: Rc<dyn CommunityApi>, log: LogConfig) -> Self {
        let bus = EventBus::new(log.clone());
        Self {
            api,
            coordinator: MutationCoordinator::new(bus, log.clone()),
            log,
            max_comment_chars: DEFAULT_MAX_COMMENT_CHARS,
        }
    }

    pub fn from_settings(api: Rc<dyn CommunityApi>, settings: &Settings) -> Self {
        Self::new(api, settings.log_config())
            .with_max_comment_chars(settings.comments.max_comment_chars)
    }

    pub fn with_max_comment_chars(mut self, max_comment_chars: usize) -> Self {
        self.max_comment_chars = max_comment_chars;
        self
    }

    pub fn bus(&self) -> &EventBus {
        self.coordinator.bus()
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    pub fn max_comment_chars(&self) -> usize {
        self.max_comment_chars
    }

    /// Mount a view of one post or comment (a feed card, a detail header)
    pub fn mount_entity(&self, kind: EntityKind, snapshot: EntitySnapshot) -> EntityView {
        EntityView::mount(self.clone(), kind, snapshot)
    }

    /// Open a post's detail view with its comment thread
    pub fn open_thread(&self, post: EntitySnapshot, author: Author, comments: Vec<Comment>) -> ThreadView {
        ThreadView::open(self.clone(), post, author, comments)
    }

    pub(crate) fn api(&self) -> &dyn CommunityApi {
        self.api.as_ref()
    }

    pub(crate) fn log(&self) -> &LogConfig {
        &self.log
    }
}

/// Store the outcome of a mutation in a view's transient error flag
pub(crate) fn record_outcome<T>(
    error: &Weak<RefCell<Option<String>>>,
    result: Result<T, MutationError>,
) -> Result<T, MutationError> {
    if let Err(err) = &result {
        if err.is_user_visible() {
            if let Some(flag) = error.upgrade() {
                *flag.borrow_mut() = Some(categorize_error(err));
            }
        }
    }
    result
}

pub(crate) fn clear_error(error: &Weak<RefCell<Option<String>>>) {
    if let Some(flag) = error.upgrade() {
        flag.borrow_mut().take();
    }
}
