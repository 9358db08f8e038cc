// Library interface for murmur (used by the binary and integration tests)
#[macro_use]
pub mod logging;

pub mod api;
pub mod bus;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod reply;
pub mod tree;
pub mod views;

pub use api::{ApiError, ApiResult, CommunityApi, InMemoryCommunity};
pub use bus::{DispatchReport, EventBus, Subscription};
pub use config::Settings;
pub use coordinator::{EntitySlot, InFlight, MutationCoordinator, PendingMutation, SnapshotSlot};
pub use error::{categorize_error, MutationError};
pub use logging::{init_logging, LogConfig, LogFeatures};
pub use reply::{ReplyContext, ReplyContextTracker, ReplyState};
pub use tree::{CommentTree, TreeError};
pub use views::{CommentSlot, Engine, EntityView, ThreadView};
