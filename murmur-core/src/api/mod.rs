mod client;
mod error;
mod memory;

pub use client::CommunityApi;
pub use error::{ApiError, ApiResult};
pub use memory::InMemoryCommunity;
