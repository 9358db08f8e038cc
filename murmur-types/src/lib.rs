pub mod enums;
pub mod events;
pub mod ids;
pub mod models;

pub use enums::*;
pub use events::*;
pub use ids::*;
pub use models::*;
