pub mod auth;
pub mod chats;
pub mod groups;
pub mod messages;
pub mod middleware;
pub mod router;
mod store;

pub use auth::{AppState, AppStateInner};
pub use router::build_router;
