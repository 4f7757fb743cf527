// Routes module

pub mod ai;
pub mod auth;
pub mod chats;
pub mod health;
pub mod messages;
pub mod users;

use crate::AppState;

pub use ai::ai_routes;
pub use auth::auth_routes;
pub use chats::chats_routes;
pub use health::health_routes;
pub use messages::messages_routes;
pub use users::users_routes;
