// Models module

pub mod ai;
pub mod chat;
pub mod message;
pub mod user;

pub use ai::{AiConversationMessage, AiGlobalRequest, AiSender};
pub use chat::{Chat, RecentChatSummary};
pub use message::{Message, Sender, AI_SENDER_ID, THINKING_PLACEHOLDER};
pub use user::UserProfile;
