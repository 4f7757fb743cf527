// Services module

pub mod firestore;
pub mod subscription;

pub use firestore::{direct_chat_id, FirestoreService};
pub use subscription::{
    watch_messages, watch_recent_chats, Subscription, DEFAULT_POLL_INTERVAL,
};
