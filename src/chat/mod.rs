pub mod client;
pub mod session;
pub mod timestamp;

pub use client::{DEFAULT_RETENTION_MS, MESSAGES_PATH, MessageStoreClient, SubscriptionHandle};
pub use session::{ChatSession, Phase};
