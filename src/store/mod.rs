pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::message::{ChatMessage, ChatMessageWithSender, NewChatMessage};
use crate::models::user::UserProfile;
use crate::models::{OrderId, UserId};

pub use memory::InMemoryMessageStore;
pub use sqlite::SqliteMessageStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),

    #[error("write rejected: {0}")]
    Rejected(String),
}

/// A purge that has been armed but has not fired yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingPurge {
    pub order_id: OrderId,
    pub due_at: DateTime<Utc>,
}

/// Durable chat history plus the rows backing scheduled purges.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError>;

    /// Messages for an order in ascending `sent_at` order, ties broken by id.
    async fn list_messages(&self, order_id: OrderId)
    -> Result<Vec<ChatMessageWithSender>, StoreError>;

    async fn delete_messages(&self, order_id: OrderId) -> Result<u64, StoreError>;

    /// Flags every unread message of the order addressed to `receiver_id`.
    async fn mark_read(&self, order_id: OrderId, receiver_id: UserId) -> Result<u64, StoreError>;

    async fn upsert_user(&self, profile: UserProfile) -> Result<(), StoreError>;

    /// Stores the due time for an order, replacing an earlier one.
    async fn save_purge(&self, purge: PendingPurge) -> Result<(), StoreError>;

    /// Removes the purge row only if it still carries `due_at`, so a newer
    /// schedule for the same order survives.
    async fn clear_purge(&self, purge: PendingPurge) -> Result<bool, StoreError>;

    async fn cancel_purge(&self, order_id: OrderId) -> Result<bool, StoreError>;

    async fn pending_purges(&self) -> Result<Vec<PendingPurge>, StoreError>;
}
