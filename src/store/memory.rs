use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::message::{ChatMessage, ChatMessageWithSender, NewChatMessage};
use crate::models::user::UserProfile;
use crate::models::{OrderId, UserId};
use crate::store::{MessageStore, PendingPurge, StoreError};

#[derive(Default)]
struct Inner {
    next_id: u64,
    messages: Vec<ChatMessage>,
    users: HashMap<UserId, UserProfile>,
    purges: HashMap<OrderId, PendingPurge>,
}

/// Process-local store used when no database is configured.
#[derive(Default)]
pub struct InMemoryMessageStore {
    inner: RwLock<Inner>,
    offline: AtomicBool,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline, every call fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create_message(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        inner.next_id += 1;

        let stored = ChatMessage {
            id: inner.next_id,
            order_id: message.order_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            sent_at: message.sent_at,
            is_read: false,
        };
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ChatMessageWithSender>, StoreError> {
        self.check_online()?;
        let inner = self.inner.read().await;

        let mut messages: Vec<ChatMessageWithSender> = inner
            .messages
            .iter()
            .filter(|message| message.order_id == order_id)
            .map(|message| ChatMessageWithSender {
                message: message.clone(),
                sender: inner.users.get(&message.sender_id).cloned(),
            })
            .collect();

        messages.sort_by(|a, b| {
            a.message
                .sent_at
                .cmp(&b.message.sent_at)
                .then(a.message.id.cmp(&b.message.id))
        });
        Ok(messages)
    }

    async fn delete_messages(&self, order_id: OrderId) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let before = inner.messages.len();
        inner.messages.retain(|message| message.order_id != order_id);
        Ok((before - inner.messages.len()) as u64)
    }

    async fn mark_read(&self, order_id: OrderId, receiver_id: UserId) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let mut flipped = 0;
        for message in inner.messages.iter_mut().filter(|message| {
            message.order_id == order_id && message.receiver_id == receiver_id && !message.is_read
        }) {
            message.is_read = true;
            flipped += 1;
        }
        Ok(flipped)
    }

    async fn upsert_user(&self, profile: UserProfile) -> Result<(), StoreError> {
        self.check_online()?;
        self.inner.write().await.users.insert(profile.id, profile);
        Ok(())
    }

    async fn save_purge(&self, purge: PendingPurge) -> Result<(), StoreError> {
        self.check_online()?;
        self.inner.write().await.purges.insert(purge.order_id, purge);
        Ok(())
    }

    async fn clear_purge(&self, purge: PendingPurge) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        if inner.purges.get(&purge.order_id) == Some(&purge) {
            inner.purges.remove(&purge.order_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn cancel_purge(&self, order_id: OrderId) -> Result<bool, StoreError> {
        self.check_online()?;
        Ok(self.inner.write().await.purges.remove(&order_id).is_some())
    }

    async fn pending_purges(&self) -> Result<Vec<PendingPurge>, StoreError> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let mut purges: Vec<PendingPurge> = inner.purges.values().copied().collect();
        purges.sort_by_key(|purge| purge.due_at);
        Ok(purges)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::InMemoryMessageStore;
    use crate::models::message::NewChatMessage;
    use crate::models::user::UserProfile;
    use crate::store::{MessageStore, PendingPurge, StoreError};

    fn new_message(order_id: u64, sender_id: u64, offset_secs: i64) -> NewChatMessage {
        NewChatMessage {
            order_id,
            sender_id,
            receiver_id: sender_id + 1,
            content: format!("msg at {offset_secs}"),
            sent_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn history_is_ordered_and_joined_with_sender() {
        let store = InMemoryMessageStore::new();
        store
            .upsert_user(UserProfile {
                id: 1,
                name: "Budi".to_string(),
                role: "kurir".to_string(),
            })
            .await
            .unwrap();

        store.create_message(new_message(10, 1, 5)).await.unwrap();
        store.create_message(new_message(10, 3, 0)).await.unwrap();
        store.create_message(new_message(11, 1, 1)).await.unwrap();

        let history = store.list_messages(10).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message.sender_id, 3);
        assert!(history[0].sender.is_none());
        assert_eq!(history[1].sender.as_ref().unwrap().name, "Budi");
    }

    #[tokio::test]
    async fn mark_read_only_touches_the_receiver() {
        let store = InMemoryMessageStore::new();
        store.create_message(new_message(10, 1, 0)).await.unwrap();
        store.create_message(new_message(10, 2, 1)).await.unwrap();

        assert_eq!(store.mark_read(10, 2).await.unwrap(), 1);
        assert_eq!(store.mark_read(10, 2).await.unwrap(), 0);

        let history = store.list_messages(10).await.unwrap();
        assert!(history[0].message.is_read);
        assert!(!history[1].message.is_read);
    }

    #[tokio::test]
    async fn clear_purge_ignores_a_replaced_schedule() {
        let store = InMemoryMessageStore::new();
        let first = PendingPurge {
            order_id: 4,
            due_at: Utc::now(),
        };
        let second = PendingPurge {
            order_id: 4,
            due_at: first.due_at + Duration::hours(1),
        };

        store.save_purge(first).await.unwrap();
        store.save_purge(second).await.unwrap();

        assert!(!store.clear_purge(first).await.unwrap());
        assert_eq!(store.pending_purges().await.unwrap(), vec![second]);
        assert!(store.clear_purge(second).await.unwrap());
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = InMemoryMessageStore::new();
        store.set_offline(true);

        let result = store.create_message(new_message(1, 1, 0)).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
