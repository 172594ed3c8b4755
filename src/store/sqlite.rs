use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::models::message::{ChatMessage, ChatMessageWithSender, NewChatMessage};
use crate::models::user::UserProfile;
use crate::models::{OrderId, UserId};
use crate::store::{MessageStore, PendingPurge, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id   INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        role TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        order_id    INTEGER NOT NULL,
        sender_id   INTEGER NOT NULL,
        receiver_id INTEGER NOT NULL,
        content     TEXT NOT NULL,
        sent_at     INTEGER NOT NULL,
        is_read     BOOLEAN NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS messages_order_sent ON messages (order_id, sent_at)",
    r#"
    CREATE TABLE IF NOT EXISTS chat_purges (
        order_id INTEGER PRIMARY KEY,
        due_at   INTEGER NOT NULL
    )
    "#,
];

type MessageRow = (
    i64,
    i64,
    i64,
    i64,
    String,
    i64,
    bool,
    Option<String>,
    Option<String>,
);

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => StoreError::Rejected(db_err.to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// SQLite-backed message store. Timestamps are stored as unix milliseconds.
#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // An in-memory database lives only as long as its single connection.
        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn to_db(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::Rejected(format!("id {id} out of range")))
}

fn from_db(value: i64) -> u64 {
    value.max(0) as u64
}

fn timestamp_from_db(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Unavailable(format!("corrupt timestamp {millis}")))
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn create_message(&self, message: NewChatMessage) -> Result<ChatMessage, StoreError> {
        let sent_at_ms = message.sent_at.timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO messages (order_id, sender_id, receiver_id, content, sent_at, is_read)
            VALUES ($1, $2, $3, $4, $5, 0)
            "#,
        )
        .bind(to_db(message.order_id)?)
        .bind(to_db(message.sender_id)?)
        .bind(to_db(message.receiver_id)?)
        .bind(&message.content)
        .bind(sent_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(ChatMessage {
            id: from_db(result.last_insert_rowid()),
            order_id: message.order_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            sent_at: timestamp_from_db(sent_at_ms)?,
            is_read: false,
        })
    }

    async fn list_messages(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ChatMessageWithSender>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.id, m.order_id, m.sender_id, m.receiver_id, m.content, m.sent_at, m.is_read,
                   u.name, u.role
            FROM messages m
            LEFT JOIN users u ON u.id = m.sender_id
            WHERE m.order_id = $1
            ORDER BY m.sent_at ASC, m.id ASC
            "#,
        )
        .bind(to_db(order_id)?)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(id, order_id, sender_id, receiver_id, content, sent_at, is_read, name, role)| {
                    let sender = match (name, role) {
                        (Some(name), Some(role)) => Some(UserProfile {
                            id: from_db(sender_id),
                            name,
                            role,
                        }),
                        _ => None,
                    };

                    Ok(ChatMessageWithSender {
                        message: ChatMessage {
                            id: from_db(id),
                            order_id: from_db(order_id),
                            sender_id: from_db(sender_id),
                            receiver_id: from_db(receiver_id),
                            content,
                            sent_at: timestamp_from_db(sent_at)?,
                            is_read,
                        },
                        sender,
                    })
                },
            )
            .collect()
    }

    async fn delete_messages(&self, order_id: OrderId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE order_id = $1")
            .bind(to_db(order_id)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn mark_read(&self, order_id: OrderId, receiver_id: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1 WHERE order_id = $1 AND receiver_id = $2 AND is_read = 0",
        )
        .bind(to_db(order_id)?)
        .bind(to_db(receiver_id)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_user(&self, profile: UserProfile) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, role) VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = excluded.name, role = excluded.role
            "#,
        )
        .bind(to_db(profile.id)?)
        .bind(&profile.name)
        .bind(&profile.role)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_purge(&self, purge: PendingPurge) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO chat_purges (order_id, due_at) VALUES ($1, $2)
            ON CONFLICT (order_id) DO UPDATE SET due_at = excluded.due_at
            "#,
        )
        .bind(to_db(purge.order_id)?)
        .bind(purge.due_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_purge(&self, purge: PendingPurge) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM chat_purges WHERE order_id = $1 AND due_at = $2")
            .bind(to_db(purge.order_id)?)
            .bind(purge.due_at.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cancel_purge(&self, order_id: OrderId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM chat_purges WHERE order_id = $1")
            .bind(to_db(order_id)?)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn pending_purges(&self) -> Result<Vec<PendingPurge>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, i64)>(
            "SELECT order_id, due_at FROM chat_purges ORDER BY due_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(order_id, due_at)| {
                Ok(PendingPurge {
                    order_id: from_db(order_id),
                    due_at: timestamp_from_db(due_at)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::SqliteMessageStore;
    use crate::models::message::NewChatMessage;
    use crate::models::user::UserProfile;
    use crate::store::{MessageStore, PendingPurge};

    async fn store() -> SqliteMessageStore {
        SqliteMessageStore::connect("sqlite::memory:").await.unwrap()
    }

    fn message(order_id: u64, sender_id: u64, receiver_id: u64, content: &str) -> NewChatMessage {
        NewChatMessage {
            order_id,
            sender_id,
            receiver_id,
            content: content.to_string(),
            sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stores_and_lists_messages_with_sender_profile() {
        let store = store().await;
        store
            .upsert_user(UserProfile {
                id: 7,
                name: "Sari".to_string(),
                role: "customer".to_string(),
            })
            .await
            .unwrap();

        let first = store.create_message(message(42, 7, 8, "halo")).await.unwrap();
        let second = store.create_message(message(42, 8, 7, "otw")).await.unwrap();
        store.create_message(message(43, 7, 8, "other order")).await.unwrap();

        let history = store.list_messages(42).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, first);
        assert_eq!(history[1].message, second);
        assert_eq!(history[0].sender.as_ref().unwrap().name, "Sari");
        assert!(history[1].sender.is_none());
    }

    #[tokio::test]
    async fn delete_and_mark_read_are_scoped_to_the_order() {
        let store = store().await;
        store.create_message(message(1, 7, 8, "a")).await.unwrap();
        store.create_message(message(1, 7, 8, "b")).await.unwrap();
        store.create_message(message(2, 7, 8, "c")).await.unwrap();

        assert_eq!(store.mark_read(1, 8).await.unwrap(), 2);
        assert!(store.list_messages(1).await.unwrap().iter().all(|m| m.message.is_read));
        assert!(!store.list_messages(2).await.unwrap()[0].message.is_read);

        assert_eq!(store.delete_messages(1).await.unwrap(), 2);
        assert!(store.list_messages(1).await.unwrap().is_empty());
        assert_eq!(store.list_messages(2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn purge_rows_round_trip_and_replace() {
        let store = store().await;
        let due_at = Utc::now() + Duration::hours(24);
        let purge = PendingPurge { order_id: 5, due_at };

        store.save_purge(purge).await.unwrap();
        let later = PendingPurge {
            order_id: 5,
            due_at: due_at + Duration::hours(1),
        };
        store.save_purge(later).await.unwrap();

        let pending = store.pending_purges().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].due_at.timestamp_millis(), later.due_at.timestamp_millis());

        assert!(!store.clear_purge(purge).await.unwrap());
        assert!(store.cancel_purge(5).await.unwrap());
        assert!(store.pending_purges().await.unwrap().is_empty());
    }
}
