use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::AbortHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chat::relay::parse_order_id;
use crate::error::AppError;
use crate::models::OrderId;
use crate::observability::metrics::Metrics;
use crate::store::{MessageStore, PendingPurge};

struct ArmedPurge {
    ticket: Uuid,
    handle: AbortHandle,
}

/// Deletes an order's chat history a fixed delay after it is scheduled.
///
/// Every armed purge is written to the store first and re-armed by
/// [`RetentionScheduler::resume`] on startup. A purge fires at most once:
/// a failed delete is logged and not retried.
pub struct RetentionScheduler {
    store: Arc<dyn MessageStore>,
    delay: Duration,
    armed: DashMap<OrderId, ArmedPurge>,
    metrics: Metrics,
}

impl RetentionScheduler {
    pub fn new(store: Arc<dyn MessageStore>, delay: Duration, metrics: Metrics) -> Self {
        Self {
            store,
            delay,
            armed: DashMap::new(),
            metrics,
        }
    }

    pub async fn schedule(self: &Arc<Self>, order_id: &str) -> Result<PendingPurge, AppError> {
        let order_id = parse_order_id(order_id)?;
        let delay = chrono::Duration::from_std(self.delay)
            .map_err(|err| AppError::Configuration(format!("invalid retention delay: {err}")))?;

        let due_at = Utc::now().checked_add_signed(delay).ok_or_else(|| {
            AppError::Configuration(format!("retention delay {:?} out of range", self.delay))
        })?;

        let purge = PendingPurge { order_id, due_at };

        self.store.save_purge(purge).await?;
        self.arm(purge);

        info!(
            order_id,
            due_at = %purge.due_at,
            "chat purge scheduled"
        );
        Ok(purge)
    }

    /// Disarms a pending purge. Returns whether anything was pending.
    pub async fn cancel(&self, order_id: &str) -> Result<bool, AppError> {
        let order_id = parse_order_id(order_id)?;

        let was_armed = match self.armed.remove(&order_id) {
            Some((_, armed)) => {
                armed.handle.abort();
                true
            }
            None => false,
        };
        let had_row = self.store.cancel_purge(order_id).await?;

        if was_armed || had_row {
            info!(order_id, "chat purge cancelled");
        }
        Ok(was_armed || had_row)
    }

    /// Re-arms every purge persisted by an earlier process. Overdue purges
    /// fire right away.
    pub async fn resume(self: &Arc<Self>) -> Result<usize, AppError> {
        let pending = self.store.pending_purges().await?;
        for purge in &pending {
            self.arm(*purge);
        }

        if !pending.is_empty() {
            info!(count = pending.len(), "resumed pending chat purges");
        }
        Ok(pending.len())
    }

    pub fn pending_count(&self) -> usize {
        self.armed.len()
    }

    fn arm(self: &Arc<Self>, purge: PendingPurge) {
        let ticket = Uuid::new_v4();
        let wait = (purge.due_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        // The entry stays locked until the handle is stored, so a purge that
        // fires immediately cannot race its own registration.
        let entry = self.armed.entry(purge.order_id);

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            scheduler.fire(purge, ticket).await;
        })
        .abort_handle();

        let armed = ArmedPurge { ticket, handle };
        match entry {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(armed);
                previous.handle.abort();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(armed);
            }
        }
    }

    async fn fire(&self, purge: PendingPurge, ticket: Uuid) {
        match self.store.delete_messages(purge.order_id).await {
            Ok(deleted) => {
                self.metrics
                    .chat_purges_total
                    .with_label_values(&["success"])
                    .inc();
                info!(order_id = purge.order_id, deleted, "scheduled chat purge completed");
            }
            Err(err) => {
                self.metrics
                    .chat_purges_total
                    .with_label_values(&["error"])
                    .inc();
                error!(order_id = purge.order_id, error = %err, "scheduled chat purge failed");
            }
        }

        if let Err(err) = self.store.clear_purge(purge).await {
            warn!(order_id = purge.order_id, error = %err, "failed to clear purge schedule");
        }

        self.armed
            .remove_if(&purge.order_id, |_, armed| armed.ticket == ticket);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use super::RetentionScheduler;
    use crate::error::AppError;
    use crate::models::message::NewChatMessage;
    use crate::observability::metrics::Metrics;
    use crate::store::{InMemoryMessageStore, MessageStore, PendingPurge};

    const DELAY: Duration = Duration::from_millis(150);

    async fn seeded_store(order_id: u64) -> Arc<InMemoryMessageStore> {
        let store = Arc::new(InMemoryMessageStore::new());
        for content in ["first", "second"] {
            store
                .create_message(NewChatMessage {
                    order_id,
                    sender_id: 1,
                    receiver_id: 2,
                    content: content.to_string(),
                    sent_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        store
    }

    fn scheduler(store: Arc<InMemoryMessageStore>) -> Arc<RetentionScheduler> {
        Arc::new(RetentionScheduler::new(store, DELAY, Metrics::new()))
    }

    #[tokio::test]
    async fn history_survives_until_the_delay_elapses() {
        let store = seeded_store(10).await;
        let retention = scheduler(store.clone());

        let purge = retention.schedule("10").await.unwrap();
        assert_eq!(purge.order_id, 10);
        assert_eq!(retention.pending_count(), 1);

        tokio::time::sleep(DELAY / 3).await;
        assert_eq!(store.list_messages(10).await.unwrap().len(), 2);

        tokio::time::sleep(DELAY * 3).await;
        assert!(store.list_messages(10).await.unwrap().is_empty());
        assert_eq!(retention.pending_count(), 0);
        assert!(store.pending_purges().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_purge_never_fires() {
        let store = seeded_store(11).await;
        let retention = scheduler(store.clone());

        retention.schedule("11").await.unwrap();
        assert!(retention.cancel("11").await.unwrap());
        assert!(!retention.cancel("11").await.unwrap());

        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(store.list_messages(11).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_pending_purge() {
        let store = seeded_store(12).await;
        let retention = scheduler(store.clone());

        retention.schedule("12").await.unwrap();
        retention.schedule("12").await.unwrap();

        assert_eq!(retention.pending_count(), 1);
        assert_eq!(store.pending_purges().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn resume_rearms_persisted_purges() {
        let store = seeded_store(13).await;
        store
            .save_purge(PendingPurge {
                order_id: 13,
                due_at: Utc::now() - chrono::Duration::seconds(1),
            })
            .await
            .unwrap();

        let retention = scheduler(store.clone());
        assert_eq!(retention.resume().await.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.list_messages(13).await.unwrap().is_empty());
        assert_eq!(retention.pending_count(), 0);
    }

    #[tokio::test]
    async fn failed_delete_is_not_retried() {
        let store = seeded_store(14).await;
        let retention = scheduler(store.clone());

        retention.schedule("14").await.unwrap();
        store.set_offline(true);
        tokio::time::sleep(DELAY * 3).await;
        store.set_offline(false);

        assert_eq!(retention.pending_count(), 0);
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(store.list_messages(14).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn out_of_range_delay_is_a_configuration_error() {
        let store = seeded_store(15).await;
        let retention = Arc::new(RetentionScheduler::new(
            store.clone(),
            Duration::from_secs(9_000_000_000_000),
            Metrics::new(),
        ));

        assert!(matches!(
            retention.schedule("15").await,
            Err(AppError::Configuration(_))
        ));
        assert_eq!(retention.pending_count(), 0);
        assert!(store.pending_purges().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_order_id_is_rejected() {
        let retention = scheduler(Arc::new(InMemoryMessageStore::new()));
        assert!(matches!(
            retention.schedule("nope").await,
            Err(AppError::InvalidInput(_))
        ));
    }
}
