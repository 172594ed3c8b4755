use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::chat::broker::Broker;
use crate::chat::room::{ChatRoomRegistry, Frame};
use crate::chat::token::{IssuedToken, TokenIssuer};
use crate::error::AppError;
use crate::models::message::{
    ChatMessage, ChatMessageWithSender, NewChatMessage, RelayEnvelope, SendChatRequest,
};
use crate::models::{OrderId, UserId};
use crate::observability::metrics::Metrics;
use crate::store::MessageStore;

/// A send that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSend {
    pub order_id: OrderId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub sender_role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub message: ChatMessage,
    pub local_deliveries: usize,
}

/// Single send path for chat: persist, fan out to local room members, then
/// publish to the broker.
pub struct MessageRelay {
    store: Arc<dyn MessageStore>,
    broker: Arc<dyn Broker>,
    rooms: Arc<ChatRoomRegistry>,
    tokens: TokenIssuer,
    metrics: Metrics,
}

impl MessageRelay {
    pub fn new(
        store: Arc<dyn MessageStore>,
        broker: Arc<dyn Broker>,
        rooms: Arc<ChatRoomRegistry>,
        tokens: TokenIssuer,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            broker,
            rooms,
            tokens,
            metrics,
        }
    }

    pub async fn send(&self, request: SendChatRequest) -> Result<SendReceipt, AppError> {
        let send = validate(request)?;
        let result = self.send_validated(send).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(AppError::Persistence(_)) => "persistence_error",
            Err(AppError::Configuration(_)) => "configuration_error",
            Err(_) => "relay_error",
        };
        self.metrics
            .chat_sends_total
            .with_label_values(&[outcome])
            .inc();

        result
    }

    async fn send_validated(&self, send: ValidatedSend) -> Result<SendReceipt, AppError> {
        let message = self
            .store
            .create_message(NewChatMessage {
                order_id: send.order_id,
                sender_id: send.sender_id,
                receiver_id: send.receiver_id,
                content: send.content,
                sent_at: Utc::now(),
            })
            .await
            .map_err(|err| {
                error!(order_id = send.order_id, error = %err, "failed to persist chat message");
                AppError::from(err)
            })?;

        let envelope = RelayEnvelope::for_message(&message, &send.sender_role);

        let local_deliveries = match serde_json::to_string(&envelope) {
            Ok(json) => self.rooms.broadcast(message.order_id, None, Frame::Text(json)),
            Err(err) => {
                warn!(error = %err, "failed to serialize envelope for local room");
                0
            }
        };

        let start = Instant::now();
        let published = self.broker.publish(&envelope).await;
        let outcome = if published.is_ok() { "success" } else { "error" };
        self.metrics
            .relay_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());

        if let Err(err) = published {
            // The message stays in history; only live delivery failed.
            warn!(
                order_id = message.order_id,
                message_id = message.id,
                error = %err,
                "broker publish failed"
            );
            return Err(AppError::from(err));
        }

        info!(
            order_id = message.order_id,
            message_id = message.id,
            local_deliveries,
            "chat message relayed"
        );

        Ok(SendReceipt {
            message,
            local_deliveries,
        })
    }

    pub async fn load_history(&self, order_id: &str) -> Result<Vec<ChatMessageWithSender>, AppError> {
        let order_id = parse_order_id(order_id)?;
        Ok(self.store.list_messages(order_id).await?)
    }

    pub async fn mark_read(&self, order_id: &str, reader_id: UserId) -> Result<u64, AppError> {
        let order_id = parse_order_id(order_id)?;
        Ok(self.store.mark_read(order_id, reader_id).await?)
    }

    pub async fn purge_now(&self, order_id: &str) -> Result<u64, AppError> {
        let order_id = parse_order_id(order_id)?;
        let deleted = self.store.delete_messages(order_id).await?;
        info!(order_id, deleted, "chat history purged");
        Ok(deleted)
    }

    pub fn issue_token(&self, user_id: &str) -> Result<IssuedToken, AppError> {
        self.tokens.issue(user_id)
    }
}

pub fn parse_order_id(raw: &str) -> Result<OrderId, AppError> {
    match raw.trim().parse::<OrderId>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::InvalidInput(format!(
            "order_id must be a positive integer, got {raw:?}"
        ))),
    }
}

fn parse_user_id(field: &str, raw: &str) -> Result<UserId, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::InvalidInput(format!("{field} is required")));
    }
    raw.parse::<UserId>()
        .map_err(|_| AppError::InvalidInput(format!("{field} must be a numeric user id")))
}

pub fn validate(request: SendChatRequest) -> Result<ValidatedSend, AppError> {
    let order_id = parse_order_id(&request.order_id)?;
    let sender_id = parse_user_id("sender_id", &request.sender_id)?;
    let receiver_id = parse_user_id("receiver_id", &request.receiver_id)?;

    if request.content.is_empty() {
        return Err(AppError::InvalidInput("content is required".to_string()));
    }

    Ok(ValidatedSend {
        order_id,
        sender_id,
        receiver_id,
        sender_role: request.sender_role,
        content: request.content,
    })
}
