use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::user::UserProfile;
use crate::models::{OrderId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub order_id: OrderId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub order_id: OrderId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageWithSender {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub sender: Option<UserProfile>,
}

/// Inbound chat send. Every field arrives as text so validation can reject
/// malformed ids before anything is persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct SendChatRequest {
    #[serde(deserialize_with = "string_or_number")]
    pub order_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub sender_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub receiver_id: String,
    #[serde(alias = "sender", default)]
    pub sender_role: String,
    #[serde(alias = "message")]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeData {
    #[serde(rename = "sender")]
    pub sender_role: String,
    #[serde(rename = "message")]
    pub content: String,
    #[serde(rename = "time")]
    pub timestamp: String,
}

/// Broker publish body, also pushed verbatim to local room members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub channel: String,
    pub data: EnvelopeData,
}

impl RelayEnvelope {
    pub fn channel_for(order_id: OrderId) -> String {
        format!("chat:{order_id}")
    }

    pub fn for_message(message: &ChatMessage, sender_role: &str) -> Self {
        Self {
            channel: Self::channel_for(message.order_id),
            data: EnvelopeData {
                sender_role: sender_role.to_string(),
                content: message.content.clone(),
                timestamp: message.sent_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}
