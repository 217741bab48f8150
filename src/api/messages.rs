// Messaging endpoints: conversation fetch, send, mark-as-read.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::chat::MessageGateway;
use crate::error::ApiError;
use crate::models::{Message, MessageId, User, UserId};

use super::ApiClient;

/// A message as the backend returns it. The denormalized `sender` /
/// `recipient` snapshots are not always present, which is why the
/// directory cache exists at all.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub id: i64,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub sender: Option<User>,
    #[serde(default)]
    pub recipient: Option<User>,
}

impl WireMessage {
    pub fn into_message(self) -> Message {
        Message {
            id: MessageId::Confirmed(self.id),
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            content: self.content,
            sent_at: self.sent_at,
            is_read: self.is_read,
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    recipient_id: UserId,
    content: &'a str,
}

/// The backend emits RFC 3339 when its datetimes are timezone-aware and a
/// bare naive datetime otherwise; accept both, treating naive as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp: {}", raw)))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

impl ApiClient {
    /// Fetch the message history between the current user and `counterparty`.
    pub async fn conversation_messages(
        &self,
        counterparty: UserId,
    ) -> Result<Vec<WireMessage>, ApiError> {
        self.get_json(&format!(
            "/api/messages/messages/conversation/{}",
            counterparty
        ))
        .await
    }

    /// Fetch every message involving the current user.
    pub async fn all_messages(&self) -> Result<Vec<WireMessage>, ApiError> {
        self.get_json("/api/messages/messages/").await
    }

    /// Post a new message to `recipient`.
    pub async fn post_message(
        &self,
        recipient: UserId,
        content: &str,
    ) -> Result<WireMessage, ApiError> {
        let payload = SendMessagePayload {
            recipient_id: recipient,
            content,
        };
        self.post_json("/api/messages/messages/", &payload).await
    }

    /// Acknowledge a message as read.
    pub async fn mark_message_read(&self, message_id: i64) -> Result<(), ApiError> {
        self.patch_unit(&format!("/api/messages/messages/{}/read", message_id))
            .await
    }
}

#[async_trait]
impl MessageGateway for ApiClient {
    async fn fetch_conversation(&self, counterparty: UserId) -> Result<Vec<WireMessage>, ApiError> {
        self.conversation_messages(counterparty).await
    }

    async fn fetch_all_messages(&self) -> Result<Vec<WireMessage>, ApiError> {
        self.all_messages().await
    }

    async fn send_message(
        &self,
        recipient: UserId,
        content: &str,
    ) -> Result<WireMessage, ApiError> {
        self.post_message(recipient, content).await
    }

    async fn mark_read(&self, message_id: i64) -> Result<(), ApiError> {
        self.mark_message_read(message_id).await
    }
}
