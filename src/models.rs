use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric user identifier assigned by the backend.
pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    /// The role on the other side of a conversation.
    pub fn counterpart(self) -> Role {
        match self {
            Role::Student => Role::Teacher,
            Role::Teacher => Role::Student,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Teacher => "Teacher",
        }
    }
}

/// A message id lives in one of two id spaces: a provisional id minted
/// locally at optimistic-send time, or the id the server assigned once it
/// accepted the message. Reconciliation replaces Pending with Confirmed,
/// never duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    Pending(Uuid),
    Confirmed(i64),
}

impl MessageId {
    pub fn is_pending(&self) -> bool {
        matches!(self, MessageId::Pending(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
}

impl Message {
    /// Whether this message was sent by the counterparty rather than us.
    pub fn is_incoming(&self, current_user: UserId) -> bool {
        self.sender_id != current_user
    }

    /// The participant that is not `current_user`.
    pub fn counterparty(&self, current_user: UserId) -> UserId {
        if self.sender_id == current_user {
            self.recipient_id
        } else {
            self.sender_id
        }
    }
}

/// A two-party conversation, keyed by the counterparty id. There is no
/// conversation entity on the wire; this is synthesized client-side from
/// message sender/recipient pairing.
///
/// `last_message` and `unread_count` are derived from `messages` and must be
/// recomputed in the same step as any mutation of the message list, so a
/// renderer never observes them out of sync.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    pub messages: Vec<Message>,
    pub last_message: Option<Message>,
    pub unread_count: usize,
}

/// Minimal denormalized user snapshot cached by the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub user_id: UserId,
    pub username: String,
    pub email: String,
}

/// A user record as the backend returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub teacher_id: i64,
    pub name: String,
    pub description: String,
    pub hourly_rate: f64,
}

/// A tutor profile as the teacher service returns it. Most fields are
/// optional on the wire; display code falls back per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorProfile {
    pub id: i64,
    pub user_id: UserId,
    pub username: Option<String>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub years_of_experience: Option<u32>,
    pub education: Option<String>,
    pub average_rating: Option<f64>,
    pub total_reviews: Option<u32>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

impl TutorProfile {
    /// Display name with the same fallback the rest of the app uses for
    /// tutors whose user record carries no username.
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("Teacher {}", self.id),
        }
    }

    /// Hourly rate of the first listed subject; tutors without subjects
    /// sort as rate 0, matching the listing behavior.
    pub fn lead_hourly_rate(&self) -> f64 {
        self.subjects.first().map(|s| s.hourly_rate).unwrap_or(0.0)
    }
}
