// Conversation store for TutorLink
// Owns the counterparty -> Conversation map and is its single writer; the
// renderer only ever sees cloned snapshots taken under the same lock that
// mutations hold, so derived fields are never observed mid-update.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::messages::WireMessage;
use crate::error::{ApiError, StoreError};
use crate::models::{Conversation, Message, MessageId, Role, UserId};

pub mod polling;

/// How far apart a pending message's local timestamp and a server message's
/// timestamp may be while still treating them as the same logical message.
const ECHO_MATCH_WINDOW_SECS: i64 = 10;

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Transport seam the store talks through. `ApiClient` implements this
/// against the real backend; tests drive the store with an in-memory fake.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn fetch_conversation(&self, counterparty: UserId) -> Result<Vec<WireMessage>, ApiError>;
    async fn fetch_all_messages(&self) -> Result<Vec<WireMessage>, ApiError>;
    async fn send_message(&self, recipient: UserId, content: &str)
        -> Result<WireMessage, ApiError>;
    async fn mark_read(&self, message_id: i64) -> Result<(), ApiError>;
}

/// Store notifications for the renderer, delivered over the channel handed
/// out by [`ChatStore::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    ConversationUpdated(UserId),
    LoadFailed(UserId),
    SendFailed(UserId),
}

/// Identity of the logged-in user, fixed for the lifetime of the store.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub id: UserId,
    pub role: Role,
}

/// The conversation store. One instance per session, injected into its
/// consumers; created at login, dropped at logout.
pub struct ChatStore {
    user: CurrentUser,
    gateway: Arc<dyn MessageGateway>,
    conversations: Mutex<HashMap<UserId, Conversation>>,
    events: mpsc::Sender<StoreEvent>,
}

impl ChatStore {
    pub fn new(
        user: CurrentUser,
        gateway: Arc<dyn MessageGateway>,
    ) -> (Arc<Self>, mpsc::Receiver<StoreEvent>) {
        let (events, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (
            Arc::new(ChatStore {
                user,
                gateway,
                conversations: Mutex::new(HashMap::new()),
                events,
            }),
            event_rx,
        )
    }

    pub fn current_user(&self) -> CurrentUser {
        self.user
    }

    /// Snapshot of one conversation, if it exists yet.
    pub fn conversation(&self, counterparty: UserId) -> Option<Conversation> {
        self.lock_conversations().get(&counterparty).cloned()
    }

    /// All known conversations, most recently active first; conversations
    /// without any message sort last.
    pub fn list_conversations(&self) -> Vec<(UserId, Conversation)> {
        let mut items: Vec<(UserId, Conversation)> = self
            .lock_conversations()
            .iter()
            .map(|(id, conv)| (*id, conv.clone()))
            .collect();
        items.sort_by(|a, b| match (&a.1.last_message, &b.1.last_message) {
            (Some(x), Some(y)) => y.sent_at.cmp(&x.sent_at),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });
        items
    }

    /// Incoming unread messages across every conversation.
    pub fn total_unread(&self) -> usize {
        self.lock_conversations()
            .values()
            .map(|c| c.unread_count)
            .sum()
    }

    /// Fetch the authoritative message list for `counterparty` and merge it
    /// into the in-memory conversation. Server copies win for confirmed
    /// messages; locally pending (optimistic, unconfirmed) messages survive
    /// unless the response already contains their echo. On failure the
    /// previous conversation state is left untouched.
    pub async fn load_conversation(
        &self,
        counterparty: UserId,
    ) -> Result<Conversation, StoreError> {
        let wire = self
            .gateway
            .fetch_conversation(counterparty)
            .await
            .map_err(|source| {
                self.emit(StoreEvent::LoadFailed(counterparty));
                StoreError::LoadFailed {
                    counterparty,
                    source,
                }
            })?;

        let server: Vec<Message> = wire.into_iter().map(WireMessage::into_message).collect();
        let snapshot = {
            let mut map = self.lock_conversations();
            let conv = map.entry(counterparty).or_default();
            conv.merge_server(server, self.user.id);
            conv.clone()
        };
        self.emit(StoreEvent::ConversationUpdated(counterparty));
        Ok(snapshot)
    }

    /// Fetch every message involving the current user and rebuild the
    /// conversation map from it, grouping by counterparty. Conversations the
    /// response does not mention are left as they are.
    pub async fn refresh_all(&self) -> Result<(), StoreError> {
        let wire = self
            .gateway
            .fetch_all_messages()
            .await
            .map_err(StoreError::RefreshFailed)?;

        let mut grouped: HashMap<UserId, Vec<Message>> = HashMap::new();
        for message in wire.into_iter().map(WireMessage::into_message) {
            let counterparty = message.counterparty(self.user.id);
            grouped.entry(counterparty).or_default().push(message);
        }

        let updated: Vec<UserId> = {
            let mut map = self.lock_conversations();
            grouped
                .into_iter()
                .map(|(counterparty, server)| {
                    let conv = map.entry(counterparty).or_default();
                    conv.merge_server(server, self.user.id);
                    counterparty
                })
                .collect()
        };
        for counterparty in updated {
            self.emit(StoreEvent::ConversationUpdated(counterparty));
        }
        Ok(())
    }

    /// Send a message to `counterparty`.
    ///
    /// The provisional message is appended (and derived fields recomputed)
    /// before the network call starts, so any renderer sees it immediately.
    /// On success the provisional entry is replaced by the server-confirmed
    /// copy, exactly once. On failure the provisional entry is retained,
    /// visibly unsent, and the caller gets `SendFailed` so the user can
    /// retry.
    pub async fn send_message(
        &self,
        counterparty: UserId,
        content: &str,
    ) -> Result<Message, StoreError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::EmptyMessage);
        }

        let provisional_id = Uuid::new_v4();
        let provisional = Message {
            id: MessageId::Pending(provisional_id),
            sender_id: self.user.id,
            recipient_id: counterparty,
            content: content.to_string(),
            sent_at: Utc::now(),
            is_read: false,
        };

        {
            let mut map = self.lock_conversations();
            let conv = map.entry(counterparty).or_default();
            conv.messages.push(provisional);
            conv.rebuild(self.user.id);
        }
        self.emit(StoreEvent::ConversationUpdated(counterparty));

        match self.gateway.send_message(counterparty, content).await {
            Ok(wire) => {
                let confirmed = wire.into_message();
                let result = confirmed.clone();
                {
                    let mut map = self.lock_conversations();
                    let conv = map.entry(counterparty).or_default();
                    conv.confirm(provisional_id, confirmed, self.user.id);
                }
                self.emit(StoreEvent::ConversationUpdated(counterparty));
                Ok(result)
            }
            Err(source) => {
                warn!(
                    "Send to {} failed, keeping unsent message visible: {}",
                    counterparty, source
                );
                self.emit(StoreEvent::SendFailed(counterparty));
                Err(StoreError::SendFailed {
                    recipient: counterparty,
                    source,
                })
            }
        }
    }

    /// Flip an incoming message to read and acknowledge it to the server.
    ///
    /// The flip is synchronous and atomic with the unread-count recompute;
    /// the acknowledgment is fire-and-forget (spawned, failures logged).
    /// Marking an already-read or unknown message is a no-op. Must be called
    /// from within the tokio runtime.
    pub fn mark_message_read(&self, message_id: i64) {
        let flipped = {
            let mut map = self.lock_conversations();
            let mut hit = None;
            'outer: for (counterparty, conv) in map.iter_mut() {
                for message in conv.messages.iter_mut() {
                    if message.id == MessageId::Confirmed(message_id) {
                        if !message.is_incoming(self.user.id) || message.is_read {
                            return; // own message or already read
                        }
                        message.is_read = true;
                        hit = Some(*counterparty);
                        break 'outer;
                    }
                }
            }
            if let Some(counterparty) = hit {
                if let Some(conv) = map.get_mut(&counterparty) {
                    conv.rebuild(self.user.id);
                }
            }
            hit
        };

        if let Some(counterparty) = flipped {
            self.emit(StoreEvent::ConversationUpdated(counterparty));
            let gateway = self.gateway.clone();
            tokio::spawn(async move {
                if let Err(e) = gateway.mark_read(message_id).await {
                    warn!("Read acknowledgment for message {} failed: {}", message_id, e);
                }
            });
        }
    }

    fn lock_conversations(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, Conversation>> {
        self.conversations.lock().expect("conversation map poisoned")
    }

    fn emit(&self, event: StoreEvent) {
        if let Err(e) = self.events.try_send(event) {
            debug!("Dropping store event, receiver busy or gone: {}", e);
        }
    }
}

impl Conversation {
    /// Re-sort by `sent_at` and recompute the derived fields. Every mutation
    /// goes through here before its lock is released. The sort is stable, so
    /// a pending message appended after its peers stays after server
    /// messages carrying the same timestamp.
    fn rebuild(&mut self, current_user: UserId) {
        self.messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        self.last_message = self.messages.last().cloned();
        self.unread_count = self
            .messages
            .iter()
            .filter(|m| m.is_incoming(current_user) && !m.is_read)
            .count();
    }

    /// Merge an authoritative server message list into this conversation.
    /// Server copies win for messages present in both; local messages the
    /// response does not contain are retained: a pending entry because its
    /// send has not been confirmed, a confirmed entry because the snapshot
    /// may simply predate it (nothing in this system deletes messages).
    fn merge_server(&mut self, server: Vec<Message>, current_user: UserId) {
        let mut merged = server;

        // A locally-read message whose acknowledgment has not landed yet
        // would flicker back to unread on every poll if the server copy won.
        for message in merged.iter_mut() {
            if !message.is_read {
                if let Some(local) = self.messages.iter().find(|l| l.id == message.id) {
                    if local.is_read {
                        message.is_read = true;
                    }
                }
            }
        }

        for local in &self.messages {
            let matched = match local.id {
                MessageId::Confirmed(_) => merged.iter().any(|m| m.id == local.id),
                MessageId::Pending(_) => merged.iter().any(|m| is_echo_of(m, local)),
            };
            if !matched {
                merged.push(local.clone());
            }
        }

        self.messages = merged;
        self.rebuild(current_user);
    }

    /// Replace the provisional entry with the server-confirmed copy. If a
    /// poll already merged the server echo (and dropped the pending entry),
    /// this is a no-op rather than a duplicate insert.
    fn confirm(&mut self, provisional: Uuid, confirmed: Message, current_user: UserId) {
        if let Some(index) = self
            .messages
            .iter()
            .position(|m| m.id == MessageId::Pending(provisional))
        {
            self.messages[index] = confirmed;
        } else if !self.messages.iter().any(|m| m.id == confirmed.id) {
            self.messages.push(confirmed);
        }
        self.rebuild(current_user);
    }
}

/// Best-effort match between a server message and a locally pending one:
/// same sender, same content, timestamps close together.
fn is_echo_of(server: &Message, pending: &Message) -> bool {
    server.sender_id == pending.sender_id
        && server.content == pending.content
        && (server.sent_at - pending.sent_at).num_seconds().abs() <= ECHO_MATCH_WINDOW_SECS
}
