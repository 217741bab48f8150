// Common test utilities for integration tests
// This module contains shared code for all integration tests

// Standard library imports
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

// External crate imports
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::LevelFilter;
use tokio::sync::mpsc;

// Import the crate functionality
use tutorlink::api::messages::WireMessage;
use tutorlink::chat::{ChatStore, CurrentUser, MessageGateway, StoreEvent};
use tutorlink::directory::DirectoryGateway;
use tutorlink::error::ApiError;
use tutorlink::models::{Role, User, UserId};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .init();
    });
}

/// An HTTP failure as the gateway boundary reports one.
pub fn server_error(path: &str) -> ApiError {
    ApiError::Status {
        path: path.to_string(),
        status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Fixed base instant for seeded message history; offsets keep ordering
/// assertions readable.
pub fn seeded_at(offset_secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 14, 10, 0, 0).unwrap() + chrono::Duration::seconds(offset_secs)
}

pub fn wire_message(
    id: i64,
    sender_id: UserId,
    recipient_id: UserId,
    content: &str,
    sent_at: DateTime<Utc>,
    is_read: bool,
) -> WireMessage {
    WireMessage {
        id,
        sender_id,
        recipient_id,
        content: content.to_string(),
        sent_at,
        is_read,
        sender: None,
        recipient: None,
    }
}

pub fn make_user(id: UserId, username: &str, role: Role) -> User {
    User {
        id,
        email: format!("{}@example.com", username),
        username: username.to_string(),
        role,
        is_active: true,
    }
}

/// In-memory stand-in for the backend, scriptable per test: seed message
/// history, inject per-call delays, flip failure switches, and inspect what
/// the store asked for.
pub struct FakeGateway {
    current_user: UserId,
    server: Mutex<HashMap<UserId, Vec<WireMessage>>>,
    next_id: AtomicI64,
    pub fetch_count: AtomicUsize,
    pub send_count: AtomicUsize,
    pub fetch_delay: Mutex<Option<Duration>>,
    pub send_delay: Mutex<Option<Duration>>,
    pub fail_fetch: AtomicBool,
    pub fail_send: AtomicBool,
    pub read_acks: Mutex<Vec<i64>>,
    pub users: Mutex<Vec<User>>,
    pub user_fetch_count: AtomicUsize,
    pub fail_users: AtomicBool,
}

impl FakeGateway {
    pub fn new(current_user: UserId) -> Arc<Self> {
        Arc::new(FakeGateway {
            current_user,
            server: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1000),
            fetch_count: AtomicUsize::new(0),
            send_count: AtomicUsize::new(0),
            fetch_delay: Mutex::new(None),
            send_delay: Mutex::new(None),
            fail_fetch: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            read_acks: Mutex::new(Vec::new()),
            users: Mutex::new(Vec::new()),
            user_fetch_count: AtomicUsize::new(0),
            fail_users: AtomicBool::new(false),
        })
    }

    /// Put a message into the server-side history for `counterparty`.
    pub fn seed_message(&self, counterparty: UserId, message: WireMessage) {
        self.server
            .lock()
            .unwrap()
            .entry(counterparty)
            .or_default()
            .push(message);
    }

    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn set_send_delay(&self, delay: Option<Duration>) {
        *self.send_delay.lock().unwrap() = delay;
    }

    pub fn fetches(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn acked(&self) -> Vec<i64> {
        self.read_acks.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageGateway for FakeGateway {
    async fn fetch_conversation(&self, counterparty: UserId) -> Result<Vec<WireMessage>, ApiError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        // Snapshot is taken when the request "reaches the server"; a delay
        // injected after this point models a slow response carrying stale
        // data.
        let snapshot = self
            .server
            .lock()
            .unwrap()
            .get(&counterparty)
            .cloned()
            .unwrap_or_default();
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(server_error("/api/messages/messages/conversation"));
        }
        Ok(snapshot)
    }

    async fn fetch_all_messages(&self) -> Result<Vec<WireMessage>, ApiError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(server_error("/api/messages/messages/"));
        }
        let all: Vec<WireMessage> = self
            .server
            .lock()
            .unwrap()
            .values()
            .flatten()
            .cloned()
            .collect();
        Ok(all)
    }

    async fn send_message(
        &self,
        recipient: UserId,
        content: &str,
    ) -> Result<WireMessage, ApiError> {
        self.send_count.fetch_add(1, Ordering::SeqCst);
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(server_error("/api/messages/messages/"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = WireMessage {
            id,
            sender_id: self.current_user,
            recipient_id: recipient,
            content: content.to_string(),
            sent_at: Utc::now(),
            is_read: false,
            sender: None,
            recipient: None,
        };
        self.server
            .lock()
            .unwrap()
            .entry(recipient)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn mark_read(&self, message_id: i64) -> Result<(), ApiError> {
        self.read_acks.lock().unwrap().push(message_id);
        Ok(())
    }
}

#[async_trait]
impl DirectoryGateway for FakeGateway {
    async fn fetch_users(&self) -> Result<Vec<User>, ApiError> {
        self.user_fetch_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_users.load(Ordering::SeqCst) {
            return Err(server_error("/api/users/users/"));
        }
        Ok(self.users.lock().unwrap().clone())
    }
}

/// Build a store for a student with the given id, wired to the fake.
pub fn student_store(
    fake: &Arc<FakeGateway>,
    user_id: UserId,
) -> (Arc<ChatStore>, mpsc::Receiver<StoreEvent>) {
    ChatStore::new(
        CurrentUser {
            id: user_id,
            role: Role::Student,
        },
        fake.clone(),
    )
}
