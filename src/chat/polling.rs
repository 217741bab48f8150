// Polling scheduler
// Drives periodic re-fetch of a conversation while its view is open. One
// live poll per counterparty; cancellation is cooperative so a fetch that
// is already in flight still completes and merges its result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Notify;

use crate::models::UserId;

use super::ChatStore;

/// The web client refreshed an open chat every 3 seconds.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Cancellation handle for one polling loop. Cloning shares the underlying
/// flag; cancelling any clone stops the loop.
#[derive(Clone)]
pub struct PollHandle {
    counterparty: UserId,
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl PollHandle {
    pub fn counterparty(&self) -> UserId {
        self.counterparty
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Stop the loop. Synchronous: the flag is set before this returns, so
    /// no further fetch begins afterwards. A fetch already in flight runs to
    /// completion and its result is still merged.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

/// Registry of active polls, one per counterparty. Starting a poll for a
/// counterparty that already has one cancels the old loop first, so timers
/// never accumulate for the same target.
pub struct Poller {
    store: Arc<ChatStore>,
    active: Mutex<HashMap<UserId, PollHandle>>,
}

impl Poller {
    pub fn new(store: Arc<ChatStore>) -> Self {
        Poller {
            store,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Start polling `counterparty`: one fetch immediately, then one every
    /// `period` until the returned handle (or `stop`) cancels it. Tick
    /// failures are logged and never stop the loop.
    pub fn start(&self, counterparty: UserId, period: Duration) -> PollHandle {
        let handle = PollHandle {
            counterparty,
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        };

        if let Some(previous) = self
            .lock_active()
            .insert(counterparty, handle.clone())
        {
            debug!("Replacing existing poll for {}", counterparty);
            previous.cancel();
        }

        let store = self.store.clone();
        let loop_handle = handle.clone();
        tokio::spawn(async move {
            loop {
                if loop_handle.is_cancelled() {
                    break;
                }
                if let Err(e) = store.load_conversation(counterparty).await {
                    warn!("Poll tick for {} failed: {}", counterparty, e);
                }
                tokio::select! {
                    _ = loop_handle.notify.notified() => break,
                    _ = tokio::time::sleep(period) => {}
                }
            }
            debug!("Polling loop for {} stopped", counterparty);
        });

        handle
    }

    /// Cancel the poll for `counterparty`, if one is running.
    pub fn stop(&self, counterparty: UserId) {
        if let Some(handle) = self.lock_active().remove(&counterparty) {
            handle.cancel();
        }
    }

    pub fn stop_all(&self) {
        for (_, handle) in self.lock_active().drain() {
            handle.cancel();
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, PollHandle>> {
        self.active.lock().expect("poll registry poisoned")
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop_all();
    }
}
