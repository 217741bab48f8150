// Polling scheduler tests
// These tests verify the tick cadence and the cancellation contract under
// tokio's paused clock.

// Import common test utilities
mod common;
use common::{seeded_at, setup_logging, student_store, wire_message, FakeGateway};

// External crate imports
use anyhow::Result;
use std::sync::atomic::Ordering;
use std::time::Duration;

// Import the crate functionality
use tutorlink::chat::polling::Poller;

const ME: i64 = 1;
const TUTOR: i64 = 7;
const PERIOD: Duration = Duration::from_secs(3);

/// The poller fetches once immediately, then once per interval, and after
/// cancellation no further fetch happens no matter how far time advances.
#[tokio::test(start_paused = true)]
async fn test_poll_cadence_and_cancellation() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);
    fake.seed_message(TUTOR, wire_message(1, TUTOR, ME, "hi", seeded_at(0), false));

    let poller = Poller::new(store.clone());
    let handle = poller.start(TUTOR, PERIOD);

    // Immediate first tick
    tokio::task::yield_now().await;
    assert_eq!(fake.fetches(), 1);
    assert_eq!(
        store.conversation(TUTOR).map(|c| c.messages.len()),
        Some(1),
        "first tick already loaded the conversation"
    );

    // One more tick per interval
    tokio::time::sleep(PERIOD + Duration::from_millis(100)).await;
    assert_eq!(fake.fetches(), 2);
    tokio::time::sleep(PERIOD).await;
    assert_eq!(fake.fetches(), 3);

    // After cancel, several intervals pass without a single further fetch
    handle.cancel();
    assert!(handle.is_cancelled());
    let before = fake.fetches();
    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(fake.fetches(), before);
    Ok(())
}

/// Starting a second poll for the same counterparty cancels the first, so
/// intervals never stack up for one target.
#[tokio::test(start_paused = true)]
async fn test_restart_replaces_existing_poll() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);

    let poller = Poller::new(store.clone());
    let first = poller.start(TUTOR, PERIOD);
    tokio::task::yield_now().await;

    let second = poller.start(TUTOR, PERIOD);
    tokio::task::yield_now().await;
    assert!(first.is_cancelled(), "old poll was cancelled by the restart");
    assert!(!second.is_cancelled());

    // Exactly one loop is ticking: 1 (first's immediate) + 1 (second's
    // immediate) + one per interval from the survivor
    let after_start = fake.fetches();
    tokio::time::sleep(PERIOD * 2 + Duration::from_millis(100)).await;
    assert_eq!(fake.fetches(), after_start + 2);

    poller.stop(TUTOR);
    let before = fake.fetches();
    tokio::time::sleep(PERIOD * 4).await;
    assert_eq!(fake.fetches(), before);
    Ok(())
}

/// A failing tick is swallowed and logged; polling keeps going and recovers
/// once the backend does.
#[tokio::test(start_paused = true)]
async fn test_tick_errors_do_not_stop_polling() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);
    fake.fail_fetch.store(true, Ordering::SeqCst);

    let poller = Poller::new(store.clone());
    let _handle = poller.start(TUTOR, PERIOD);

    tokio::task::yield_now().await;
    tokio::time::sleep(PERIOD * 2 + Duration::from_millis(100)).await;
    assert!(fake.fetches() >= 3, "ticks continue through failures");
    assert!(store.conversation(TUTOR).is_none());

    // Backend comes back; the next tick populates the conversation
    fake.seed_message(TUTOR, wire_message(1, TUTOR, ME, "hi", seeded_at(0), false));
    fake.fail_fetch.store(false, Ordering::SeqCst);
    tokio::time::sleep(PERIOD + Duration::from_millis(100)).await;
    assert_eq!(store.conversation(TUTOR).map(|c| c.messages.len()), Some(1));

    poller.stop_all();
    Ok(())
}
