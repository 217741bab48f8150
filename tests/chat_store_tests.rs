// Conversation store tests
// These tests drive the store through the in-memory gateway and verify the
// merge, optimistic-update and read-state contracts.

// Import common test utilities
mod common;
use common::{seeded_at, setup_logging, student_store, wire_message, FakeGateway};

// External crate imports
use anyhow::Result;
use log::info;
use std::sync::atomic::Ordering;
use std::time::Duration;

// Import the crate functionality
use tutorlink::error::StoreError;
use tutorlink::models::{Conversation, MessageId};

const ME: i64 = 1;
const TUTOR: i64 = 7;

fn assert_sorted(conversation: &Conversation) {
    let times: Vec<_> = conversation.messages.iter().map(|m| m.sent_at).collect();
    let mut sorted = times.clone();
    sorted.sort();
    assert_eq!(times, sorted, "messages must be ascending by sent_at");
}

/// Optimistic visibility: a sent message is retrievable from the store
/// before the network call resolves.
#[tokio::test(start_paused = true)]
async fn test_optimistic_send_visible_before_confirmation() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);

    // Make the send hang so we can observe the pending window
    fake.set_send_delay(Some(Duration::from_millis(500)));

    let sender = store.clone();
    let send_task = tokio::spawn(async move { sender.send_message(TUTOR, "hello").await });
    tokio::task::yield_now().await;

    // The provisional message must already be there
    let conversation = store.conversation(TUTOR).expect("conversation should exist");
    assert_eq!(conversation.messages.len(), 1);
    let pending = &conversation.messages[0];
    assert_eq!(pending.content, "hello");
    assert_eq!(pending.sender_id, ME);
    assert!(pending.id.is_pending(), "not confirmed yet");
    assert_eq!(conversation.unread_count, 0, "own messages are never unread");
    assert_eq!(
        conversation.last_message.as_ref().map(|m| m.content.as_str()),
        Some("hello")
    );

    // Let the network call finish; the entry flips to confirmed in place
    tokio::time::sleep(Duration::from_millis(600)).await;
    let sent = send_task.await??;
    assert!(matches!(sent.id, MessageId::Confirmed(_)));

    let conversation = store.conversation(TUTOR).unwrap();
    assert_eq!(conversation.messages.len(), 1);
    assert!(matches!(conversation.messages[0].id, MessageId::Confirmed(_)));
    Ok(())
}

/// No duplication on confirm: after the send is confirmed and the server
/// echoes the message back on the next load, exactly one entry remains.
#[tokio::test]
async fn test_send_then_load_yields_single_entry() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);

    let sent = store.send_message(TUTOR, "see you at 5?").await?;
    info!("Message confirmed with id {:?}", sent.id);

    // The fake's send already archived the echo server-side
    let conversation = store.load_conversation(TUTOR).await?;
    let copies = conversation
        .messages
        .iter()
        .filter(|m| m.content == "see you at 5?")
        .count();
    assert_eq!(copies, 1, "exactly one entry for the logical message");
    assert!(matches!(conversation.messages[0].id, MessageId::Confirmed(_)));

    // A second refresh changes nothing
    let conversation = store.load_conversation(TUTOR).await?;
    assert_eq!(conversation.messages.len(), 1);
    Ok(())
}

/// Monotonic ordering: the message list is ascending by sent_at after every
/// operation, even when the server returns history out of order.
#[tokio::test]
async fn test_messages_sorted_after_every_operation() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);

    fake.seed_message(TUTOR, wire_message(3, TUTOR, ME, "third", seeded_at(30), true));
    fake.seed_message(TUTOR, wire_message(1, ME, TUTOR, "first", seeded_at(0), true));
    fake.seed_message(TUTOR, wire_message(2, TUTOR, ME, "second", seeded_at(15), true));

    let conversation = store.load_conversation(TUTOR).await?;
    assert_sorted(&conversation);
    assert_eq!(conversation.messages[0].content, "first");
    assert_eq!(conversation.messages[2].content, "third");

    store.send_message(TUTOR, "fourth").await?;
    assert_sorted(&store.conversation(TUTOR).unwrap());

    let conversation = store.load_conversation(TUTOR).await?;
    assert_sorted(&conversation);
    assert_eq!(conversation.last_message.unwrap().content, "fourth");
    Ok(())
}

/// Unread count is derived from the message list, and marking a message
/// read is idempotent with a single acknowledgment.
#[tokio::test(start_paused = true)]
async fn test_unread_count_derivation_and_idempotent_mark_read() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);

    // 3 incoming unread, 2 own
    fake.seed_message(TUTOR, wire_message(1, TUTOR, ME, "a", seeded_at(0), false));
    fake.seed_message(TUTOR, wire_message(2, TUTOR, ME, "b", seeded_at(1), false));
    fake.seed_message(TUTOR, wire_message(3, TUTOR, ME, "c", seeded_at(2), false));
    fake.seed_message(TUTOR, wire_message(4, ME, TUTOR, "d", seeded_at(3), false));
    fake.seed_message(TUTOR, wire_message(5, ME, TUTOR, "e", seeded_at(4), false));

    let conversation = store.load_conversation(TUTOR).await?;
    assert_eq!(conversation.unread_count, 3);

    store.mark_message_read(1);
    assert_eq!(store.conversation(TUTOR).unwrap().unread_count, 2);

    // Marking the same message again is a no-op
    store.mark_message_read(1);
    assert_eq!(store.conversation(TUTOR).unwrap().unread_count, 2);

    // Own messages are never mutated
    store.mark_message_read(4);
    assert_eq!(store.conversation(TUTOR).unwrap().unread_count, 2);

    // Exactly one acknowledgment went out, for the one real flip
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    assert_eq!(fake.acked(), vec![1]);
    Ok(())
}

/// Race safety: a load that resolves after a send was issued, with a server
/// snapshot that predates the send, must not evict the optimistic message.
#[tokio::test(start_paused = true)]
async fn test_poll_racing_send_keeps_optimistic_message() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);

    fake.seed_message(TUTOR, wire_message(1, TUTOR, ME, "old", seeded_at(0), true));
    fake.set_fetch_delay(Some(Duration::from_millis(300)));
    fake.set_send_delay(Some(Duration::from_millis(1000)));

    // 1. Start the load; its snapshot is taken now, before the send exists
    let loader = store.clone();
    let load_task = tokio::spawn(async move { loader.load_conversation(TUTOR).await });
    tokio::task::yield_now().await;

    // 2. Send while the load is still in flight
    let sender = store.clone();
    let send_task = tokio::spawn(async move { sender.send_message(TUTOR, "hello").await });
    tokio::task::yield_now().await;
    assert_eq!(store.conversation(TUTOR).unwrap().messages.len(), 2);

    // 3. Let the stale load resolve first: the pending message survives
    tokio::time::sleep(Duration::from_millis(400)).await;
    load_task.await??;
    let conversation = store.conversation(TUTOR).unwrap();
    assert_eq!(conversation.messages.len(), 2);
    let hellos: Vec<_> = conversation
        .messages
        .iter()
        .filter(|m| m.content == "hello")
        .collect();
    assert_eq!(hellos.len(), 1, "optimistic message exactly once");
    assert!(hellos[0].id.is_pending());
    assert_eq!(
        conversation.messages.last().unwrap().content,
        "hello",
        "pending message sorts after the loaded history"
    );
    assert_sorted(&conversation);

    // 4. Let the send complete: the pending entry flips, still exactly once
    tokio::time::sleep(Duration::from_millis(700)).await;
    send_task.await??;
    let conversation = store.conversation(TUTOR).unwrap();
    assert_eq!(conversation.messages.len(), 2);
    let hellos: Vec<_> = conversation
        .messages
        .iter()
        .filter(|m| m.content == "hello")
        .collect();
    assert_eq!(hellos.len(), 1);
    assert!(matches!(hellos[0].id, MessageId::Confirmed(_)));
    Ok(())
}

/// A failed load keeps the previous in-memory conversation untouched.
#[tokio::test]
async fn test_load_failure_preserves_previous_state() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);

    fake.seed_message(TUTOR, wire_message(1, TUTOR, ME, "kept", seeded_at(0), false));
    store.load_conversation(TUTOR).await?;

    fake.fail_fetch.store(true, Ordering::SeqCst);
    let result = store.load_conversation(TUTOR).await;
    assert!(matches!(
        result,
        Err(StoreError::LoadFailed { counterparty: TUTOR, .. })
    ));

    // Stale-but-available beats wiped
    let conversation = store.conversation(TUTOR).unwrap();
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].content, "kept");
    assert_eq!(conversation.unread_count, 1);
    Ok(())
}

/// A failed send keeps the provisional message visible and unsent; nothing
/// is rolled back behind the user's back.
#[tokio::test]
async fn test_send_failure_keeps_unsent_message_visible() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);

    fake.fail_send.store(true, Ordering::SeqCst);
    let result = store.send_message(TUTOR, "did this go through?").await;
    assert!(matches!(
        result,
        Err(StoreError::SendFailed { recipient: TUTOR, .. })
    ));

    let conversation = store.conversation(TUTOR).unwrap();
    assert_eq!(conversation.messages.len(), 1);
    assert!(conversation.messages[0].id.is_pending());
    assert_eq!(fake.sends(), 1);

    // Manual retry once the network is back
    fake.fail_send.store(false, Ordering::SeqCst);
    store.send_message(TUTOR, "did this go through?").await?;
    let conversation = store.conversation(TUTOR).unwrap();
    let pending = conversation
        .messages
        .iter()
        .filter(|m| m.id.is_pending())
        .count();
    assert_eq!(pending, 1, "only the failed copy remains pending");
    Ok(())
}

/// Blank content is rejected locally, before any network call.
#[tokio::test]
async fn test_blank_content_rejected_without_network() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);

    let result = store.send_message(TUTOR, "   \t ").await;
    assert!(matches!(result, Err(StoreError::EmptyMessage)));
    assert_eq!(fake.sends(), 0);
    assert!(store.conversation(TUTOR).is_none(), "no state was touched");
    Ok(())
}

/// Conversations list most-recently-active first; empty conversations last.
#[tokio::test]
async fn test_conversations_ordered_most_recent_first() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);

    fake.seed_message(2, wire_message(1, 2, ME, "older", seeded_at(100), true));
    fake.seed_message(3, wire_message(2, 3, ME, "newer", seeded_at(200), true));
    store.load_conversation(2).await?;
    store.load_conversation(3).await?;
    store.load_conversation(4).await?; // no history with this tutor yet

    let order: Vec<i64> = store
        .list_conversations()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(order, vec![3, 2, 4]);
    Ok(())
}

/// refresh_all synthesizes conversations by grouping the flat message list
/// on the counterparty, relative to the current user.
#[tokio::test]
async fn test_refresh_all_groups_messages_by_counterparty() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);

    fake.seed_message(2, wire_message(1, 2, ME, "from tutor 2", seeded_at(0), false));
    fake.seed_message(2, wire_message(2, ME, 2, "to tutor 2", seeded_at(5), false));
    fake.seed_message(9, wire_message(3, 9, ME, "from tutor 9", seeded_at(10), false));

    store.refresh_all().await?;

    let conversations = store.list_conversations();
    assert_eq!(conversations.len(), 2);
    assert_eq!(store.conversation(2).unwrap().messages.len(), 2);
    assert_eq!(store.conversation(9).unwrap().messages.len(), 1);
    assert_eq!(store.total_unread(), 2);
    Ok(())
}

/// A message marked read locally stays read even if a poll response still
/// reports it unread (the acknowledgment may not have landed yet).
#[tokio::test(start_paused = true)]
async fn test_locally_read_flag_survives_stale_poll() -> Result<()> {
    setup_logging();
    let fake = FakeGateway::new(ME);
    let (store, _events) = student_store(&fake, ME);

    fake.seed_message(TUTOR, wire_message(1, TUTOR, ME, "hi", seeded_at(0), false));
    store.load_conversation(TUTOR).await?;
    store.mark_message_read(1);
    assert_eq!(store.conversation(TUTOR).unwrap().unread_count, 0);

    // The fake's archive still says unread; the local flag wins
    let conversation = store.load_conversation(TUTOR).await?;
    assert!(conversation.messages[0].is_read);
    assert_eq!(conversation.unread_count, 0);
    Ok(())
}
