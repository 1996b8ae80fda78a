//! Relay worker behaviour against recording stores and scripted publishers

mod fixtures;

use fixtures::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use cim_outbox::consumer::UserConsumer;
use cim_outbox::domain::user::{User, USER_CREATED, USER_TOPIC, USER_UPDATED};
use cim_outbox::outbox::{InMemoryOutboxStore, OutboxEvent, OutboxStore};
use cim_outbox::relay::ProcessOutcome;
use cim_outbox::service::{InMemoryUserService, NewUser, UserService};
use cim_outbox::{DispatchOutcome, InMemoryEventBus, RelayWorker, Shutdown};

fn worker(
    store: &Arc<RecordingStore>,
    publisher: &Arc<ScriptedPublisher>,
    config: cim_outbox::RelayConfig,
) -> RelayWorker {
    RelayWorker::new(store.clone(), publisher.clone(), registry(), config)
}

/// Scenario A: a registered event is published, marked once, and gone
///
/// Given one pending `user.created` row
/// When the relay runs one pass against a healthy publisher
/// Then it fetches, publishes, marks exactly once, and nothing stays pending
#[tokio::test]
async fn test_registered_event_is_published_and_marked() {
    // Given
    let log = call_log();
    let store = Arc::new(RecordingStore::new(log.clone()));
    let publisher = Arc::new(ScriptedPublisher::succeeding(log.clone()));
    let id = parse_uuid(USER_ID_1);
    let row = user_created_row(id, 0);
    store.inner.insert(row.clone()).await.unwrap();

    // When
    let report = worker(&store, &publisher, fast_relay_config())
        .process_batch()
        .await;

    // Then
    assert_eq!(report.fetched, 1);
    assert_eq!(report.published, 1);
    assert_eq!(
        calls(&log),
        vec![Call::Fetch(10), Call::Publish(row.id), Call::Mark(row.id)]
    );
    assert!(store.inner.fetch_pending(10).await.unwrap().is_empty());

    let published = publisher.published.lock().unwrap();
    assert_eq!(published[0].event_type, "user.created");
    assert_eq!(published[0].topic, "user");
    assert_eq!(published[0].partition_key, Some(id.to_string()));
    assert_eq!(published[0].occurred_at, fixed_timestamp());
}

/// Scenario B: a publisher that always fails never completes the row
#[tokio::test]
async fn test_failing_publisher_leaves_event_pending() {
    // Given a publisher that rejects every attempt
    let log = call_log();
    let store = Arc::new(RecordingStore::new(log.clone()));
    let publisher = Arc::new(ScriptedPublisher::always_failing(log.clone()));
    let row = user_created_row(parse_uuid(USER_ID_1), 0);
    store.inner.insert(row.clone()).await.unwrap();
    let relay = worker(&store, &publisher, fast_relay_config());

    // When one pass exhausts the retry budget
    let report = relay.process_batch().await;

    // Then three attempts were made and the row was never marked
    assert_eq!(report.failed, 1);
    assert_eq!(publishes(&log), 3);
    assert_eq!(marks(&log), 0);
    assert_eq!(store.inner.fetch_pending(10).await.unwrap(), vec![row.clone()]);

    // And the next pass tries again from scratch
    relay.process_batch().await;
    assert_eq!(publishes(&log), 6);
    assert_eq!(marks(&log), 0);
    assert_eq!(relay.stats().publish_failures, 2);
}

/// Scenario C: an unregistered type is neither published nor marked
#[tokio::test]
async fn test_unknown_event_type_stays_pending() {
    let log = call_log();
    let store = Arc::new(RecordingStore::new(log.clone()));
    let publisher = Arc::new(ScriptedPublisher::succeeding(log.clone()));
    let row = OutboxEvent::new("invoice", "inv-1", "invoice.paid", json!({"amount": 10}));
    store.inner.insert(row.clone()).await.unwrap();
    let relay = worker(&store, &publisher, fast_relay_config().with_stuck_threshold(3));

    for pass in 1..=4u64 {
        let report = relay.process_batch().await;
        assert_eq!(report.skipped, 1);
        assert_eq!(relay.stats().unknown_type, pass);
    }

    assert_eq!(publishes(&log), 0);
    assert_eq!(marks(&log), 0);
    assert_eq!(store.inner.pending_count().await, 1);
    assert_eq!(relay.stuck_events(), vec![row.id]);
}

/// A stuck row removed from the outbox by other means is no longer reported
#[tokio::test]
async fn test_departed_row_leaves_stuck_list() {
    let log = call_log();
    let store = Arc::new(RecordingStore::new(log.clone()));
    let publisher = Arc::new(ScriptedPublisher::succeeding(log.clone()));
    let row = OutboxEvent::new("invoice", "inv-1", "invoice.paid", json!({"amount": 10}));
    store.inner.insert(row.clone()).await.unwrap();
    let relay = worker(&store, &publisher, fast_relay_config().with_stuck_threshold(2));

    relay.process_batch().await;
    relay.process_batch().await;
    assert_eq!(relay.stuck_events(), vec![row.id]);

    // An operator completes the row by hand
    store.inner.mark_processed(row.id).await.unwrap();
    relay.process_batch().await;

    assert!(relay.stuck_events().is_empty());
}

/// Stuck tracking survives passes that never reached the row
#[tokio::test]
async fn test_stuck_row_beyond_full_fetch_is_kept() {
    let log = call_log();
    let store = Arc::new(RecordingStore::new(log.clone()));
    let publisher = Arc::new(ScriptedPublisher::always_failing(log.clone()));
    let mut stuck = OutboxEvent::new("invoice", "inv-1", "invoice.paid", json!({"amount": 10}));
    stuck.created_at = fixed_timestamp() + chrono::Duration::seconds(60);
    store.inner.insert(stuck.clone()).await.unwrap();
    let relay = worker(
        &store,
        &publisher,
        fast_relay_config().with_batch_size(1).with_stuck_threshold(1),
    );

    relay.process_batch().await;
    assert_eq!(relay.stuck_events(), vec![stuck.id]);

    // An older row that never publishes now fills every fetch
    store
        .inner
        .insert(user_created_row(parse_uuid(USER_ID_1), 0))
        .await
        .unwrap();
    relay.process_batch().await;

    assert_eq!(relay.stuck_events(), vec![stuck.id]);
}

#[tokio::test]
async fn test_malformed_payload_is_counted_separately() {
    let log = call_log();
    let store = Arc::new(RecordingStore::new(log.clone()));
    let publisher = Arc::new(ScriptedPublisher::succeeding(log.clone()));
    let row = OutboxEvent::new("user", "u-1", "user.created", json!({"id": "not-a-uuid"}));
    store.inner.insert(row.clone()).await.unwrap();
    let relay = worker(&store, &publisher, fast_relay_config());

    assert_eq!(relay.process_event(&row).await, ProcessOutcome::MalformedPayload);
    assert_eq!(relay.stats().malformed, 1);
    assert_eq!(relay.stats().unknown_type, 0);
    assert_eq!(publishes(&log), 0);
    assert!(relay.stuck_events().is_empty());
}

/// A failed mark turns into a second delivery, never a lost one
#[tokio::test]
async fn test_failed_mark_republishes_next_pass() {
    let log = call_log();
    let store = Arc::new(RecordingStore::new(log.clone()).fail_next_marks(1));
    let publisher = Arc::new(ScriptedPublisher::succeeding(log.clone()));
    let row = user_created_row(parse_uuid(USER_ID_1), 0);
    store.inner.insert(row.clone()).await.unwrap();
    let relay = worker(&store, &publisher, fast_relay_config());

    assert_eq!(
        relay.process_event(&row).await,
        ProcessOutcome::PublishedUnmarked
    );
    assert_eq!(store.inner.pending_count().await, 1);

    relay.process_batch().await;

    assert_eq!(publisher.published_ids(), vec![row.id, row.id]);
    assert_eq!(store.inner.pending_count().await, 0);
    assert_eq!(relay.stats().mark_failures, 1);
}

/// Marking only ever follows a successful publish of the same event
#[tokio::test]
async fn test_mark_follows_successful_publish() {
    let log = call_log();
    let store = Arc::new(RecordingStore::new(log.clone()));
    let publisher = Arc::new(ScriptedPublisher::failing_first(log.clone(), 2));
    let row = user_created_row(parse_uuid(USER_ID_1), 0);
    store.inner.insert(row.clone()).await.unwrap();

    let outcome = worker(&store, &publisher, fast_relay_config())
        .process_event(&row)
        .await;

    assert_eq!(outcome, ProcessOutcome::Published);
    assert_eq!(
        calls(&log),
        vec![
            Call::Publish(row.id),
            Call::Publish(row.id),
            Call::Publish(row.id),
            Call::Mark(row.id),
        ]
    );
}

#[tokio::test]
async fn test_pass_publishes_oldest_first() {
    let log = call_log();
    let store = Arc::new(RecordingStore::new(log.clone()));
    let publisher = Arc::new(ScriptedPublisher::succeeding(log.clone()));

    let late = user_created_row(parse_uuid(USER_ID_1), 60);
    let early = user_created_row(parse_uuid(USER_ID_2), -60);
    store.inner.insert(late.clone()).await.unwrap();
    store.inner.insert(early.clone()).await.unwrap();

    worker(&store, &publisher, fast_relay_config().with_batch_size(1))
        .process_batch()
        .await;

    assert_eq!(publisher.published_ids(), vec![early.id]);
    assert_eq!(store.inner.fetch_pending(10).await.unwrap(), vec![late]);
}

#[tokio::test]
async fn test_polling_loop_drains_outbox_until_shutdown() {
    let log = call_log();
    let store = Arc::new(RecordingStore::new(log.clone()));
    let publisher = Arc::new(ScriptedPublisher::succeeding(log.clone()));
    let relay = Arc::new(worker(&store, &publisher, fast_relay_config()));
    let shutdown = Shutdown::new();

    let handle = Arc::clone(&relay).start(shutdown.listener());
    assert!(!handle.has_queue_loop());

    store
        .inner
        .insert(user_created_row(parse_uuid(USER_ID_1), 0))
        .await
        .unwrap();
    let drained = {
        let store = store.clone();
        eventually(move || {
            let store = store.clone();
            async move { store.inner.pending_count().await == 0 }
        })
    };
    assert!(drained.await);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), handle.join())
        .await
        .expect("relay stops after shutdown");
    assert!(relay.stats().batches > 0);
}

/// The push path delivers without waiting for a polling tick
#[tokio::test]
async fn test_push_path_delivers_committed_rows() {
    let outbox = Arc::new(InMemoryOutboxStore::new());
    let log = call_log();
    let publisher = Arc::new(ScriptedPublisher::succeeding(log.clone()));
    let config = fast_relay_config()
        .with_poll_interval(Duration::from_secs(3600))
        .with_queue_capacity(8);
    let relay = Arc::new(RelayWorker::new(
        outbox.clone(),
        publisher.clone(),
        registry(),
        config,
    ));
    let shutdown = Shutdown::new();
    let handle = Arc::clone(&relay).start(shutdown.listener());
    assert!(handle.has_queue_loop());

    let queue = relay.queue().expect("push path enabled");
    let users = InMemoryUserService::new(outbox.clone()).with_relay_queue(queue);
    let user = users
        .create_user(NewUser::new(
            "ada@example.com",
            "Ada",
            chrono::NaiveDate::from_ymd_opt(1990, 3, 14).unwrap(),
        ))
        .await
        .unwrap();

    let drained = {
        let outbox = outbox.clone();
        eventually(move || {
            let outbox = outbox.clone();
            async move { outbox.pending_count().await == 0 }
        })
    };
    assert!(drained.await);
    let published = publisher.published.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].aggregate_id, user.id.to_string());
    assert_eq!(relay.stats().queue_enqueued, 1);

    shutdown.trigger();
    handle.join().await;
}

/// A full push queue only delays delivery; polling still finds the row
#[tokio::test]
async fn test_full_queue_falls_back_to_polling() {
    let log = call_log();
    let store = Arc::new(RecordingStore::new(log.clone()));
    let publisher = Arc::new(ScriptedPublisher::succeeding(log.clone()));
    let relay = worker(&store, &publisher, fast_relay_config().with_queue_capacity(1));
    let queue = relay.queue().expect("push path enabled");

    let first = user_created_row(parse_uuid(USER_ID_1), 0);
    let second = user_created_row(parse_uuid(USER_ID_2), 1);
    store.inner.insert(first.clone()).await.unwrap();
    store.inner.insert(second.clone()).await.unwrap();

    assert!(queue.enqueue(first.clone()));
    assert!(!queue.enqueue(second.clone()));
    assert_eq!(relay.stats().queue_dropped, 1);

    relay.process_batch().await;
    assert_eq!(publisher.published_ids(), vec![first.id, second.id]);
}

/// A pushed row never overtakes an older row of the same aggregate
///
/// Given a user created and then renamed, where only the rename made it into
/// the push queue
/// When the push path wakes the relay
/// Then the replica receives the create before the rename and ends up renamed
#[tokio::test]
async fn test_push_keeps_aggregate_order() {
    // Given
    let outbox = Arc::new(InMemoryOutboxStore::new());
    let users = InMemoryUserService::new(outbox.clone());
    let user = users
        .create_user(NewUser::new(
            "ada@example.com",
            "Ada",
            chrono::NaiveDate::from_ymd_opt(1990, 3, 14).unwrap(),
        ))
        .await
        .unwrap();
    users
        .update_user(User {
            name: "Ada Lovelace".to_string(),
            ..user.clone()
        })
        .await
        .unwrap();

    let rows = outbox.fetch_pending(10).await.unwrap();
    let types: Vec<&str> = rows.iter().map(|row| row.event_type.as_str()).collect();
    assert_eq!(types, vec![USER_CREATED, USER_UPDATED]);

    let bus = Arc::new(InMemoryEventBus::new(USER_TOPIC));
    let mut delivered = bus.subscribe(8);
    let config = fast_relay_config()
        .with_poll_interval(Duration::from_secs(3600))
        .with_queue_capacity(1);
    let relay = Arc::new(RelayWorker::new(
        outbox.clone(),
        bus.clone(),
        registry(),
        config,
    ));
    let queue = relay.queue().expect("push path enabled");
    assert!(queue.enqueue(rows[1].clone()));

    // When
    let shutdown = Shutdown::new();
    let handle = Arc::clone(&relay).start(shutdown.listener());
    let drained = {
        let outbox = outbox.clone();
        eventually(move || {
            let outbox = outbox.clone();
            async move { outbox.pending_count().await == 0 }
        })
    };
    assert!(drained.await);
    shutdown.trigger();
    handle.join().await;

    // Then
    let replica = Arc::new(InMemoryUserService::replica());
    let consumer = UserConsumer::new(replica.clone(), Duration::from_millis(500));
    let mut outcomes = Vec::new();
    while let Ok(message) = delivered.try_recv() {
        outcomes.push(
            consumer
                .dispatch(message.key.as_deref(), &message.payload)
                .await,
        );
    }

    assert_eq!(
        outcomes,
        vec![DispatchOutcome::Applied, DispatchOutcome::Applied]
    );
    assert_eq!(replica.get_user(user.id).await.unwrap().name, "Ada Lovelace");
}
