mod common;

use bolt_offline_lib::application::ports::KeyValueBackend;
use bolt_offline_lib::application::services::{SendOutcome, SyncOutcome};
use bolt_offline_lib::domain::entities::{ChangeRecord, ChatMessage};
use bolt_offline_lib::domain::value_objects::{Connectivity, StorageOptions, TaskId};
use bolt_offline_lib::infrastructure::jobs::{RunOutcome, SYNC_TASK_ID};
use bolt_offline_lib::infrastructure::storage::SqliteKeyValueBackend;
use common::mocks::{RecordingDelivery, ScriptedRemote};
use common::{setup_offline_state, setup_with_backend, test_config, START_MS};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn sync_task_id() -> TaskId {
    TaskId::new(SYNC_TASK_ID).expect("task id")
}

fn message(id: &str, timestamp: i64) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        role: "user".to_string(),
        content: format!("content of {id}"),
        timestamp,
    }
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn offline_send_is_delivered_by_the_scheduled_sync_after_reconnect() {
    let delivery = Arc::new(RecordingDelivery::new());
    let ctx = setup_offline_state(test_config(), delivery.clone(), None).await;

    let outcome = ctx.state.sync.send_or_queue("hello").await.expect("send");
    assert!(matches!(outcome, SendOutcome::Queued(_)));
    assert_eq!(ctx.state.queue.len().await, 1);

    // 未接続のままでは何も送らない
    let offline_run = ctx.state.scheduler.run_now(&sync_task_id()).await.unwrap();
    assert_eq!(offline_run, RunOutcome::Completed);
    assert_eq!(delivery.attempts(), 0);

    ctx.connectivity.set(Connectivity::wifi());
    let online_run = ctx.state.scheduler.run_now(&sync_task_id()).await.unwrap();
    assert_eq!(online_run, RunOutcome::Completed);

    assert!(ctx.state.queue.is_empty().await);
    assert_eq!(delivery.delivered().await, vec!["hello".to_string()]);
    let stats = ctx.state.sync.stats().await;
    assert_eq!(stats.successful_syncs, 1);
    assert_eq!(stats.failed_syncs, 0);
    assert_eq!(stats.last_sync_at, START_MS);
}

#[tokio::test]
async fn reconnect_triggers_sync_once_started() {
    let delivery = Arc::new(RecordingDelivery::new());
    let ctx = setup_offline_state(test_config(), delivery.clone(), None).await;

    ctx.state.sync.send_or_queue("queued while offline").await.unwrap();
    ctx.state.start().await.expect("start");
    assert!(ctx.state.scheduler.lease_held());

    // 起動直後の定期同期は未接続なのでスキップされる
    let scheduler = Arc::clone(&ctx.state.scheduler);
    wait_until(|| {
        let scheduler = Arc::clone(&scheduler);
        async move {
            scheduler
                .task(&sync_task_id())
                .await
                .and_then(|task| task.last_run_at)
                .is_some()
        }
    })
    .await;
    assert_eq!(delivery.attempts(), 0);

    ctx.connectivity.set(Connectivity::cellular());
    let queue = Arc::clone(&ctx.state.queue);
    wait_until(|| {
        let queue = Arc::clone(&queue);
        async move { queue.is_empty().await }
    })
    .await;

    assert_eq!(delivery.delivered().await, vec!["queued while offline".to_string()]);
    assert_eq!(ctx.state.sync.stats().await.successful_syncs, 1);

    ctx.state.shutdown().await.expect("shutdown");
    assert!(!ctx.state.scheduler.is_started().await);
    assert!(!ctx.state.scheduler.lease_held());
}

#[tokio::test]
async fn queued_operations_are_delivered_in_creation_order() {
    let delivery = Arc::new(RecordingDelivery::new());
    let ctx = setup_offline_state(test_config(), delivery.clone(), None).await;

    for content in ["first", "second", "third"] {
        ctx.state.queue.enqueue(content).await.unwrap();
        ctx.clock.advance(10);
    }

    ctx.connectivity.set(Connectivity::wifi());
    ctx.state.sync.force_sync().await.unwrap();

    assert_eq!(
        delivery.delivered().await,
        vec!["first".to_string(), "second".to_string(), "third".to_string()]
    );
}

#[tokio::test]
async fn failing_delivery_stops_at_the_retry_ceiling() {
    let mut config = test_config();
    config.sync.max_retries = 2;
    let delivery = Arc::new(RecordingDelivery::failing());
    let ctx = setup_offline_state(config, delivery.clone(), None).await;
    ctx.connectivity.set(Connectivity::wifi());

    let op = ctx.state.queue.enqueue("doomed").await.unwrap();
    for _ in 0..4 {
        ctx.state.sync.force_sync().await.unwrap();
    }

    assert_eq!(delivery.attempts(), 2);
    let failed = ctx.state.queue.failed().await;
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].retry_count, 2);
    assert_eq!(ctx.state.queue.summary().failed, 1);

    // 手動リトライで再び配信対象になる
    delivery.set_failing(false);
    assert!(ctx.state.queue.reset_retry(&op.id).await.unwrap());
    ctx.state.sync.force_sync().await.unwrap();
    assert!(ctx.state.queue.is_empty().await);
    assert_eq!(delivery.delivered().await, vec!["doomed".to_string()]);
}

#[tokio::test]
async fn overlapping_sync_requests_are_single_flight() {
    let gate = Arc::new(Notify::new());
    let delivery = Arc::new(RecordingDelivery::gated(gate.clone()));
    let ctx = setup_offline_state(test_config(), delivery.clone(), None).await;
    ctx.connectivity.set(Connectivity::wifi());
    ctx.state.queue.enqueue("slow").await.unwrap();

    let engine = Arc::clone(&ctx.state.sync);
    let first = tokio::spawn(async move { engine.force_sync().await });
    while !ctx.state.sync.is_syncing() {
        tokio::task::yield_now().await;
    }

    let second = ctx.state.sync.force_sync().await.unwrap();
    assert!(matches!(second, SyncOutcome::AlreadyRunning));

    gate.notify_one();
    let first = first.await.unwrap().unwrap();
    match first {
        SyncOutcome::Completed(report) => assert_eq!(report.delivered, 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(delivery.attempts(), 1);
}

#[tokio::test]
async fn reconcile_merges_local_and_remote_history() {
    let remote = Arc::new(ScriptedRemote::with_changes(vec![ChangeRecord::new(
        "m2",
        START_MS + 50,
        json!({"id": "m2", "role": "assistant", "content": "from remote", "timestamp": START_MS + 50}),
    )]));
    let ctx = setup_offline_state(
        test_config(),
        Arc::new(RecordingDelivery::new()),
        Some(remote.clone()),
    )
    .await;
    ctx.state
        .history
        .save_message(&message("m1", START_MS + 10))
        .await
        .unwrap();
    ctx.connectivity.set(Connectivity::wifi());
    ctx.clock.advance(100);

    let outcome = ctx.state.sync.force_sync().await.unwrap();
    let SyncOutcome::Completed(report) = outcome else {
        panic!("sync did not complete");
    };
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.downloaded, 1);

    let uploaded = remote.uploaded().await;
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0].id, "m1");
    let pulled = ctx.state.history.get("m2").await.unwrap().expect("downloaded");
    assert_eq!(pulled.content, "from remote");

    let stats = ctx.state.sync.stats().await;
    assert!(stats.bytes_uploaded > 0);
    assert!(stats.bytes_downloaded > 0);
}

#[tokio::test]
async fn message_count_over_limit_produces_one_warning() {
    let mut config = test_config();
    config.quota.max_message_count = 1000;
    let ctx = setup_offline_state(config, Arc::new(RecordingDelivery::new()), None).await;

    let messages: Vec<ChatMessage> = (0..1200)
        .map(|i| message(&format!("m{i:04}"), START_MS + i))
        .collect();
    ctx.state.history.save_messages(&messages).await.unwrap();

    let report = ctx.state.quota.check_quotas().await.unwrap();
    assert!(!report.within_limits);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("1200"));
    assert!(report.warnings[0].contains("1000"));
    assert_eq!(report.stats.message_count, 1200);
}

#[tokio::test]
async fn large_values_are_split_into_chunks() {
    let mut config = test_config();
    config.storage.chunk_size = 1000;
    config.storage.compression_threshold = usize::MAX;
    let ctx = setup_offline_state(config, Arc::new(RecordingDelivery::new()), None).await;

    let value = "x".repeat(3498);
    ctx.state
        .store
        .set("blob", &value, StorageOptions::default())
        .await
        .unwrap();

    let keys = ctx.backend.all_keys().await.unwrap();
    let chunk_keys: Vec<&String> = keys.iter().filter(|k| k.starts_with("blob_chunk_")).collect();
    assert_eq!(chunk_keys.len(), 4);
    assert_eq!(
        ctx.backend.get_item("blob").await.unwrap().as_deref(),
        Some("chunked:4")
    );

    let restored: Option<String> = ctx
        .state
        .store
        .get("blob", StorageOptions::default())
        .await
        .unwrap();
    assert_eq!(restored.as_deref(), Some(value.as_str()));
    assert_eq!(ctx.state.store.keys().await.unwrap(), vec!["blob".to_string()]);
}

#[tokio::test]
async fn encrypted_compressed_entries_expire_after_ttl() {
    let mut config = test_config();
    config.storage.encryption_secret = Some("device-secret".to_string());
    let ctx = setup_offline_state(config, Arc::new(RecordingDelivery::new()), None).await;

    let options = StorageOptions {
        encrypt: true,
        compress: true,
        ttl: Some(Duration::from_secs(60)),
    };
    let payload = json!({"token": "abc", "notes": "n".repeat(4096)});
    ctx.state.store.set("session", &payload, options).await.unwrap();

    let raw = ctx.backend.get_item("session").await.unwrap().unwrap();
    assert!(!raw.contains("abc"));

    let read: Option<serde_json::Value> = ctx.state.store.get("session", options).await.unwrap();
    assert_eq!(read, Some(payload));

    ctx.clock.advance(61_000);
    let expired: Option<serde_json::Value> =
        ctx.state.store.get("session", options).await.unwrap();
    assert!(expired.is_none());
    assert!(ctx.backend.get_item("session").await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_backend_keeps_queue_and_stats_across_restarts() {
    let backend = Arc::new(
        SqliteKeyValueBackend::connect("sqlite::memory:", 1)
            .await
            .expect("sqlite backend"),
    );
    let delivery = Arc::new(RecordingDelivery::failing());

    let first = setup_with_backend(test_config(), backend.clone(), delivery.clone(), None).await;
    first.state.queue.enqueue("survives restart").await.unwrap();
    first.connectivity.set(Connectivity::wifi());
    first.state.sync.force_sync().await.unwrap();
    assert_eq!(first.state.sync.stats().await.failed_syncs, 1);

    let second = setup_with_backend(test_config(), backend, delivery, None).await;
    let pending = second.state.queue.list().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].content, "survives restart");
    assert_eq!(pending[0].retry_count, 1);
    assert_eq!(second.state.sync.stats().await.failed_syncs, 1);
}
