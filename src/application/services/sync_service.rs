use super::conflict::resolve_conflicts;
use super::durable_store::DurableStore;
use super::message_history::MessageHistory;
use super::pending_queue::PendingQueue;
use crate::application::ports::{Clock, MessageDelivery, ReachabilityProbe, RemoteChangeSource};
use crate::domain::entities::{PendingOperation, SyncStats};
use crate::domain::value_objects::{Connectivity, RetryBackoff, StorageOptions};
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;

pub const SYNC_STATS_KEY: &str = "cloud_sync_stats";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Offline,
    WifiRequired,
    TooSoon,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub delivered: usize,
    pub failed: usize,
    /// リトライ上限に達していて今回は送らなかった件数
    pub exhausted: usize,
    pub uploaded: usize,
    pub downloaded: usize,
    /// サイクルを中断したエラー
    pub error: Option<String>,
}

impl SyncReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum SyncOutcome {
    AlreadyRunning,
    Skipped { reason: SkipReason },
    Completed(SyncReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered(PendingOperation),
    Queued(PendingOperation),
}

/// 同時に 1 サイクルだけ走らせるためのフラグ。drop で必ず戻す
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 保留キューの配信とローカル/リモート履歴の突き合わせを行う。
///
/// 1 サイクルの流れ:
/// 1. 接続・wifi-only・最小間隔の前提条件を確認
/// 2. キューを作成順に配信。失敗した操作はリトライ回数を進め、バックオフ分待ってから次へ
/// 3. リモートが設定されていれば、ウォーターマーク以降の変更を突き合わせる
/// 4. 統計を更新して保存
pub struct SyncEngine {
    queue: Arc<PendingQueue>,
    history: Arc<MessageHistory>,
    store: Arc<DurableStore>,
    delivery: Arc<dyn MessageDelivery>,
    remote: Option<Arc<dyn RemoteChangeSource>>,
    reachability: Arc<dyn ReachabilityProbe>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    backoff: RetryBackoff,
    stats: RwLock<SyncStats>,
    draining: AtomicBool,
    consecutive_cycle_retries: AtomicU32,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<PendingQueue>,
        history: Arc<MessageHistory>,
        store: Arc<DurableStore>,
        delivery: Arc<dyn MessageDelivery>,
        reachability: Arc<dyn ReachabilityProbe>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        let backoff = RetryBackoff::new(
            Duration::from_millis(config.initial_retry_delay_ms),
            Duration::from_millis(config.max_retry_delay_ms),
            Duration::from_millis(config.jitter_ms),
        );
        Self {
            queue,
            history,
            store,
            delivery,
            remote: None,
            reachability,
            clock,
            config,
            backoff,
            stats: RwLock::new(SyncStats::default()),
            draining: AtomicBool::new(false),
            consecutive_cycle_retries: AtomicU32::new(0),
        }
    }

    /// 双方向同期の相手を設定する
    pub fn with_remote(mut self, remote: Arc<dyn RemoteChangeSource>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_syncing(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub async fn stats(&self) -> SyncStats {
        *self.stats.read().await
    }

    /// 保存済みの統計を読み込む。壊れていれば初期値から始める
    pub async fn load_stats(&self) -> Result<SyncStats, AppError> {
        let restored: SyncStats = self
            .store
            .get(SYNC_STATS_KEY, StorageOptions::default())
            .await?
            .unwrap_or_default();
        *self.stats.write().await = restored;
        Ok(restored)
    }

    /// オンラインなら即時配信し、オフラインまたは失敗ならキューに積む
    pub async fn send_or_queue(&self, content: impl Into<String>) -> Result<SendOutcome, AppError> {
        let content = content.into();
        let connectivity = self.reachability.current().await;

        if connectivity.is_connected {
            let operation = PendingOperation::new(content.clone(), self.clock.now_ms());
            match self.delivery.deliver(&operation).await {
                Ok(()) => return Ok(SendOutcome::Delivered(operation)),
                Err(err) => {
                    tracing::warn!(
                        target: "offline::sync",
                        error = %err,
                        "Immediate delivery failed, queueing"
                    );
                }
            }
        }

        let queued = self.queue.enqueue(content).await?;
        Ok(SendOutcome::Queued(queued))
    }

    /// 定期実行用。最小同期間隔を守る
    pub async fn sync(self: &Arc<Self>) -> Result<SyncOutcome, AppError> {
        self.run_cycle(true).await
    }

    /// 手動・再接続・サイクル再試行用。最小同期間隔を無視する
    pub async fn force_sync(self: &Arc<Self>) -> Result<SyncOutcome, AppError> {
        self.run_cycle(false).await
    }

    /// 未接続から接続への遷移で同期を走らせる
    pub fn spawn_connectivity_trigger(
        self: &Arc<Self>,
        mut changes: watch::Receiver<Connectivity>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut was_connected = changes.borrow_and_update().is_connected;
            while changes.changed().await.is_ok() {
                let now_connected = changes.borrow_and_update().is_connected;
                if now_connected && !was_connected {
                    tracing::info!(target: "offline::sync", "Connectivity restored, syncing");
                    if let Err(err) = engine.force_sync().await {
                        tracing::error!(target: "offline::sync", error = %err, "Reconnect sync failed");
                    }
                }
                was_connected = now_connected;
            }
        })
    }

    async fn run_cycle(self: &Arc<Self>, respect_min_interval: bool) -> Result<SyncOutcome, AppError> {
        let Some(_guard) = DrainGuard::try_acquire(&self.draining) else {
            tracing::debug!(target: "offline::sync", "Sync already in progress, ignoring request");
            return Ok(SyncOutcome::AlreadyRunning);
        };

        if let Some(reason) = self.precondition_failure(respect_min_interval).await {
            tracing::debug!(target: "offline::sync", reason = ?reason, "Sync skipped");
            return Ok(SyncOutcome::Skipped { reason });
        }

        let mut report = SyncReport::default();
        let mut transferred = (0u64, 0u64);
        let result = match self.drain(&mut report).await {
            Ok(()) => self.reconcile(&mut report, &mut transferred).await,
            Err(err) => Err(err),
        };

        let finished_at = self.clock.now_ms();
        {
            let mut stats = self.stats.write().await;
            match &result {
                Ok(()) => {
                    stats.last_sync_at = stats.last_sync_at.max(finished_at);
                    stats.bytes_uploaded = stats.bytes_uploaded.saturating_add(transferred.0);
                    stats.bytes_downloaded = stats.bytes_downloaded.saturating_add(transferred.1);
                    if report.failed == 0 {
                        stats.successful_syncs += 1;
                    } else {
                        stats.failed_syncs += 1;
                    }
                }
                Err(_) => stats.failed_syncs += 1,
            }
        }

        match result {
            Ok(()) => {
                self.consecutive_cycle_retries.store(0, Ordering::Release);
                tracing::info!(
                    target: "offline::sync",
                    delivered = report.delivered,
                    failed = report.failed,
                    exhausted = report.exhausted,
                    uploaded = report.uploaded,
                    downloaded = report.downloaded,
                    "Sync cycle finished"
                );
            }
            Err(err) => {
                tracing::error!(target: "offline::sync", error = %err, "Sync cycle aborted");
                report.error = Some(err.to_string());
                self.schedule_cycle_retry();
            }
        }

        self.persist_stats().await;
        Ok(SyncOutcome::Completed(report))
    }

    async fn precondition_failure(&self, respect_min_interval: bool) -> Option<SkipReason> {
        let connectivity = self.reachability.current().await;
        if !connectivity.is_connected {
            return Some(SkipReason::Offline);
        }
        if !connectivity.allows_sync(self.config.wifi_only) {
            return Some(SkipReason::WifiRequired);
        }
        if respect_min_interval {
            let last = self.stats.read().await.last_sync_at;
            let min_interval = i64::try_from(self.config.min_sync_interval_ms).unwrap_or(i64::MAX);
            if last > 0 && self.clock.now_ms().saturating_sub(last) < min_interval {
                return Some(SkipReason::TooSoon);
            }
        }
        None
    }

    async fn drain(&self, report: &mut SyncReport) -> Result<(), AppError> {
        // サイクル途中で積まれた操作は次のサイクルで扱う
        let snapshot = self.queue.list().await;
        let ceiling = self.queue.max_retries();

        for operation in snapshot {
            if operation.is_exhausted(ceiling) {
                report.exhausted += 1;
                continue;
            }

            match self.delivery.deliver(&operation).await {
                Ok(()) => {
                    self.queue.dequeue(&operation.id).await?;
                    report.delivered += 1;
                }
                Err(err) => {
                    let retry_count = operation.retry_count.saturating_add(1);
                    self.queue
                        .update_retry(&operation.id, retry_count, self.clock.now_ms())
                        .await?;
                    report.failed += 1;

                    let delay = self
                        .backoff
                        .delay_with_jitter(retry_count, &mut rand::thread_rng());
                    tracing::warn!(
                        target: "offline::sync",
                        id = %operation.id,
                        retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Delivery failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Ok(())
    }

    async fn reconcile(
        &self,
        report: &mut SyncReport,
        transferred: &mut (u64, u64),
    ) -> Result<(), AppError> {
        let Some(remote) = self.remote.as_ref() else {
            return Ok(());
        };

        let since = self.stats.read().await.last_sync_at;
        let local = self.history.changes_since(since).await?;
        let incoming = remote.get_changes(since).await?;
        let resolution = resolve_conflicts(&local, &incoming, self.config.conflict_policy);

        if !resolution.to_upload.is_empty() {
            let stats = remote.upload_changes(&resolution.to_upload).await?;
            transferred.0 = stats.bytes;
        }
        if !resolution.to_download.is_empty() {
            let stats = remote.download_changes(&resolution.to_download).await?;
            transferred.1 = stats.bytes;
            self.history.apply_changes(&resolution.to_download).await?;
        }

        report.uploaded = resolution.to_upload.len();
        report.downloaded = resolution.to_download.len();
        Ok(())
    }

    fn schedule_cycle_retry(self: &Arc<Self>) {
        let attempt = self.consecutive_cycle_retries.fetch_add(1, Ordering::AcqRel);
        if attempt >= self.config.cycle_retry_limit {
            self.consecutive_cycle_retries.store(0, Ordering::Release);
            tracing::warn!(
                target: "offline::sync",
                attempts = attempt,
                "Cycle retries exhausted, waiting for next scheduled sync"
            );
            return;
        }

        let engine = Arc::clone(self);
        let delay = Duration::from_millis(self.config.cycle_retry_delay_ms);
        tracing::info!(
            target: "offline::sync",
            attempt = attempt + 1,
            delay_ms = self.config.cycle_retry_delay_ms,
            "Scheduling sync cycle retry"
        );
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = engine.force_sync().await {
                tracing::error!(target: "offline::sync", error = %err, "Sync retry failed");
            }
        });
    }

    async fn persist_stats(&self) {
        let stats = *self.stats.read().await;
        if let Err(err) = self
            .store
            .set(SYNC_STATS_KEY, &stats, StorageOptions::default())
            .await
        {
            tracing::error!(target: "offline::sync", error = %err, "Failed to persist sync stats");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::durable_store::DurableStoreSettings;
    use crate::domain::entities::{ChangeRecord, ChatMessage, TransferStats};
    use crate::domain::value_objects::ConflictPolicy;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::compression::GzipCompressor;
    use crate::infrastructure::crypto::DisabledCipher;
    use crate::infrastructure::network::ConnectivityMonitor;
    use crate::infrastructure::storage::MemoryKeyValueBackend;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct ScriptedDelivery {
        delivered: Mutex<Vec<String>>,
        failing: Mutex<HashSet<String>>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl MessageDelivery for ScriptedDelivery {
        async fn deliver(&self, operation: &PendingOperation) -> Result<(), AppError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.failing.lock().unwrap().contains(&operation.content) {
                return Err(AppError::Delivery("remote unavailable".to_string()));
            }
            self.delivered.lock().unwrap().push(operation.content.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedRemote {
        changes: Mutex<VecDeque<Result<Vec<ChangeRecord>, AppError>>>,
        uploaded: Mutex<Vec<ChangeRecord>>,
        queries: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl RemoteChangeSource for ScriptedRemote {
        async fn get_changes(&self, since: i64) -> Result<Vec<ChangeRecord>, AppError> {
            self.queries.lock().unwrap().push(since);
            self.changes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn upload_changes(&self, changes: &[ChangeRecord]) -> Result<TransferStats, AppError> {
            self.uploaded.lock().unwrap().extend_from_slice(changes);
            Ok(TransferStats {
                bytes: 100 * changes.len() as u64,
            })
        }

        async fn download_changes(
            &self,
            changes: &[ChangeRecord],
        ) -> Result<TransferStats, AppError> {
            Ok(TransferStats {
                bytes: 10 * changes.len() as u64,
            })
        }
    }

    struct Harness {
        engine: Arc<SyncEngine>,
        queue: Arc<PendingQueue>,
        history: Arc<MessageHistory>,
        clock: Arc<ManualClock>,
        network: Arc<ConnectivityMonitor>,
    }

    fn config() -> SyncConfig {
        SyncConfig {
            min_sync_interval_ms: 30_000,
            max_retries: 3,
            initial_retry_delay_ms: 1_000,
            max_retry_delay_ms: 8_000,
            jitter_ms: 0,
            cycle_retry_limit: 2,
            cycle_retry_delay_ms: 5_000,
            conflict_policy: ConflictPolicy::Newest,
            ..SyncConfig::default()
        }
    }

    fn harness(
        delivery: Arc<ScriptedDelivery>,
        remote: Option<Arc<ScriptedRemote>>,
        config: SyncConfig,
    ) -> Harness {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Arc::new(DurableStore::new(
            Arc::new(MemoryKeyValueBackend::new()),
            Arc::new(DisabledCipher),
            Arc::new(GzipCompressor::new()),
            clock.clone(),
            DurableStoreSettings {
                compression_threshold: 10 * 1024,
                chunk_size: 1024 * 1024,
            },
        ));
        let queue = Arc::new(PendingQueue::new(store.clone(), clock.clone(), config.max_retries));
        let history = Arc::new(MessageHistory::new(store.clone()));
        let network = Arc::new(ConnectivityMonitor::new(Connectivity::wifi()));
        let mut engine = SyncEngine::new(
            queue.clone(),
            history.clone(),
            store,
            delivery,
            network.clone(),
            clock.clone(),
            config,
        );
        if let Some(remote) = remote {
            engine = engine.with_remote(remote);
        }
        Harness {
            engine: Arc::new(engine),
            queue,
            history,
            clock,
            network,
        }
    }

    fn completed(outcome: SyncOutcome) -> SyncReport {
        match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("expected completed cycle, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drains_in_creation_order() {
        let delivery = Arc::new(ScriptedDelivery::default());
        let h = harness(delivery.clone(), None, config());
        for (at, text) in [(3, "third"), (1, "first"), (2, "second")] {
            h.clock.set(at);
            h.queue.enqueue(text).await.unwrap();
        }
        h.clock.set(1_000_000);

        let report = completed(h.engine.sync().await.unwrap());
        assert_eq!(report.delivered, 3);
        assert_eq!(*delivery.delivered.lock().unwrap(), vec!["first", "second", "third"]);
        assert!(h.queue.is_empty().await);

        let stats = h.engine.stats().await;
        assert_eq!(stats.successful_syncs, 1);
        assert_eq!(stats.last_sync_at, 1_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_back_off_and_still_advance_watermark() {
        let delivery = Arc::new(ScriptedDelivery::default());
        delivery.failing.lock().unwrap().insert("broken".to_string());
        let h = harness(delivery.clone(), None, config());
        h.queue.enqueue("broken").await.unwrap();
        h.clock.advance(1);
        h.queue.enqueue("fine").await.unwrap();

        let started = tokio::time::Instant::now();
        let report = completed(h.engine.sync().await.unwrap());

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        // retry_count 1 -> 1000 * 2^1
        assert!(started.elapsed() >= Duration::from_millis(2_000));

        let remaining = h.queue.list().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].retry_count, 1);
        assert_eq!(remaining[0].last_attempt_at, Some(1_000_001));

        let stats = h.engine.stats().await;
        assert_eq!(stats.failed_syncs, 1);
        assert_eq!(stats.last_sync_at, 1_000_001);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_entries_stay_queued_without_attempts() {
        let delivery = Arc::new(ScriptedDelivery::default());
        let h = harness(delivery.clone(), None, config());
        let op = h.queue.enqueue("stuck").await.unwrap();
        h.queue.update_retry(&op.id, 3, 5).await.unwrap();

        let report = completed(h.engine.force_sync().await.unwrap());
        assert_eq!(report.exhausted, 1);
        assert!(delivery.delivered.lock().unwrap().is_empty());
        assert_eq!(h.queue.list().await.len(), 1);
        assert_eq!(h.queue.summary().failed, 1);

        h.queue.reset_retry(&op.id).await.unwrap();
        let report = completed(h.engine.force_sync().await.unwrap());
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn preconditions_skip_cycle() {
        let mut cfg = config();
        cfg.wifi_only = true;
        let h = harness(Arc::new(ScriptedDelivery::default()), None, cfg);

        h.network.set(Connectivity::offline());
        assert_eq!(
            h.engine.sync().await.unwrap(),
            SyncOutcome::Skipped {
                reason: SkipReason::Offline
            }
        );

        h.network.set(Connectivity::cellular());
        assert_eq!(
            h.engine.sync().await.unwrap(),
            SyncOutcome::Skipped {
                reason: SkipReason::WifiRequired
            }
        );

        h.network.set(Connectivity::wifi());
        completed(h.engine.sync().await.unwrap());
        h.clock.advance(10_000);
        assert_eq!(
            h.engine.sync().await.unwrap(),
            SyncOutcome::Skipped {
                reason: SkipReason::TooSoon
            }
        );
        h.clock.advance(20_000);
        completed(h.engine.sync().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_cycle_is_a_no_op() {
        let gate = Arc::new(Notify::new());
        let delivery = Arc::new(ScriptedDelivery {
            gate: Some(gate.clone()),
            ..ScriptedDelivery::default()
        });
        let h = harness(delivery.clone(), None, config());
        h.queue.enqueue("slow").await.unwrap();

        let engine = h.engine.clone();
        let first = tokio::spawn(async move { engine.force_sync().await });
        while !h.engine.is_syncing() {
            tokio::task::yield_now().await;
        }

        assert_eq!(h.engine.force_sync().await.unwrap(), SyncOutcome::AlreadyRunning);

        gate.notify_one();
        let report = completed(first.await.unwrap().unwrap());
        assert_eq!(report.delivered, 1);
        assert_eq!(delivery.delivered.lock().unwrap().len(), 1);
        assert!(!h.engine.is_syncing());
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_uploads_downloads_and_applies() {
        let remote = Arc::new(ScriptedRemote::default());
        let incoming = ChatMessage {
            id: "remote-1".to_string(),
            role: "assistant".to_string(),
            content: "from cloud".to_string(),
            timestamp: 50,
        };
        remote.changes.lock().unwrap().push_back(Ok(vec![ChangeRecord::new(
            "remote-1",
            50,
            serde_json::to_value(&incoming).unwrap(),
        )]));
        let h = harness(Arc::new(ScriptedDelivery::default()), Some(remote.clone()), config());
        h.history
            .save_message(&ChatMessage {
                id: "local-1".to_string(),
                role: "user".to_string(),
                content: "from device".to_string(),
                timestamp: 40,
            })
            .await
            .unwrap();

        let report = completed(h.engine.sync().await.unwrap());
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.downloaded, 1);
        assert_eq!(remote.uploaded.lock().unwrap()[0].id, "local-1");
        assert_eq!(h.history.get("remote-1").await.unwrap(), Some(incoming));

        let stats = h.engine.stats().await;
        assert_eq!(stats.bytes_uploaded, 100);
        assert_eq!(stats.bytes_downloaded, 10);
        assert_eq!(*remote.queries.lock().unwrap(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_error_counts_failure_and_retries_boundedly() {
        let remote = Arc::new(ScriptedRemote::default());
        {
            let mut changes = remote.changes.lock().unwrap();
            for _ in 0..5 {
                changes.push_back(Ok(vec![ChangeRecord::new("bad", 1, json!("not a message"))]));
            }
        }
        let h = harness(Arc::new(ScriptedDelivery::default()), Some(remote.clone()), config());

        let report = completed(h.engine.sync().await.unwrap());
        assert!(report.error.is_some());
        let stats = h.engine.stats().await;
        assert_eq!(stats.failed_syncs, 1);
        assert_eq!(stats.last_sync_at, 0);
        assert!(h.history.list().await.unwrap().is_empty());

        // 2 回の追加再試行のあとはスケジュール待ちに戻る
        tokio::time::sleep(Duration::from_millis(30_000)).await;
        assert_eq!(remote.queries.lock().unwrap().len(), 3);
        assert_eq!(h.engine.stats().await.failed_syncs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_survive_restart() {
        let h = harness(Arc::new(ScriptedDelivery::default()), None, config());
        completed(h.engine.sync().await.unwrap());

        let reloaded = SyncEngine::new(
            h.queue.clone(),
            h.history.clone(),
            h.engine.store.clone(),
            Arc::new(ScriptedDelivery::default()),
            h.network.clone(),
            h.clock.clone(),
            config(),
        );
        let stats = reloaded.load_stats().await.unwrap();
        assert_eq!(stats.successful_syncs, 1);
        assert_eq!(stats.last_sync_at, 1_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn send_or_queue_depends_on_connectivity() {
        let delivery = Arc::new(ScriptedDelivery::default());
        let h = harness(delivery.clone(), None, config());

        let sent = h.engine.send_or_queue("online").await.unwrap();
        assert!(matches!(sent, SendOutcome::Delivered(_)));

        h.network.set(Connectivity::offline());
        let queued = h.engine.send_or_queue("offline").await.unwrap();
        let SendOutcome::Queued(op) = queued else {
            panic!("expected queued outcome");
        };
        assert_eq!(op.retry_count, 0);
        assert_eq!(h.queue.len().await, 1);
        assert_eq!(*delivery.delivered.lock().unwrap(), vec!["online"]);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_triggers_sync() {
        let delivery = Arc::new(ScriptedDelivery::default());
        let h = harness(delivery.clone(), None, config());
        h.network.set(Connectivity::offline());
        h.engine.send_or_queue("hello").await.unwrap();

        let trigger = h.engine.spawn_connectivity_trigger(h.network.subscribe());
        h.network.set(Connectivity::cellular());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(h.queue.is_empty().await);
        assert_eq!(*delivery.delivered.lock().unwrap(), vec!["hello"]);
        trigger.abort();
    }
}
