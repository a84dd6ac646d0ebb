use crate::application::ports::{
    AnalyticsSink, BackgroundLease, BackupTarget, Clock, KeyValueBackend, MessageDelivery,
    PayloadCipher, PayloadCompressor, RemoteChangeSource,
};
use crate::application::services::{
    AnalyticsQueue, BackupService, DurableStore, DurableStoreSettings, MessageHistory,
    PendingQueue, StorageQuotaService, SyncEngine,
};
use crate::domain::value_objects::TaskId;
use crate::infrastructure::analytics::TracingAnalyticsSink;
use crate::infrastructure::backup::DirectoryBackupTarget;
use crate::infrastructure::cache::MessageCache;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::compression::GzipCompressor;
use crate::infrastructure::crypto::{AesGcmPayloadCipher, DisabledCipher};
use crate::infrastructure::jobs::{
    ANALYTICS_FLUSH_TASK_ID, AnalyticsFlushJob, BACKUP_TASK_ID, BackgroundScheduler, BackupJob,
    CLEANUP_TASK_ID, CleanupJob, ProcessLease, QUOTA_CHECK_TASK_ID, QuotaCheckJob, SYNC_TASK_ID,
    SyncJob, TaskHandler, TaskRegistration,
};
use crate::infrastructure::network::ConnectivityMonitor;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// アプリ外部から注入する依存
pub struct Collaborators {
    pub backend: Arc<dyn KeyValueBackend>,
    pub delivery: Arc<dyn MessageDelivery>,
    pub remote: Option<Arc<dyn RemoteChangeSource>>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub lease: Arc<dyn BackgroundLease>,
    pub backup_target: Arc<dyn BackupTarget>,
    pub analytics_sink: Arc<dyn AnalyticsSink>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// プラットフォーム固有の実装が無いときの標準構成
    pub fn with_defaults(
        config: &AppConfig,
        backend: Arc<dyn KeyValueBackend>,
        delivery: Arc<dyn MessageDelivery>,
    ) -> Self {
        let backup_dir = config
            .backup
            .directory
            .clone()
            .map(Into::into)
            .unwrap_or_else(DirectoryBackupTarget::default_directory);
        Self {
            backend,
            delivery,
            remote: None,
            connectivity: Arc::new(ConnectivityMonitor::default()),
            lease: Arc::new(ProcessLease::new()),
            backup_target: Arc::new(DirectoryBackupTarget::new(backup_dir)),
            analytics_sink: Arc::new(TracingAnalyticsSink),
            clock: Arc::new(SystemClock),
        }
    }
}

/// アプリケーション全体の状態を管理する構造体
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<DurableStore>,
    pub queue: Arc<PendingQueue>,
    pub history: Arc<MessageHistory>,
    pub sync: Arc<SyncEngine>,
    pub quota: Arc<StorageQuotaService>,
    pub backup: Arc<BackupService>,
    pub analytics: Arc<AnalyticsQueue>,
    pub message_cache: Arc<MessageCache>,
    pub scheduler: Arc<BackgroundScheduler>,
    pub connectivity: Arc<ConnectivityMonitor>,
    connectivity_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AppState {
    pub async fn new(config: AppConfig, deps: Collaborators) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;

        let cipher: Arc<dyn PayloadCipher> = match &config.storage.encryption_secret {
            Some(secret) => Arc::new(AesGcmPayloadCipher::new(secret)),
            None => Arc::new(DisabledCipher),
        };
        let compressor: Arc<dyn PayloadCompressor> = Arc::new(GzipCompressor::new());

        let store = Arc::new(DurableStore::new(
            Arc::clone(&deps.backend),
            cipher,
            Arc::clone(&compressor),
            Arc::clone(&deps.clock),
            DurableStoreSettings {
                compression_threshold: config.storage.compression_threshold,
                chunk_size: config.storage.chunk_size,
            },
        ));

        let queue = Arc::new(PendingQueue::new(
            Arc::clone(&store),
            Arc::clone(&deps.clock),
            config.sync.max_retries,
        ));
        queue.load().await?;

        let history = Arc::new(MessageHistory::new(Arc::clone(&store)));

        let mut engine = SyncEngine::new(
            Arc::clone(&queue),
            Arc::clone(&history),
            Arc::clone(&store),
            Arc::clone(&deps.delivery),
            deps.connectivity.clone(),
            Arc::clone(&deps.clock),
            config.sync.clone(),
        );
        if let Some(remote) = &deps.remote {
            engine = engine.with_remote(Arc::clone(remote));
        }
        let sync = Arc::new(engine);
        sync.load_stats().await?;

        let quota = Arc::new(StorageQuotaService::new(
            Arc::clone(&store),
            Arc::clone(&history),
            deps.connectivity.clone(),
            Arc::clone(&deps.clock),
            config.quota.clone(),
        ));

        let backup = Arc::new(BackupService::new(
            Arc::clone(&store),
            Arc::clone(&history),
            Arc::clone(&queue),
            Arc::clone(&deps.backup_target),
            Arc::clone(&compressor),
            deps.connectivity.clone(),
            Arc::clone(&deps.clock),
            config.backup.clone(),
        ));

        let analytics = Arc::new(AnalyticsQueue::new(
            Arc::clone(&store),
            Arc::clone(&deps.analytics_sink),
            deps.connectivity.clone(),
            Arc::clone(&deps.clock),
            config.analytics.clone(),
        ));

        let message_cache = Arc::new(MessageCache::new(
            &config.cache,
            Arc::clone(&deps.backend),
            Arc::clone(&deps.clock),
            compressor,
        ));
        message_cache.restore().await?;

        let scheduler = Arc::new(BackgroundScheduler::new(
            Arc::clone(&deps.lease),
            Arc::clone(&deps.clock),
            config.scheduler.task_timeout_ms.map(Duration::from_millis),
        ));

        let state = Self {
            config: Arc::new(config),
            store,
            queue,
            history,
            sync,
            quota,
            backup,
            analytics,
            message_cache,
            scheduler,
            connectivity: deps.connectivity,
            connectivity_task: Arc::new(Mutex::new(None)),
        };
        state.register_standard_tasks().await?;

        tracing::info!(
            target: "offline::scheduler",
            pending = state.queue.len().await,
            "Offline engine initialised"
        );
        Ok(state)
    }

    async fn register_standard_tasks(&self) -> Result<(), AppError> {
        let intervals = &self.config.scheduler;

        self.register_task(
            SYNC_TASK_ID,
            "Sync",
            "Deliver pending messages and reconcile history",
            self.config.sync.sync_interval_ms,
            self.config.sync.auto_sync,
            Arc::new(SyncJob::new(Arc::clone(&self.sync))),
        )
        .await?;
        self.register_task(
            QUOTA_CHECK_TASK_ID,
            "Storage quota check",
            "Report storage usage against configured ceilings",
            intervals.quota_check_interval_ms,
            true,
            Arc::new(QuotaCheckJob::new(Arc::clone(&self.quota))),
        )
        .await?;
        self.register_task(
            CLEANUP_TASK_ID,
            "Storage cleanup",
            "Trim old messages and expired attachments",
            intervals.cleanup_interval_ms,
            true,
            Arc::new(CleanupJob::new(
                Arc::clone(&self.quota),
                Some(Arc::clone(&self.message_cache)),
            )),
        )
        .await?;
        self.register_task(
            BACKUP_TASK_ID,
            "Auto backup",
            "Export history and pending queue",
            intervals.backup_interval_ms,
            self.config.backup.enabled,
            Arc::new(BackupJob::new(Arc::clone(&self.backup))),
        )
        .await?;
        self.register_task(
            ANALYTICS_FLUSH_TASK_ID,
            "Analytics flush",
            "Send queued analytics events",
            intervals.analytics_flush_interval_ms,
            self.config.analytics.enabled,
            Arc::new(AnalyticsFlushJob::new(Arc::clone(&self.analytics))),
        )
        .await
    }

    async fn register_task(
        &self,
        id: &str,
        name: &str,
        description: &str,
        interval_ms: u64,
        enabled: bool,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), AppError> {
        self.scheduler
            .register(TaskRegistration {
                id: TaskId::new(id).map_err(AppError::InvalidInput)?,
                name: name.to_string(),
                description: description.to_string(),
                interval: Duration::from_millis(interval_ms),
                enabled,
                handler,
            })
            .await
    }

    /// スケジューラと再接続時の同期を開始する
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler.start().await?;

        if self.config.sync.auto_sync {
            let mut task = self.connectivity_task.lock().await;
            if task.is_none() {
                *task = Some(
                    self.sync
                        .spawn_connectivity_trigger(self.connectivity.subscribe()),
                );
            }
        }
        Ok(())
    }

    /// タイマーを止めてキャッシュを保存する。実行中のタスクは中断しない
    pub async fn shutdown(&self) -> Result<(), AppError> {
        if let Some(task) = self.connectivity_task.lock().await.take() {
            task.abort();
        }
        self.scheduler.stop().await?;
        if let Err(err) = self.message_cache.persist().await {
            tracing::warn!(target: "offline::store", error = %err, "Failed to persist message cache");
        }
        tracing::info!(target: "offline::scheduler", "Offline engine shut down");
        Ok(())
    }
}
