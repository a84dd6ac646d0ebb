use super::durable_store::DurableStore;
use super::message_history::MessageHistory;
use super::pending_queue::PendingQueue;
use crate::application::ports::{BackupTarget, Clock, PayloadCompressor, ReachabilityProbe};
use crate::domain::entities::{BackupDescriptor, BackupOutcome, BackupSnapshot};
use crate::domain::value_objects::StorageOptions;
use crate::shared::config::BackupConfig;
use crate::shared::error::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const BACKUP_STATE_KEY: &str = "auto_backup_state";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BackupState {
    last_backup_at: Option<i64>,
}

/// 履歴と保留キューを定期的に書き出す
pub struct BackupService {
    store: Arc<DurableStore>,
    history: Arc<MessageHistory>,
    queue: Arc<PendingQueue>,
    target: Arc<dyn BackupTarget>,
    compressor: Arc<dyn PayloadCompressor>,
    reachability: Arc<dyn ReachabilityProbe>,
    clock: Arc<dyn Clock>,
    config: BackupConfig,
}

impl BackupService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<DurableStore>,
        history: Arc<MessageHistory>,
        queue: Arc<PendingQueue>,
        target: Arc<dyn BackupTarget>,
        compressor: Arc<dyn PayloadCompressor>,
        reachability: Arc<dyn ReachabilityProbe>,
        clock: Arc<dyn Clock>,
        config: BackupConfig,
    ) -> Self {
        Self {
            store,
            history,
            queue,
            target,
            compressor,
            reachability,
            clock,
            config,
        }
    }

    pub async fn last_backup_at(&self) -> Result<Option<i64>, AppError> {
        Ok(self.load_state().await?.last_backup_at)
    }

    /// 間隔と接続条件を満たしていればバックアップを作る
    pub async fn run(&self) -> Result<BackupOutcome, AppError> {
        if !self.config.enabled {
            return Ok(skipped("auto backup disabled"));
        }

        let now = self.clock.now_ms();
        let mut state = self.load_state().await?;
        if let Some(last) = state.last_backup_at {
            let interval = i64::try_from(self.config.interval_ms).unwrap_or(i64::MAX);
            if now.saturating_sub(last) < interval {
                return Ok(skipped("backup interval not elapsed"));
            }
        }

        let connectivity = self.reachability.current().await;
        if self.config.wifi_only && !connectivity.is_wifi {
            return Ok(skipped("wifi required"));
        }

        let snapshot = BackupSnapshot {
            version: SNAPSHOT_VERSION,
            created_at: now,
            messages: self.history.list().await?,
            pending: self.queue.list().await,
        };
        let encoded = self.encode_snapshot(&snapshot)?;
        let name = BackupDescriptor::file_name(now);
        let bytes = self.target.store(&name, encoded).await?;

        state.last_backup_at = Some(now);
        self.store
            .set(BACKUP_STATE_KEY, &state, StorageOptions::default())
            .await?;

        let pruned = self.prune().await?;
        tracing::info!(
            target: "offline::backup",
            name = %name,
            bytes,
            messages = snapshot.messages.len(),
            pending = snapshot.pending.len(),
            pruned,
            "Backup completed"
        );
        Ok(BackupOutcome::Completed {
            name,
            bytes,
            pruned,
        })
    }

    pub fn encode_snapshot(&self, snapshot: &BackupSnapshot) -> Result<Vec<u8>, AppError> {
        let json = serde_json::to_string(snapshot)?;
        Ok(self.compressor.compress(&json)?.into_bytes())
    }

    pub fn decode_snapshot(&self, data: &[u8]) -> Result<BackupSnapshot, AppError> {
        let text = std::str::from_utf8(data)
            .map_err(|err| AppError::DeserializationError(format!("Backup is not UTF-8: {err}")))?;
        let json = self.compressor.decompress(text)?;
        let snapshot: BackupSnapshot = serde_json::from_str(&json)?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(AppError::ValidationError(format!(
                "Unsupported backup version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// 新しいものから `retain_count` 件だけ残す
    async fn prune(&self) -> Result<usize, AppError> {
        let mut backups = self.target.list().await?;
        if backups.len() <= self.config.retain_count {
            return Ok(0);
        }
        backups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        let excess = backups.len() - self.config.retain_count;
        for backup in &backups[..excess] {
            self.target.delete(&backup.name).await?;
            tracing::debug!(target: "offline::backup", name = %backup.name, "Old backup removed");
        }
        Ok(excess)
    }

    async fn load_state(&self) -> Result<BackupState, AppError> {
        Ok(self
            .store
            .get(BACKUP_STATE_KEY, StorageOptions::default())
            .await?
            .unwrap_or_default())
    }
}

fn skipped(reason: &str) -> BackupOutcome {
    tracing::debug!(target: "offline::backup", reason, "Backup skipped");
    BackupOutcome::Skipped {
        reason: reason.to_string(),
    }
}
