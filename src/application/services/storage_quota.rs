use super::durable_store::DurableStore;
use super::message_history::{ATTACHMENT_KEY_PREFIX, MESSAGE_KEY_PREFIX, MessageHistory};
use crate::application::ports::{Clock, ReachabilityProbe};
use crate::domain::entities::{CleanupReport, QuotaReport, StorageStats};
use crate::shared::config::QuotaConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 使用量の集計と上限チェック、保持期間に基づく削除
pub struct StorageQuotaService {
    store: Arc<DurableStore>,
    history: Arc<MessageHistory>,
    reachability: Arc<dyn ReachabilityProbe>,
    clock: Arc<dyn Clock>,
    config: QuotaConfig,
    last_stats: RwLock<Option<StorageStats>>,
}

impl StorageQuotaService {
    pub fn new(
        store: Arc<DurableStore>,
        history: Arc<MessageHistory>,
        reachability: Arc<dyn ReachabilityProbe>,
        clock: Arc<dyn Clock>,
        config: QuotaConfig,
    ) -> Self {
        Self {
            store,
            history,
            reachability,
            clock,
            config,
            last_stats: RwLock::new(None),
        }
    }

    /// 直近の集計結果
    pub async fn last_stats(&self) -> Option<StorageStats> {
        *self.last_stats.read().await
    }

    /// ストア全体を走査してキー接頭辞ごとに集計する
    pub async fn compute_stats(&self) -> Result<StorageStats, AppError> {
        let mut stats = StorageStats {
            checked_at: self.clock.now_ms(),
            ..StorageStats::default()
        };

        for entry in self.store.entry_sizes().await? {
            stats.total_size += entry.bytes;
            if entry.key.starts_with(MESSAGE_KEY_PREFIX) {
                stats.message_count += 1;
            } else if entry.key.starts_with(ATTACHMENT_KEY_PREFIX) {
                stats.attachment_size += entry.bytes;
            }
        }

        *self.last_stats.write().await = Some(stats);
        Ok(stats)
    }

    /// 上限超過は警告として返すだけでエラーにはしない
    pub async fn check_quotas(&self) -> Result<QuotaReport, AppError> {
        let stats = self.compute_stats().await?;
        let mut warnings = Vec::new();

        if stats.total_size > self.config.max_total_bytes {
            warnings.push(format!(
                "Total storage ({}) exceeds limit of {}",
                format_bytes(stats.total_size),
                format_bytes(self.config.max_total_bytes)
            ));
        }
        if stats.message_count > self.config.max_message_count {
            warnings.push(format!(
                "Message count ({}) exceeds limit of {}",
                stats.message_count, self.config.max_message_count
            ));
        }
        if stats.attachment_size > self.config.max_attachment_bytes {
            warnings.push(format!(
                "Attachment storage ({}) exceeds limit of {}",
                format_bytes(stats.attachment_size),
                format_bytes(self.config.max_attachment_bytes)
            ));
        }

        for warning in &warnings {
            tracing::warn!(target: "offline::quota", "{warning}");
        }
        tracing::debug!(
            target: "offline::quota",
            total = stats.total_size,
            messages = stats.message_count,
            attachments = stats.attachment_size,
            "Storage quota checked"
        );

        Ok(QuotaReport {
            within_limits: warnings.is_empty(),
            warnings,
            stats,
        })
    }

    /// 古いメッセージと期限切れ添付を削除する。1 回で上限内に戻るとは限らない。
    /// 接続が必要な設定でオフラインの場合は `None`
    pub async fn cleanup(&self) -> Result<Option<CleanupReport>, AppError> {
        if self.config.cleanup_requires_connectivity
            && !self.reachability.current().await.is_connected
        {
            tracing::debug!(target: "offline::quota", "Cleanup skipped while offline");
            return Ok(None);
        }

        let mut report = CleanupReport::default();

        let messages = self.history.list().await?;
        if messages.len() > self.config.message_retention {
            let excess = messages.len() - self.config.message_retention;
            for message in &messages[..excess] {
                self.history.remove(&message.id).await?;
                report.messages_removed += 1;
            }
        }

        let max_age = i64::try_from(self.config.attachment_max_age_ms).unwrap_or(i64::MAX);
        let cutoff = self.clock.now_ms().saturating_sub(max_age);
        for attachment in self.history.attachments().await? {
            if attachment.timestamp < cutoff {
                self.history.remove_attachment(&attachment.id).await?;
                report.attachments_removed += 1;
            }
        }

        tracing::info!(
            target: "offline::quota",
            messages_removed = report.messages_removed,
            attachments_removed = report.attachments_removed,
            "Storage cleanup finished"
        );
        Ok(Some(report))
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
