use super::scheduler::TaskHandler;
use crate::application::services::StorageQuotaService;
use crate::infrastructure::cache::MessageCache;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;

/// 使用量を集計して上限超過を警告する。超過はタスク失敗にしない
pub struct QuotaCheckJob {
    quota: Arc<StorageQuotaService>,
}

impl QuotaCheckJob {
    pub fn new(quota: Arc<StorageQuotaService>) -> Self {
        Self { quota }
    }
}

#[async_trait]
impl TaskHandler for QuotaCheckJob {
    async fn run(&self) -> Result<(), AppError> {
        let report = self.quota.check_quotas().await?;
        if !report.within_limits {
            tracing::warn!(
                target: "offline::quota",
                warnings = report.warnings.len(),
                "Storage is over quota"
            );
        }
        Ok(())
    }
}

/// 保持期間を過ぎたデータとキャッシュの掃除
pub struct CleanupJob {
    quota: Arc<StorageQuotaService>,
    cache: Option<Arc<MessageCache>>,
}

impl CleanupJob {
    pub fn new(quota: Arc<StorageQuotaService>, cache: Option<Arc<MessageCache>>) -> Self {
        Self { quota, cache }
    }
}

#[async_trait]
impl TaskHandler for CleanupJob {
    async fn run(&self) -> Result<(), AppError> {
        if self.quota.cleanup().await?.is_none() {
            return Ok(());
        }
        if let Some(cache) = &self.cache {
            let expired = cache.persist().await?;
            tracing::debug!(target: "offline::quota", expired, "Message cache compacted");
        }
        Ok(())
    }
}
