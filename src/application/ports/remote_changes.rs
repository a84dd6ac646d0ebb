use crate::domain::entities::{ChangeRecord, TransferStats};
use crate::shared::error::AppError;
use async_trait::async_trait;

#[async_trait]
pub trait RemoteChangeSource: Send + Sync {
    /// `since` より後にリモートで変更されたレコード
    async fn get_changes(&self, since: i64) -> Result<Vec<ChangeRecord>, AppError>;

    async fn upload_changes(&self, changes: &[ChangeRecord]) -> Result<TransferStats, AppError>;

    async fn download_changes(&self, changes: &[ChangeRecord])
    -> Result<TransferStats, AppError>;
}
