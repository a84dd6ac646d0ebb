use crate::domain::entities::BackupDescriptor;
use crate::shared::error::AppError;
use async_trait::async_trait;

#[async_trait]
pub trait BackupTarget: Send + Sync {
    /// 保存したバイト数を返す
    async fn store(&self, name: &str, data: Vec<u8>) -> Result<u64, AppError>;
    async fn list(&self) -> Result<Vec<BackupDescriptor>, AppError>;
    async fn delete(&self, name: &str) -> Result<(), AppError>;
}
