use crate::domain::entities::PendingOperation;
use crate::shared::error::AppError;
use async_trait::async_trait;

/// 保留中オペレーションをリモートへ届ける。ワイヤ形式は実装側の責務
#[async_trait]
pub trait MessageDelivery: Send + Sync {
    async fn deliver(&self, operation: &PendingOperation) -> Result<(), AppError>;
}
