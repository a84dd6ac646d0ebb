use crate::shared::error::AppError;
use async_trait::async_trait;

/// アプリがフォアグラウンドにいない間も定期処理を続けるためのプラットフォーム実行権
#[async_trait]
pub trait BackgroundLease: Send + Sync {
    async fn acquire(&self) -> Result<(), AppError>;
    async fn release(&self) -> Result<(), AppError>;
    fn is_held(&self) -> bool;
}
