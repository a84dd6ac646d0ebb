use crate::shared::error::AppError;
use async_trait::async_trait;

/// 文字列キー・文字列値のフラットな永続ストア
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), AppError>;

    /// 複数キーをまとめて削除する。存在しないキーは無視する
    async fn remove_items(&self, keys: &[String]) -> Result<(), AppError>;

    async fn all_keys(&self) -> Result<Vec<String>, AppError>;

    async fn clear(&self) -> Result<(), AppError>;
}
