use super::ttl_cache::{TtlCache, TtlCacheSettings};
use crate::application::ports::{Clock, KeyValueBackend, PayloadCompressor};
use crate::domain::entities::ChatMessage;
use crate::shared::config::CacheConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Duration;

/// 永続化キー。`message_` 接頭辞と衝突させない
pub const MESSAGE_CACHE_KEY: &str = "cache:messages";

// メッセージ用の特殊化されたキャッシュ
pub struct MessageCache {
    cache: TtlCache<ChatMessage>,
    backend: Arc<dyn KeyValueBackend>,
}

impl MessageCache {
    pub fn new(
        config: &CacheConfig,
        backend: Arc<dyn KeyValueBackend>,
        clock: Arc<dyn Clock>,
        compressor: Arc<dyn PayloadCompressor>,
    ) -> Self {
        let settings = TtlCacheSettings {
            max_entries: config.max_entries,
            default_ttl: Duration::from_millis(config.default_ttl_ms),
            compression_threshold: config.compression_threshold,
        };
        Self {
            cache: TtlCache::new(settings, clock, compressor),
            backend,
        }
    }

    pub async fn cache_message(&self, message: &ChatMessage) -> Result<(), AppError> {
        self.cache.set(&Self::key(&message.id), message).await
    }

    pub async fn get_message(&self, message_id: &str) -> Option<ChatMessage> {
        self.cache.get(&Self::key(message_id)).await
    }

    pub async fn invalidate_message(&self, message_id: &str) {
        self.cache.delete(&Self::key(message_id)).await;
    }

    pub async fn len(&self) -> usize {
        self.cache.size().await
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        self.cache.clear().await;
        self.backend
            .remove_items(&[MESSAGE_CACHE_KEY.to_string()])
            .await
    }

    /// 期限切れを掃除してから保存する
    pub async fn persist(&self) -> Result<usize, AppError> {
        let expired = self.cache.cleanup_expired().await;
        self.cache
            .persist(self.backend.as_ref(), MESSAGE_CACHE_KEY)
            .await?;
        Ok(expired)
    }

    pub async fn restore(&self) -> Result<usize, AppError> {
        self.cache
            .restore(self.backend.as_ref(), MESSAGE_CACHE_KEY)
            .await
    }

    fn key(message_id: &str) -> String {
        format!("msg:{message_id}")
    }
}
