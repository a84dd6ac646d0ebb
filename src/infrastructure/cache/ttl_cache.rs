use crate::application::ports::{Clock, KeyValueBackend, PayloadCompressor};
use crate::shared::error::AppError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// キャッシュの 1 エントリ。`compressed` の場合 `data` は圧縮済み文字列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub data: Value,
    pub created_at: i64,
    pub expires_at: i64,
    pub compressed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct TtlCacheSettings {
    pub max_entries: usize,
    pub default_ttl: Duration,
    pub compression_threshold: usize,
}

/// TTL と容量上限を持つメモリキャッシュ。
/// 容量超過時は作成時刻が最も古いエントリを 1 件追い出す。
pub struct TtlCache<T> {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    settings: TtlCacheSettings,
    clock: Arc<dyn Clock>,
    compressor: Arc<dyn PayloadCompressor>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TtlCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(
        settings: TtlCacheSettings,
        clock: Arc<dyn Clock>,
        compressor: Arc<dyn PayloadCompressor>,
    ) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            settings,
            clock,
            compressor,
            _marker: PhantomData,
        }
    }

    /// キャッシュにデータを保存
    pub async fn set(&self, key: &str, value: &T) -> Result<(), AppError> {
        self.set_with_ttl(key, value, self.settings.default_ttl).await
    }

    /// 指定したTTLでキャッシュに保存
    pub async fn set_with_ttl(&self, key: &str, value: &T, ttl: Duration) -> Result<(), AppError> {
        let serialized = serde_json::to_string(value)?;
        let now = self.clock.now_ms();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        let (data, compressed) = if serialized.len() > self.settings.compression_threshold {
            (Value::String(self.compressor.compress(&serialized)?), true)
        } else {
            (serde_json::from_str::<Value>(&serialized)?, false)
        };

        let entry = CacheEntry {
            data,
            created_at: now,
            expires_at: now.saturating_add(ttl_ms),
            compressed,
        };

        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) && entries.len() >= self.settings.max_entries {
            let oldest = entries
                .iter()
                .min_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then(a.0.cmp(b.0)))
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    /// キャッシュからデータを取得。期限切れはこの時点で削除する
    pub async fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now_ms();
        let entry = {
            let entries = self.entries.read().await;
            entries.get(key).cloned()
        }?;

        if entry.expires_at <= now {
            self.entries.write().await.remove(key);
            return None;
        }

        match self.decode(&entry) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(
                    target: "offline::store",
                    key = key,
                    error = %err,
                    "Dropping undecodable cache entry"
                );
                self.entries.write().await.remove(key);
                None
            }
        }
    }

    fn decode(&self, entry: &CacheEntry) -> Result<T, AppError> {
        if entry.compressed {
            let Value::String(payload) = &entry.data else {
                return Err(AppError::DeserializationError(
                    "Compressed cache entry is not a string".to_string(),
                ));
            };
            let json = self.compressor.decompress(payload)?;
            Ok(serde_json::from_str(&json)?)
        } else {
            Ok(serde_json::from_value(entry.data.clone())?)
        }
    }

    /// キャッシュから削除
    pub async fn delete(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// キャッシュをクリア
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// 期限切れのエントリを削除し、削除件数を返す
    pub async fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// キャッシュサイズを取得
    pub async fn size(&self) -> usize {
        self.entries.read().await.len()
    }

    /// 全エントリを 1 キーにまとめて保存する
    pub async fn persist(&self, backend: &dyn KeyValueBackend, key: &str) -> Result<(), AppError> {
        let snapshot = self.entries.read().await.clone();
        let serialized = serde_json::to_string(&snapshot)?;
        backend.set_item(key, &serialized).await
    }

    /// 保存済みのエントリを読み込む。期限切れと容量超過分は捨てる
    pub async fn restore(&self, backend: &dyn KeyValueBackend, key: &str) -> Result<usize, AppError> {
        let Some(raw) = backend.get_item(key).await? else {
            return Ok(0);
        };
        let restored: HashMap<String, CacheEntry> = match serde_json::from_str(&raw) {
            Ok(restored) => restored,
            Err(err) => {
                tracing::warn!(
                    target: "offline::store",
                    key = key,
                    error = %err,
                    "Ignoring corrupt persisted cache"
                );
                return Ok(0);
            }
        };

        let now = self.clock.now_ms();
        let mut live: Vec<(String, CacheEntry)> = restored
            .into_iter()
            .filter(|(_, entry)| entry.expires_at > now)
            .collect();
        live.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at).then(a.0.cmp(&b.0)));
        live.truncate(self.settings.max_entries);

        let count = live.len();
        let mut entries = self.entries.write().await;
        entries.clear();
        entries.extend(live);
        Ok(count)
    }
}
