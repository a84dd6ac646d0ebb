use crate::application::ports::KeyValueBackend;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// プロセス内だけで完結するキーバリューストア
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueBackend {
    items: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryKeyValueBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueBackend for MemoryKeyValueBackend {
    async fn get_item(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.items
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_items(&self, keys: &[String]) -> Result<(), AppError> {
        let mut items = self.items.write().await;
        for key in keys {
            items.remove(key);
        }
        Ok(())
    }

    async fn all_keys(&self) -> Result<Vec<String>, AppError> {
        Ok(self.items.read().await.keys().cloned().collect())
    }

    async fn clear(&self) -> Result<(), AppError> {
        self.items.write().await.clear();
        Ok(())
    }
}
