use super::durable_store::{DurableStore, chunk_owner};
use crate::domain::entities::{ChangeRecord, ChatMessage, StoredAttachment};
use crate::domain::value_objects::StorageOptions;
use crate::shared::error::AppError;
use std::sync::Arc;

pub const MESSAGE_KEY_PREFIX: &str = "message_";
pub const ATTACHMENT_KEY_PREFIX: &str = "attachment_";

/// メッセージ 1 件を `message_<id>` の 1 キーに保存するローカル履歴
pub struct MessageHistory {
    store: Arc<DurableStore>,
}

impl MessageHistory {
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, id: &str) -> Result<Option<ChatMessage>, AppError> {
        self.store
            .get(&message_key(id)?, StorageOptions::default())
            .await
    }

    /// 既存より新しい（同時刻を含む）場合だけ書き込む
    pub async fn save_message(&self, message: &ChatMessage) -> Result<bool, AppError> {
        let key = message_key(&message.id)?;
        if let Some(existing) = self
            .store
            .get::<ChatMessage>(&key, StorageOptions::default())
            .await?
        {
            if existing.timestamp > message.timestamp {
                return Ok(false);
            }
        }
        self.store.set(&key, message, StorageOptions::default()).await?;
        Ok(true)
    }

    /// 同じ id が複数含まれる場合も最新版だけが残る
    pub async fn save_messages(&self, messages: &[ChatMessage]) -> Result<usize, AppError> {
        let mut saved = 0;
        for message in messages {
            if self.save_message(message).await? {
                saved += 1;
            }
        }
        Ok(saved)
    }

    pub async fn remove(&self, id: &str) -> Result<(), AppError> {
        self.store.remove(&message_key(id)?).await
    }

    /// 時刻順（同時刻は id 順）
    pub async fn list(&self) -> Result<Vec<ChatMessage>, AppError> {
        let mut messages: Vec<ChatMessage> = self.load_prefixed(MESSAGE_KEY_PREFIX).await?;
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(messages)
    }

    /// `since` より後に更新されたローカルメッセージ
    pub async fn changes_since(&self, since: i64) -> Result<Vec<ChangeRecord>, AppError> {
        self.list()
            .await?
            .into_iter()
            .filter(|message| message.timestamp > since)
            .map(|message| -> Result<ChangeRecord, AppError> {
                let timestamp = message.timestamp;
                let id = message.id.clone();
                Ok(ChangeRecord::new(id, timestamp, serde_json::to_value(message)?))
            })
            .collect()
    }

    /// リモートから採用した変更を反映する。
    /// 1 件でも不正なら何も書かずにエラーを返す
    pub async fn apply_changes(&self, changes: &[ChangeRecord]) -> Result<usize, AppError> {
        let mut decoded = Vec::with_capacity(changes.len());
        for change in changes {
            let message: ChatMessage = serde_json::from_value(change.payload.clone())
                .map_err(|err| {
                    AppError::Sync(format!("Malformed remote record {}: {err}", change.id))
                })?;
            if message.id != change.id {
                return Err(AppError::Sync(format!(
                    "Remote record id mismatch: {} carries {}",
                    change.id, message.id
                )));
            }
            message_key(&message.id)?;
            decoded.push(message);
        }

        for message in &decoded {
            self.store
                .set(&message_key(&message.id)?, message, StorageOptions::default())
                .await?;
        }
        Ok(decoded.len())
    }

    pub async fn save_attachment(&self, attachment: &StoredAttachment) -> Result<(), AppError> {
        let key = attachment_key(&attachment.id)?;
        self.store.set(&key, attachment, StorageOptions::default()).await
    }

    pub async fn remove_attachment(&self, id: &str) -> Result<(), AppError> {
        self.store.remove(&attachment_key(id)?).await
    }

    pub async fn attachments(&self) -> Result<Vec<StoredAttachment>, AppError> {
        let mut attachments: Vec<StoredAttachment> =
            self.load_prefixed(ATTACHMENT_KEY_PREFIX).await?;
        attachments.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(attachments)
    }

    async fn load_prefixed<T>(&self, prefix: &str) -> Result<Vec<T>, AppError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut items = Vec::new();
        for key in self.store.keys().await? {
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(item) = self.store.get(&key, StorageOptions::default()).await? {
                items.push(item);
            }
        }
        Ok(items)
    }
}

fn message_key(id: &str) -> Result<String, AppError> {
    prefixed_key(MESSAGE_KEY_PREFIX, id)
}

fn attachment_key(id: &str) -> Result<String, AppError> {
    prefixed_key(ATTACHMENT_KEY_PREFIX, id)
}

fn prefixed_key(prefix: &str, id: &str) -> Result<String, AppError> {
    if id.trim().is_empty() {
        return Err(AppError::ValidationError("Id must not be empty".to_string()));
    }
    let key = format!("{prefix}{id}");
    // チャンク名と衝突するキーはストアが書き込みを拒否する
    if chunk_owner(&key).is_some() {
        return Err(AppError::ValidationError(format!(
            "Id collides with chunk naming: {id}"
        )));
    }
    Ok(key)
}
