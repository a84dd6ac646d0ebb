use super::connection_pool::ConnectionPool;
use crate::application::ports::KeyValueBackend;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

const SELECT_ITEM: &str = "SELECT value FROM kv_store WHERE key = ?1";
const UPSERT_ITEM: &str = r#"
    INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
"#;
const DELETE_ITEM: &str = "DELETE FROM kv_store WHERE key = ?1";
const SELECT_KEYS: &str = "SELECT key FROM kv_store ORDER BY key";
const DELETE_ALL: &str = "DELETE FROM kv_store";

/// SQLite の `kv_store` テーブルに載せたキーバリューストア
pub struct SqliteKeyValueBackend {
    pool: ConnectionPool,
}

impl SqliteKeyValueBackend {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = ConnectionPool::new(database_url, max_connections).await?;
        let backend = Self::new(pool);
        backend.initialize().await?;
        Ok(backend)
    }

    pub async fn initialize(&self) -> Result<(), AppError> {
        self.pool.migrate().await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl KeyValueBackend for SqliteKeyValueBackend {
    async fn get_item(&self, key: &str) -> Result<Option<String>, AppError> {
        let row = sqlx::query(SELECT_ITEM)
            .bind(key)
            .fetch_optional(self.pool.get_pool())
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get::<String, _>("value")?)),
            None => Ok(None),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(UPSERT_ITEM)
            .bind(key)
            .bind(value)
            .bind(Utc::now().timestamp_millis())
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    async fn remove_items(&self, keys: &[String]) -> Result<(), AppError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.get_pool().begin().await?;
        for key in keys {
            sqlx::query(DELETE_ITEM).bind(key).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn all_keys(&self) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query(SELECT_KEYS)
            .fetch_all(self.pool.get_pool())
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("key").map_err(AppError::from))
            .collect()
    }

    async fn clear(&self) -> Result<(), AppError> {
        sqlx::query(DELETE_ALL)
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_backend() -> SqliteKeyValueBackend {
        let pool = ConnectionPool::from_memory().await.unwrap();
        let backend = SqliteKeyValueBackend::new(pool);
        backend.initialize().await.unwrap();
        backend
    }

    #[tokio::test]
    async fn set_get_and_overwrite() {
        let backend = setup_backend().await;
        assert_eq!(backend.get_item("a").await.unwrap(), None);

        backend.set_item("a", "1").await.unwrap();
        backend.set_item("a", "2").await.unwrap();
        assert_eq!(backend.get_item("a").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn remove_items_and_clear() {
        let backend = setup_backend().await;
        for key in ["message_1", "message_2", "attachment_1"] {
            backend.set_item(key, "{}").await.unwrap();
        }

        backend
            .remove_items(&["message_1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(
            backend.all_keys().await.unwrap(),
            vec!["attachment_1".to_string(), "message_2".to_string()]
        );

        backend.clear().await.unwrap();
        assert!(backend.all_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persists_across_connections_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("kv.db").display());

        let backend = SqliteKeyValueBackend::connect(&url, 1).await.unwrap();
        backend.set_item("@bolt_pending_messages", "[]").await.unwrap();
        backend.close().await;

        let reopened = SqliteKeyValueBackend::connect(&url, 1).await.unwrap();
        assert_eq!(
            reopened
                .get_item("@bolt_pending_messages")
                .await
                .unwrap()
                .as_deref(),
            Some("[]")
        );
    }
}
