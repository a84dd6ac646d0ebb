use async_trait::async_trait;
use bolt_offline_lib::application::ports::RemoteChangeSource;
use bolt_offline_lib::domain::entities::{ChangeRecord, TransferStats};
use bolt_offline_lib::AppError;
use tokio::sync::RwLock;

/// 固定のリモート変更を返し、アップロードされた内容を保持する
#[derive(Default)]
pub struct ScriptedRemote {
    remote_changes: RwLock<Vec<ChangeRecord>>,
    uploaded: RwLock<Vec<ChangeRecord>>,
}

impl ScriptedRemote {
    pub fn with_changes(changes: Vec<ChangeRecord>) -> Self {
        Self {
            remote_changes: RwLock::new(changes),
            uploaded: RwLock::new(Vec::new()),
        }
    }

    pub async fn uploaded(&self) -> Vec<ChangeRecord> {
        self.uploaded.read().await.clone()
    }
}

fn payload_bytes(changes: &[ChangeRecord]) -> u64 {
    changes
        .iter()
        .map(|change| change.payload.to_string().len() as u64)
        .sum()
}

#[async_trait]
impl RemoteChangeSource for ScriptedRemote {
    async fn get_changes(&self, since: i64) -> Result<Vec<ChangeRecord>, AppError> {
        Ok(self
            .remote_changes
            .read()
            .await
            .iter()
            .filter(|change| change.timestamp > since)
            .cloned()
            .collect())
    }

    async fn upload_changes(&self, changes: &[ChangeRecord]) -> Result<TransferStats, AppError> {
        self.uploaded.write().await.extend_from_slice(changes);
        Ok(TransferStats {
            bytes: payload_bytes(changes),
        })
    }

    async fn download_changes(
        &self,
        changes: &[ChangeRecord],
    ) -> Result<TransferStats, AppError> {
        Ok(TransferStats {
            bytes: payload_bytes(changes),
        })
    }
}
