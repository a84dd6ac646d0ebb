use super::scheduler::TaskHandler;
use crate::application::services::BackupService;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;

pub struct BackupJob {
    backup: Arc<BackupService>,
}

impl BackupJob {
    pub fn new(backup: Arc<BackupService>) -> Self {
        Self { backup }
    }
}

#[async_trait]
impl TaskHandler for BackupJob {
    async fn run(&self) -> Result<(), AppError> {
        self.backup.run().await.map(|_| ())
    }
}
