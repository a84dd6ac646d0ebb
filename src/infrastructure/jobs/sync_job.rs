use super::scheduler::TaskHandler;
use crate::application::services::{SyncEngine, SyncOutcome};
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;

pub struct SyncJob {
    engine: Arc<SyncEngine>,
}

impl SyncJob {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for SyncJob {
    async fn run(&self) -> Result<(), AppError> {
        match self.engine.sync().await? {
            SyncOutcome::Completed(report) => match report.error {
                Some(error) => Err(AppError::Sync(error)),
                None => Ok(()),
            },
            SyncOutcome::Skipped { reason } => {
                tracing::debug!(target: "offline::sync", reason = ?reason, "Scheduled sync skipped");
                Ok(())
            }
            SyncOutcome::AlreadyRunning => Ok(()),
        }
    }
}
