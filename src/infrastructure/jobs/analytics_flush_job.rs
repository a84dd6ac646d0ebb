use super::scheduler::TaskHandler;
use crate::application::services::AnalyticsQueue;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;

pub struct AnalyticsFlushJob {
    analytics: Arc<AnalyticsQueue>,
}

impl AnalyticsFlushJob {
    pub fn new(analytics: Arc<AnalyticsQueue>) -> Self {
        Self { analytics }
    }
}

#[async_trait]
impl TaskHandler for AnalyticsFlushJob {
    async fn run(&self) -> Result<(), AppError> {
        self.analytics.flush().await.map(|_| ())
    }
}
