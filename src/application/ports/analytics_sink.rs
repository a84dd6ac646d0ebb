use crate::domain::entities::AnalyticsEvent;
use crate::shared::error::AppError;
use async_trait::async_trait;

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn send(&self, events: &[AnalyticsEvent]) -> Result<(), AppError>;
}
