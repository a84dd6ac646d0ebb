use crate::application::ports::AnalyticsSink;
use crate::domain::entities::AnalyticsEvent;
use crate::shared::error::AppError;
use async_trait::async_trait;

/// 送信先の無い環境向け。イベントをログへ流すだけ
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnalyticsSink;

#[async_trait]
impl AnalyticsSink for TracingAnalyticsSink {
    async fn send(&self, events: &[AnalyticsEvent]) -> Result<(), AppError> {
        for event in events {
            tracing::info!(
                target: "offline::analytics",
                name = %event.name,
                timestamp = event.timestamp,
                properties = %event.properties,
                "Analytics event"
            );
        }
        Ok(())
    }
}
