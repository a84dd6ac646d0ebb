use super::durable_store::DurableStore;
use crate::application::ports::{AnalyticsSink, Clock, ReachabilityProbe};
use crate::domain::entities::AnalyticsEvent;
use crate::domain::value_objects::StorageOptions;
use crate::shared::config::AnalyticsConfig;
use crate::shared::error::AppError;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const ANALYTICS_QUEUE_KEY: &str = "queued_analytics";

/// 端末内に溜めて、接続中にまとめて送る計測イベントのキュー
pub struct AnalyticsQueue {
    store: Arc<DurableStore>,
    sink: Arc<dyn AnalyticsSink>,
    reachability: Arc<dyn ReachabilityProbe>,
    clock: Arc<dyn Clock>,
    config: AnalyticsConfig,
    lock: Mutex<()>,
}

impl AnalyticsQueue {
    pub fn new(
        store: Arc<DurableStore>,
        sink: Arc<dyn AnalyticsSink>,
        reachability: Arc<dyn ReachabilityProbe>,
        clock: Arc<dyn Clock>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            store,
            sink,
            reachability,
            clock,
            config,
            lock: Mutex::new(()),
        }
    }

    /// 上限を超えたら古いものから捨てる
    pub async fn track(&self, name: impl Into<String>, properties: Value) -> Result<(), AppError> {
        if !self.config.enabled {
            return Ok(());
        }
        let event = AnalyticsEvent {
            name: name.into(),
            properties,
            timestamp: self.clock.now_ms(),
        };

        let _guard = self.lock.lock().await;
        let mut events = self.load().await?;
        events.push(event);
        if events.len() > self.config.max_queue_size {
            let overflow = events.len() - self.config.max_queue_size;
            events.drain(..overflow);
            tracing::debug!(target: "offline::analytics", dropped = overflow, "Analytics queue trimmed");
        }
        self.save(&events).await
    }

    pub async fn queued(&self) -> Result<Vec<AnalyticsEvent>, AppError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// 接続中なら先頭から 1 バッチ送る。送れた件数を返す
    pub async fn flush(&self) -> Result<usize, AppError> {
        if !self.reachability.current().await.is_connected {
            tracing::debug!(target: "offline::analytics", "Flush skipped while offline");
            return Ok(0);
        }

        let _guard = self.lock.lock().await;
        let events = self.load().await?;
        if events.is_empty() {
            return Ok(0);
        }

        let batch_len = events.len().min(self.config.batch_size);
        self.sink.send(&events[..batch_len]).await?;
        self.save(&events[batch_len..]).await?;

        tracing::info!(
            target: "offline::analytics",
            sent = batch_len,
            remaining = events.len() - batch_len,
            "Analytics batch flushed"
        );
        Ok(batch_len)
    }

    async fn load(&self) -> Result<Vec<AnalyticsEvent>, AppError> {
        Ok(self
            .store
            .get(ANALYTICS_QUEUE_KEY, StorageOptions::default())
            .await?
            .unwrap_or_default())
    }

    async fn save(&self, events: &[AnalyticsEvent]) -> Result<(), AppError> {
        self.store
            .set(ANALYTICS_QUEUE_KEY, events, StorageOptions::default())
            .await
    }
}
