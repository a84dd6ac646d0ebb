use async_trait::async_trait;
use bolt_offline_lib::application::ports::MessageDelivery;
use bolt_offline_lib::domain::entities::PendingOperation;
use bolt_offline_lib::AppError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

/// 配信された内容を記録する。失敗させたり、途中で止めたりできる
#[derive(Default)]
pub struct RecordingDelivery {
    delivered: RwLock<Vec<String>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
    gate: Option<Arc<Notify>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let delivery = Self::default();
        delivery.failing.store(true, Ordering::SeqCst);
        delivery
    }

    /// `gate` が通知されるまで配信を完了しない
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn delivered(&self) -> Vec<String> {
        self.delivered.read().await.clone()
    }
}

#[async_trait]
impl MessageDelivery for RecordingDelivery {
    async fn deliver(&self, operation: &PendingOperation) -> Result<(), AppError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Delivery("server unavailable".to_string()));
        }
        self.delivered.write().await.push(operation.content.clone());
        Ok(())
    }
}
