use crate::application::ports::BackgroundLease;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// プロセス内で完結する実行権。OS 側の仕組みが無い環境（デスクトップ・テスト）で使う
#[derive(Debug, Default)]
pub struct ProcessLease {
    held: AtomicBool,
}

impl ProcessLease {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackgroundLease for ProcessLease {
    async fn acquire(&self) -> Result<(), AppError> {
        if !self.held.swap(true, Ordering::SeqCst) {
            tracing::debug!(target: "offline::scheduler", "Background lease acquired");
        }
        Ok(())
    }

    async fn release(&self) -> Result<(), AppError> {
        if self.held.swap(false, Ordering::SeqCst) {
            tracing::debug!(target: "offline::scheduler", "Background lease released");
        }
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}
