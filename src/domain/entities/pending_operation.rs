use crate::domain::value_objects::OperationId;
use serde::{Deserialize, Serialize};

/// オフライン中に作成され、配信待ちになっているユーザー操作
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    pub id: OperationId,
    pub content: String,
    pub created_at: i64,
    pub retry_count: u32,
    pub last_attempt_at: Option<i64>,
}

impl PendingOperation {
    pub fn new(content: String, created_at: i64) -> Self {
        Self {
            id: OperationId::generate(),
            content,
            created_at,
            retry_count: 0,
            last_attempt_at: None,
        }
    }

    /// リトライ上限に達し、手動リトライ待ちになっているか
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= max_retries
    }
}

/// オフラインインジケータ向けのキュー集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSummary {
    pub pending: usize,
    pub failed: usize,
}

impl QueueSummary {
    pub fn from_operations(operations: &[PendingOperation], max_retries: u32) -> Self {
        let failed = operations
            .iter()
            .filter(|op| op.is_exhausted(max_retries))
            .count();
        Self {
            pending: operations.len(),
            failed,
        }
    }
}
