use super::durable_store::DurableStore;
use crate::application::ports::Clock;
use crate::domain::entities::{PendingOperation, QueueSummary};
use crate::domain::value_objects::{OperationId, StorageOptions};
use crate::shared::error::AppError;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

pub const PENDING_QUEUE_KEY: &str = "@bolt_pending_messages";

/// オフライン中に作られた操作のキュー。
///
/// 変更はすべて先に `DurableStore` へ書き込み、成功してからメモリ上の
/// ビューを差し替える。キュー全体を 1 キーに保存するので件数と中身が食い違わない。
pub struct PendingQueue {
    store: Arc<DurableStore>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
    operations: Mutex<Vec<PendingOperation>>,
    summary: watch::Sender<QueueSummary>,
}

impl PendingQueue {
    pub fn new(store: Arc<DurableStore>, clock: Arc<dyn Clock>, max_retries: u32) -> Self {
        let (summary, _) = watch::channel(QueueSummary::default());
        Self {
            store,
            clock,
            max_retries,
            operations: Mutex::new(Vec::new()),
            summary,
        }
    }

    /// 永続化済みのキューを読み込む
    pub async fn load(&self) -> Result<usize, AppError> {
        let mut restored: Vec<PendingOperation> = self
            .store
            .get(PENDING_QUEUE_KEY, StorageOptions::default())
            .await?
            .unwrap_or_default();
        sort_operations(&mut restored);

        let count = restored.len();
        let mut operations = self.operations.lock().await;
        *operations = restored;
        self.publish(&operations);

        tracing::info!(target: "offline::queue", pending = count, "Pending queue loaded");
        Ok(count)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub async fn enqueue(&self, content: impl Into<String>) -> Result<PendingOperation, AppError> {
        let operation = PendingOperation::new(content.into(), self.clock.now_ms());

        let mut operations = self.operations.lock().await;
        let mut next = operations.clone();
        next.push(operation.clone());
        sort_operations(&mut next);
        self.commit(&mut operations, next).await?;

        tracing::debug!(
            target: "offline::queue",
            id = %operation.id,
            pending = operations.len(),
            "Operation queued"
        );
        Ok(operation)
    }

    /// 配信済みの操作を取り除く。存在しなければ `false`
    pub async fn dequeue(&self, id: &OperationId) -> Result<bool, AppError> {
        let mut operations = self.operations.lock().await;
        if !operations.iter().any(|op| &op.id == id) {
            return Ok(false);
        }
        let next: Vec<PendingOperation> = operations
            .iter()
            .filter(|op| &op.id != id)
            .cloned()
            .collect();
        self.commit(&mut operations, next).await?;

        tracing::debug!(target: "offline::queue", id = %id, "Operation removed");
        Ok(true)
    }

    /// 作成時刻の昇順
    pub async fn list(&self) -> Vec<PendingOperation> {
        self.operations.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.operations.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.operations.lock().await.is_empty()
    }

    pub async fn update_retry(
        &self,
        id: &OperationId,
        retry_count: u32,
        attempted_at: i64,
    ) -> Result<bool, AppError> {
        self.modify(id, |op| {
            op.retry_count = retry_count;
            op.last_attempt_at = Some(attempted_at);
        })
        .await
    }

    /// リトライ上限に達した操作（UI では「失敗・タップで再送」）
    pub async fn failed(&self) -> Vec<PendingOperation> {
        self.operations
            .lock()
            .await
            .iter()
            .filter(|op| op.is_exhausted(self.max_retries))
            .cloned()
            .collect()
    }

    /// 手動リトライ。リトライ回数を 0 に戻して自動配信の対象へ戻す
    pub async fn reset_retry(&self, id: &OperationId) -> Result<bool, AppError> {
        let reset = self.modify(id, |op| op.retry_count = 0).await?;
        if reset {
            tracing::info!(target: "offline::queue", id = %id, "Retry count reset by user");
        }
        Ok(reset)
    }

    pub fn summary(&self) -> QueueSummary {
        *self.summary.borrow()
    }

    /// オフラインインジケータ用の集計を購読する
    pub fn subscribe(&self) -> watch::Receiver<QueueSummary> {
        self.summary.subscribe()
    }

    async fn modify<F>(&self, id: &OperationId, apply: F) -> Result<bool, AppError>
    where
        F: FnOnce(&mut PendingOperation),
    {
        let mut operations = self.operations.lock().await;
        let mut next = operations.clone();
        let Some(target) = next.iter_mut().find(|op| &op.id == id) else {
            return Ok(false);
        };
        apply(target);
        self.commit(&mut operations, next).await?;
        Ok(true)
    }

    async fn commit(
        &self,
        current: &mut Vec<PendingOperation>,
        next: Vec<PendingOperation>,
    ) -> Result<(), AppError> {
        self.store
            .set(PENDING_QUEUE_KEY, &next, StorageOptions::default())
            .await?;
        *current = next;
        self.publish(current);
        Ok(())
    }

    fn publish(&self, operations: &[PendingOperation]) {
        let summary = QueueSummary::from_operations(operations, self.max_retries);
        self.summary.send_if_modified(|current| {
            if *current == summary {
                false
            } else {
                *current = summary;
                true
            }
        });
    }
}

fn sort_operations(operations: &mut [PendingOperation]) {
    operations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}
