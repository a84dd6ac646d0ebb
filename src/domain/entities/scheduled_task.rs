use crate::domain::value_objects::{TaskId, TaskStatus};
use crate::shared::OutcomeSnapshot;
use serde::Serialize;

/// スケジューラに登録されたタスクの状態スナップショット
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: TaskId,
    pub name: String,
    pub description: String,
    pub interval_ms: u64,
    pub enabled: bool,
    pub status: TaskStatus,
    pub last_run_at: Option<i64>,
    pub last_error: Option<String>,
    pub runs: OutcomeSnapshot,
}
