use serde::{Deserialize, Serialize};

/// 同期エンジンが所有する統計。再起動をまたいで永続化される
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncStats {
    /// 最後に同期サイクルを終えた時刻（0 は未同期）
    pub last_sync_at: i64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
}
