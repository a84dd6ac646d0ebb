use super::{ChatMessage, PendingOperation};
use serde::{Deserialize, Serialize};

/// バックアップ先に保存されている1件分の情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDescriptor {
    pub name: String,
    pub created_at: i64,
    pub size_bytes: u64,
}

pub const BACKUP_FILE_PREFIX: &str = "bolt-backup-";
pub const BACKUP_FILE_EXTENSION: &str = "boltbackup";

impl BackupDescriptor {
    /// `bolt-backup-<millis>.boltbackup`
    pub fn file_name(created_at: i64) -> String {
        format!("{BACKUP_FILE_PREFIX}{created_at}.{BACKUP_FILE_EXTENSION}")
    }

    pub fn parse_created_at(name: &str) -> Option<i64> {
        name.strip_prefix(BACKUP_FILE_PREFIX)?
            .strip_suffix(BACKUP_FILE_EXTENSION)?
            .strip_suffix('.')?
            .parse()
            .ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub version: u32,
    pub created_at: i64,
    pub messages: Vec<ChatMessage>,
    pub pending: Vec<PendingOperation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BackupOutcome {
    Skipped { reason: String },
    Completed { name: String, bytes: u64, pruned: usize },
}
