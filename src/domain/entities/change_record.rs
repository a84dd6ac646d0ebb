use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 双方向同期でやり取りする変更レコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub id: String,
    pub timestamp: i64,
    pub payload: Value,
}

impl ChangeRecord {
    pub fn new(id: impl Into<String>, timestamp: i64, payload: Value) -> Self {
        Self {
            id: id.into(),
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    pub to_upload: Vec<ChangeRecord>,
    pub to_download: Vec<ChangeRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    pub bytes: u64,
}
