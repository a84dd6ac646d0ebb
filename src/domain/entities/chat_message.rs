use serde::{Deserialize, Serialize};

/// ローカル履歴に保存されるチャットメッセージ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: String,
    pub content: String,
    pub timestamp: i64,
}

/// メッセージに添付されたバイナリ（base64）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAttachment {
    pub id: String,
    pub message_id: String,
    pub mime_type: String,
    pub timestamp: i64,
    pub data: String,
}
