use serde::{Deserialize, Serialize};

/// 双方向同期で同じ ID が両側に存在する場合の解決方針
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// 常にローカルを優先
    Local,
    /// 常にリモートを優先
    Remote,
    /// タイムスタンプが新しい方を優先（同値はリモート）
    #[default]
    Newest,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Local => "local",
            ConflictPolicy::Remote => "remote",
            ConflictPolicy::Newest => "newest",
        }
    }
}

impl From<&str> for ConflictPolicy {
    fn from(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "local" => ConflictPolicy::Local,
            "remote" => ConflictPolicy::Remote,
            _ => ConflictPolicy::Newest,
        }
    }
}
