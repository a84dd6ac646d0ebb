use serde::{Deserialize, Serialize};

/// 到達性プローブが返すネットワーク状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Connectivity {
    pub is_connected: bool,
    pub is_wifi: bool,
}

impl Connectivity {
    pub const fn offline() -> Self {
        Self {
            is_connected: false,
            is_wifi: false,
        }
    }

    pub const fn wifi() -> Self {
        Self {
            is_connected: true,
            is_wifi: true,
        }
    }

    pub const fn cellular() -> Self {
        Self {
            is_connected: true,
            is_wifi: false,
        }
    }

    /// wifi-only 設定を加味して同期してよいか
    pub fn allows_sync(&self, wifi_only: bool) -> bool {
        self.is_connected && (!wifi_only || self.is_wifi)
    }
}
