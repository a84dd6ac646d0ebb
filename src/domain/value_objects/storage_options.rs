use std::time::Duration;

/// `DurableStore` の読み書きオプション
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageOptions {
    pub encrypt: bool,
    pub compress: bool,
    pub ttl: Option<Duration>,
}

impl StorageOptions {
    pub fn encrypted() -> Self {
        Self {
            encrypt: true,
            ..Self::default()
        }
    }

    pub fn compressed() -> Self {
        Self {
            compress: true,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}
