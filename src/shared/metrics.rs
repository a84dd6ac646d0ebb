use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

pub const UNSET_TS: i64 = 0;

/// 成功・失敗回数と最終時刻を保持するロックフリーなカウンタ
#[derive(Debug)]
pub struct OutcomeCounter {
    success: AtomicU64,
    failure: AtomicU64,
    last_success_ms: AtomicI64,
    last_failure_ms: AtomicI64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeSnapshot {
    pub successes: u64,
    pub failures: u64,
    pub last_success_ms: Option<i64>,
    pub last_failure_ms: Option<i64>,
}

impl OutcomeCounter {
    pub const fn new() -> Self {
        Self {
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            last_success_ms: AtomicI64::new(UNSET_TS),
            last_failure_ms: AtomicI64::new(UNSET_TS),
        }
    }

    pub fn record_success(&self, at_ms: i64) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.last_success_ms.store(at_ms, Ordering::Relaxed);
    }

    pub fn record_failure(&self, at_ms: i64) {
        self.failure.fetch_add(1, Ordering::Relaxed);
        self.last_failure_ms.store(at_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OutcomeSnapshot {
        OutcomeSnapshot {
            successes: self.success.load(Ordering::Relaxed),
            failures: self.failure.load(Ordering::Relaxed),
            last_success_ms: timestamp_to_option(self.last_success_ms.load(Ordering::Relaxed)),
            last_failure_ms: timestamp_to_option(self.last_failure_ms.load(Ordering::Relaxed)),
        }
    }
}

impl Default for OutcomeCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
pub fn timestamp_to_option(value: i64) -> Option<i64> {
    if value == UNSET_TS { None } else { Some(value) }
}
