use rand::Rng;
use std::time::Duration;

/// 指数バックオフ + ジッタの計算。待機そのものは呼び出し側が行う
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_jitter,
        }
    }

    /// `min(initial * 2^attempt, max)`。ジッタは含まない
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn delay_with_jitter<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let jitter_ms = self.max_jitter.as_millis().min(u128::from(u64::MAX)) as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.gen_range(0..=jitter_ms))
        };
        self.base_delay(attempt) + jitter
    }
}
