/// エポックからのミリ秒を返す時計
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}
