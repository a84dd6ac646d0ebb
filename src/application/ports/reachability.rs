use crate::domain::value_objects::Connectivity;
use async_trait::async_trait;

#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn current(&self) -> Connectivity;
}
