use crate::shared::error::AppError;
use async_trait::async_trait;

#[async_trait]
pub trait PayloadCipher: Send + Sync {
    async fn encrypt(&self, plaintext: &str) -> Result<String, AppError>;
    async fn decrypt(&self, ciphertext: &str) -> Result<String, AppError>;
}
