use crate::application::ports::PayloadCipher;
use crate::shared::error::AppError;
use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use sha2::{Digest, Sha256};

const NONCE_SIZE: usize = 12;

/// AES-256-GCM。出力は `base64(nonce || ciphertext)`
pub struct AesGcmPayloadCipher {
    key: Key<Aes256Gcm>,
}

impl AesGcmPayloadCipher {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Self::derive_key(secret),
        }
    }

    fn derive_key(secret: &str) -> Key<Aes256Gcm> {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        let result = hasher.finalize();
        let mut key = Key::<Aes256Gcm>::default();
        key.copy_from_slice(&result);
        key
    }

    fn encrypt_internal(&self, plaintext: &[u8]) -> Result<String, AppError> {
        let cipher = Aes256Gcm::new(&self.key);
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|err| AppError::Crypto(format!("Encryption failed: {err}")))?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&ciphertext);

        Ok(general_purpose::STANDARD.encode(combined))
    }

    fn decrypt_internal(&self, encoded: &str) -> Result<Vec<u8>, AppError> {
        let combined = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|err| AppError::Crypto(format!("Base64 decode failed: {err}")))?;

        if combined.len() < NONCE_SIZE {
            return Err(AppError::Crypto(
                "Encrypted data is shorter than nonce size".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let mut nonce = Nonce::default();
        nonce.copy_from_slice(nonce_bytes);

        let cipher = Aes256Gcm::new(&self.key);
        cipher
            .decrypt(&nonce, ciphertext)
            .map_err(|err| AppError::Crypto(format!("Decryption failed: {err}")))
    }
}

#[async_trait]
impl PayloadCipher for AesGcmPayloadCipher {
    async fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        self.encrypt_internal(plaintext.as_bytes())
    }

    async fn decrypt(&self, ciphertext: &str) -> Result<String, AppError> {
        let bytes = self.decrypt_internal(ciphertext)?;
        String::from_utf8(bytes)
            .map_err(|err| AppError::Crypto(format!("Decrypted payload is not UTF-8: {err}")))
    }
}

/// 暗号鍵が設定されていない環境用。暗号化を要求されたら失敗させる
pub struct DisabledCipher;

#[async_trait]
impl PayloadCipher for DisabledCipher {
    async fn encrypt(&self, _plaintext: &str) -> Result<String, AppError> {
        Err(AppError::ConfigurationError(
            "Encryption requested but no storage secret is configured".to_string(),
        ))
    }

    async fn decrypt(&self, _ciphertext: &str) -> Result<String, AppError> {
        Err(AppError::ConfigurationError(
            "Decryption requested but no storage secret is configured".to_string(),
        ))
    }
}
