pub mod aes_gcm_cipher;

pub use aes_gcm_cipher::{AesGcmPayloadCipher, DisabledCipher};
