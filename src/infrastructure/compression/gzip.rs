use crate::application::ports::PayloadCompressor;
use crate::shared::error::AppError;
use base64::{Engine as _, engine::general_purpose};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

/// gzip + base64。文字列ストアにそのまま書ける
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCompressor;

impl GzipCompressor {
    pub fn new() -> Self {
        Self
    }
}

impl PayloadCompressor for GzipCompressor {
    fn compress(&self, data: &str) -> Result<String, AppError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data.as_bytes())
            .map_err(|err| AppError::Compression(err.to_string()))?;
        let compressed = encoder
            .finish()
            .map_err(|err| AppError::Compression(err.to_string()))?;
        Ok(general_purpose::STANDARD.encode(compressed))
    }

    fn decompress(&self, data: &str) -> Result<String, AppError> {
        let compressed = general_purpose::STANDARD
            .decode(data)
            .map_err(|err| AppError::Compression(format!("Base64 decode failed: {err}")))?;
        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut out = String::new();
        decoder
            .read_to_string(&mut out)
            .map_err(|err| AppError::Compression(err.to_string()))?;
        Ok(out)
    }
}
