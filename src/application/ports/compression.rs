use crate::shared::error::AppError;

/// 文字列ペイロードの圧縮。出力はそのまま文字列ストアに書ける形式であること
pub trait PayloadCompressor: Send + Sync {
    fn compress(&self, data: &str) -> Result<String, AppError>;
    fn decompress(&self, data: &str) -> Result<String, AppError>;
}
