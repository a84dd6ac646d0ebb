use crate::application::ports::{Clock, KeyValueBackend, PayloadCipher, PayloadCompressor};
use crate::domain::value_objects::StorageOptions;
use crate::shared::error::AppError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const COMPRESSED_PREFIX: &str = "gz:";
const ENCRYPTED_PREFIX: &str = "enc:";
const TTL_PREFIX: &str = "ttl:";
const CHUNK_HEADER_PREFIX: &str = "chunked:";
const CHUNK_KEY_INFIX: &str = "_chunk_";

#[derive(Debug, Clone, Copy)]
pub struct DurableStoreSettings {
    /// これを超えるシリアライズ結果は常に圧縮する
    pub compression_threshold: usize,
    /// これを超える最終ペイロードは分割保存する
    pub chunk_size: usize,
}

#[derive(Serialize, Deserialize)]
struct TtlEnvelope {
    value: String,
    expires: i64,
}

/// 論理キーごとの保存サイズ（分割チャンクを含む）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: String,
    pub bytes: u64,
}

/// 文字列 KV ストア上の永続ストア。
///
/// 書き込みは `serialize -> gz -> enc -> ttl -> chunk` の順に行い、
/// 読み込みはその逆順で戻す。各段は接頭辞で自己記述されるため、
/// 読み出し側は書き込み時のオプションを知らなくてよい。
/// 壊れたデータは「存在しない」として扱い、エラーにはしない。
pub struct DurableStore {
    backend: Arc<dyn KeyValueBackend>,
    cipher: Arc<dyn PayloadCipher>,
    compressor: Arc<dyn PayloadCompressor>,
    clock: Arc<dyn Clock>,
    settings: DurableStoreSettings,
}

impl DurableStore {
    pub fn new(
        backend: Arc<dyn KeyValueBackend>,
        cipher: Arc<dyn PayloadCipher>,
        compressor: Arc<dyn PayloadCompressor>,
        clock: Arc<dyn Clock>,
        settings: DurableStoreSettings,
    ) -> Self {
        Self {
            backend,
            cipher,
            compressor,
            clock,
            settings,
        }
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueBackend> {
        &self.backend
    }

    pub async fn set<T>(&self, key: &str, value: &T, options: StorageOptions) -> Result<(), AppError>
    where
        T: Serialize + ?Sized,
    {
        validate_key(key)?;

        let mut payload = serde_json::to_string(value)?;

        if options.compress || payload.len() > self.settings.compression_threshold {
            payload = format!("{COMPRESSED_PREFIX}{}", self.compressor.compress(&payload)?);
        }

        if options.encrypt {
            payload = format!("{ENCRYPTED_PREFIX}{}", self.cipher.encrypt(&payload).await?);
        }

        if let Some(ttl) = options.ttl {
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            let envelope = TtlEnvelope {
                value: payload,
                expires: self.clock.now_ms().saturating_add(ttl_ms),
            };
            payload = format!("{TTL_PREFIX}{}", serde_json::to_string(&envelope)?);
        }

        self.write_payload(key, &payload).await
    }

    pub async fn get<T>(&self, key: &str, options: StorageOptions) -> Result<Option<T>, AppError>
    where
        T: DeserializeOwned,
    {
        validate_key(key)?;

        let Some(mut payload) = self.read_payload(key).await? else {
            return Ok(None);
        };

        if let Some(rest) = payload.strip_prefix(TTL_PREFIX) {
            let envelope: TtlEnvelope = match serde_json::from_str(rest) {
                Ok(envelope) => envelope,
                Err(err) => return Ok(self.corrupt(key, "ttl envelope", &err)),
            };
            if self.clock.now_ms() >= envelope.expires {
                tracing::debug!(target: "offline::store", key = key, "Entry expired, evicting");
                self.remove(key).await?;
                return Ok(None);
            }
            payload = envelope.value;
        }

        if let Some(rest) = payload.strip_prefix(ENCRYPTED_PREFIX) {
            payload = match self.cipher.decrypt(rest).await {
                Ok(plain) => plain,
                Err(err) => return Ok(self.corrupt(key, "encrypted payload", &err)),
            };
        } else if options.encrypt {
            tracing::warn!(
                target: "offline::store",
                key = key,
                "Refusing plaintext payload for a key read with encryption"
            );
            return Ok(None);
        }

        if let Some(rest) = payload.strip_prefix(COMPRESSED_PREFIX) {
            payload = match self.compressor.decompress(rest) {
                Ok(plain) => plain,
                Err(err) => return Ok(self.corrupt(key, "compressed payload", &err)),
            };
        }

        match serde_json::from_str(&payload) {
            Ok(value) => Ok(Some(value)),
            Err(err) => Ok(self.corrupt(key, "json value", &err)),
        }
    }

    /// キーと付随するチャンクを削除する
    pub async fn remove(&self, key: &str) -> Result<(), AppError> {
        validate_key(key)?;

        let mut doomed = vec![key.to_string()];
        match self.backend.get_item(key).await? {
            Some(raw) if raw.starts_with(CHUNK_HEADER_PREFIX) => match parse_chunk_header(&raw) {
                Some(count) => doomed.extend((0..count).map(|i| chunk_key(key, i))),
                None => doomed.extend(self.orphan_chunks(key).await?),
            },
            _ => {}
        }

        self.backend.remove_items(&doomed).await
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        tracing::info!(target: "offline::store", "Clearing durable store");
        self.backend.clear().await
    }

    /// 論理キーの一覧（チャンクキーは含まない）
    pub async fn keys(&self) -> Result<Vec<String>, AppError> {
        let mut keys: Vec<String> = self
            .backend
            .all_keys()
            .await?
            .into_iter()
            .filter(|key| chunk_owner(key).is_none())
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// 全論理キーの保存バイト数。チャンクは持ち主のキーに合算し、
    /// ヘッダの無い孤立チャンクは数えない
    pub async fn entry_sizes(&self) -> Result<Vec<StoredEntry>, AppError> {
        let mut raws: BTreeMap<String, String> = BTreeMap::new();
        for key in self.backend.all_keys().await? {
            if let Some(raw) = self.backend.get_item(&key).await? {
                raws.insert(key, raw);
            }
        }

        let mut sizes: BTreeMap<String, u64> = BTreeMap::new();
        for (key, raw) in &raws {
            let owner = match chunk_owner(key) {
                Some(owner) => {
                    let has_header = raws
                        .get(owner)
                        .and_then(|header| parse_chunk_header(header))
                        .is_some();
                    if !has_header {
                        tracing::debug!(target: "offline::store", key = %key, "Skipping orphan chunk");
                        continue;
                    }
                    owner
                }
                None => key.as_str(),
            };
            *sizes.entry(owner.to_string()).or_default() += raw.len() as u64;
        }
        Ok(sizes
            .into_iter()
            .map(|(key, bytes)| StoredEntry { key, bytes })
            .collect())
    }

    async fn write_payload(&self, key: &str, payload: &str) -> Result<(), AppError> {
        let previous_chunks = match self.backend.get_item(key).await? {
            Some(raw) => parse_chunk_header(&raw).unwrap_or(0),
            None => 0,
        };

        let written_chunks = if payload.len() > self.settings.chunk_size {
            let chunks = split_chunks(payload, self.settings.chunk_size);
            for (index, chunk) in chunks.iter().enumerate() {
                self.backend.set_item(&chunk_key(key, index), chunk).await?;
            }
            // ヘッダはチャンクを書き終えてから置く
            self.backend
                .set_item(key, &format!("{CHUNK_HEADER_PREFIX}{}", chunks.len()))
                .await?;
            tracing::debug!(
                target: "offline::store",
                key = key,
                chunks = chunks.len(),
                bytes = payload.len(),
                "Stored chunked payload"
            );
            chunks.len()
        } else {
            self.backend.set_item(key, payload).await?;
            0
        };

        if previous_chunks > written_chunks {
            let stale: Vec<String> = (written_chunks..previous_chunks)
                .map(|i| chunk_key(key, i))
                .collect();
            self.backend.remove_items(&stale).await?;
        }
        Ok(())
    }

    async fn read_payload(&self, key: &str) -> Result<Option<String>, AppError> {
        let Some(raw) = self.backend.get_item(key).await? else {
            return Ok(None);
        };

        if !raw.starts_with(CHUNK_HEADER_PREFIX) {
            return Ok(Some(raw));
        }

        let Some(count) = parse_chunk_header(&raw) else {
            tracing::warn!(target: "offline::store", key = key, header = %raw, "Malformed chunk header");
            return Ok(None);
        };

        let mut assembled = String::new();
        for index in 0..count {
            match self.backend.get_item(&chunk_key(key, index)).await? {
                Some(chunk) => assembled.push_str(&chunk),
                None => {
                    tracing::warn!(
                        target: "offline::store",
                        key = key,
                        missing_chunk = index,
                        expected = count,
                        "Chunk set incomplete, treating as missing"
                    );
                    return Ok(None);
                }
            }
        }
        Ok(Some(assembled))
    }

    async fn orphan_chunks(&self, key: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .backend
            .all_keys()
            .await?
            .into_iter()
            .filter(|candidate| chunk_owner(candidate) == Some(key))
            .collect())
    }

    fn corrupt<T>(&self, key: &str, stage: &str, err: &dyn std::fmt::Display) -> Option<T> {
        tracing::warn!(
            target: "offline::store",
            key = key,
            stage = stage,
            error = %err,
            "Corrupt entry, treating as missing"
        );
        None
    }
}

fn validate_key(key: &str) -> Result<(), AppError> {
    if key.is_empty() {
        return Err(AppError::InvalidInput("Storage key must not be empty".to_string()));
    }
    if chunk_owner(key).is_some() {
        return Err(AppError::InvalidInput(format!(
            "Storage key collides with chunk naming: {key}"
        )));
    }
    Ok(())
}

fn chunk_key(key: &str, index: usize) -> String {
    format!("{key}{CHUNK_KEY_INFIX}{index}")
}

/// `<owner>_chunk_<n>` なら `owner` を返す
pub(crate) fn chunk_owner(key: &str) -> Option<&str> {
    let idx = key.rfind(CHUNK_KEY_INFIX)?;
    let suffix = &key[idx + CHUNK_KEY_INFIX.len()..];
    if idx == 0 || suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(&key[..idx])
}

fn parse_chunk_header(raw: &str) -> Option<usize> {
    raw.strip_prefix(CHUNK_HEADER_PREFIX)?.parse().ok()
}

/// UTF-8 の文字境界を壊さずに `size` バイト以下へ分割する
fn split_chunks(payload: &str, size: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < payload.len() {
        let mut end = (start + size).min(payload.len());
        while end > start && !payload.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // size が 1 文字より小さい場合でも前進させる
            end = start + payload[start..].chars().next().map_or(1, char::len_utf8);
        }
        chunks.push(&payload[start..end]);
        start = end;
    }
    chunks
}
