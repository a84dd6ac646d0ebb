use crate::domain::value_objects::ConflictPolicy;
use serde::{Deserialize, Serialize};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

/// 分割保存の最小チャンクサイズ（UTF-8 の 1 文字が必ず収まるように余裕を持たせる）
pub const MIN_CHUNK_SIZE: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub scheduler: SchedulerConfig,
    pub quota: QuotaConfig,
    pub backup: BackupConfig,
    pub analytics: AnalyticsConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub compression_threshold: usize,
    pub chunk_size: usize,
    /// 暗号化キーの導出元。`None` の場合は暗号化オプションが使えない
    #[serde(default)]
    pub encryption_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub sync_interval_ms: u64,
    pub min_sync_interval_ms: u64,
    pub wifi_only: bool,
    pub conflict_policy: ConflictPolicy,
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub jitter_ms: u64,
    pub cycle_retry_limit: u32,
    pub cycle_retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub quota_check_interval_ms: u64,
    pub cleanup_interval_ms: u64,
    pub backup_interval_ms: u64,
    pub analytics_flush_interval_ms: u64,
    #[serde(default)]
    pub task_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub max_total_bytes: u64,
    pub max_message_count: u64,
    pub max_attachment_bytes: u64,
    pub message_retention: usize,
    pub attachment_max_age_ms: u64,
    pub cleanup_requires_connectivity: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub retain_count: usize,
    pub wifi_only: bool,
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub enabled: bool,
    pub batch_size: usize,
    pub max_queue_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl_ms: u64,
    pub compression_threshold: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/bolt_offline.db?mode=rwc".to_string(),
                max_connections: 5,
            },
            storage: StorageConfig {
                compression_threshold: (10 * KIB) as usize,
                chunk_size: MIB as usize,
                encryption_secret: None,
            },
            sync: SyncConfig::default(),
            scheduler: SchedulerConfig {
                quota_check_interval_ms: 30 * MINUTE_MS,
                cleanup_interval_ms: DAY_MS,
                backup_interval_ms: DAY_MS,
                analytics_flush_interval_ms: MINUTE_MS,
                task_timeout_ms: None,
            },
            quota: QuotaConfig::default(),
            backup: BackupConfig {
                enabled: true,
                interval_ms: DAY_MS,
                retain_count: 5,
                wifi_only: true,
                directory: None,
            },
            analytics: AnalyticsConfig {
                enabled: true,
                batch_size: 50,
                max_queue_size: 1000,
            },
            cache: CacheConfig {
                max_entries: 1000,
                default_ttl_ms: DAY_MS,
                compression_threshold: (10 * KIB) as usize,
            },
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval_ms: 15 * MINUTE_MS,
            min_sync_interval_ms: 30 * 1000,
            wifi_only: false,
            conflict_policy: ConflictPolicy::Newest,
            max_retries: 5,
            initial_retry_delay_ms: 1000,
            max_retry_delay_ms: MINUTE_MS,
            jitter_ms: 1000,
            cycle_retry_limit: 3,
            cycle_retry_delay_ms: 5000,
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_total_bytes: 100 * MIB,
            max_message_count: 1000,
            max_attachment_bytes: 50 * MIB,
            message_retention: 1000,
            attachment_max_age_ms: 30 * DAY_MS,
            cleanup_requires_connectivity: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("BOLT_DATABASE_URL") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.database.url = trimmed.to_string();
            }
        }
        if let Ok(v) = std::env::var("BOLT_STORAGE_SECRET") {
            if !v.is_empty() {
                cfg.storage.encryption_secret = Some(v);
            }
        }

        // 同期設定
        if let Ok(v) = std::env::var("BOLT_SYNC_AUTO") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Ok(v) = std::env::var("BOLT_SYNC_WIFI_ONLY") {
            cfg.sync.wifi_only = parse_bool(&v, cfg.sync.wifi_only);
        }
        if let Ok(v) = std::env::var("BOLT_SYNC_CONFLICT_POLICY") {
            cfg.sync.conflict_policy = ConflictPolicy::from(v.trim());
        }
        if let Some(value) = env_u64("BOLT_SYNC_INTERVAL_MS") {
            cfg.sync.sync_interval_ms = value.max(1);
        }
        if let Some(value) = env_u64("BOLT_SYNC_MIN_INTERVAL_MS") {
            cfg.sync.min_sync_interval_ms = value;
        }
        if let Some(value) = env_u64("BOLT_SYNC_MAX_RETRIES") {
            cfg.sync.max_retries = value.clamp(1, u32::MAX as u64) as u32;
        }

        // スケジューラ設定
        if let Some(value) = env_u64("BOLT_TASK_TIMEOUT_MS") {
            cfg.scheduler.task_timeout_ms = if value == 0 { None } else { Some(value) };
        }

        // バックアップ設定
        if let Ok(v) = std::env::var("BOLT_BACKUP_ENABLED") {
            cfg.backup.enabled = parse_bool(&v, cfg.backup.enabled);
        }
        if let Ok(v) = std::env::var("BOLT_BACKUP_DIR") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.backup.directory = Some(trimmed.to_string());
            }
        }

        if let Ok(v) = std::env::var("BOLT_ANALYTICS_ENABLED") {
            cfg.analytics.enabled = parse_bool(&v, cfg.analytics.enabled);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.storage.chunk_size < MIN_CHUNK_SIZE {
            return Err(format!(
                "Storage chunk_size must be at least {MIN_CHUNK_SIZE} bytes"
            ));
        }
        if self.sync.sync_interval_ms == 0 {
            return Err("Sync sync_interval_ms must be greater than 0".to_string());
        }
        if self.sync.max_retries == 0 {
            return Err("Sync max_retries must be greater than 0".to_string());
        }
        if self.sync.initial_retry_delay_ms > self.sync.max_retry_delay_ms {
            return Err(
                "Sync initial_retry_delay_ms must not exceed max_retry_delay_ms".to_string(),
            );
        }
        let intervals = [
            ("quota_check_interval_ms", self.scheduler.quota_check_interval_ms),
            ("cleanup_interval_ms", self.scheduler.cleanup_interval_ms),
            ("backup_interval_ms", self.scheduler.backup_interval_ms),
            (
                "analytics_flush_interval_ms",
                self.scheduler.analytics_flush_interval_ms,
            ),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(format!("Scheduler {name} must be greater than 0"));
            }
        }
        if self.backup.enabled && self.backup.retain_count == 0 {
            return Err("Backup retain_count must be greater than 0".to_string());
        }
        if self.analytics.batch_size == 0 {
            return Err("Analytics batch_size must be greater than 0".to_string());
        }
        if self.cache.max_entries == 0 {
            return Err("Cache max_entries must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| parse_u64(&v))
}
