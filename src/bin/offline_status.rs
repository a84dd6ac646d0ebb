use anyhow::{Context, Result, bail};
use bolt_offline_lib::application::ports::{Clock, PayloadCipher, ReachabilityProbe};
use bolt_offline_lib::application::services::{
    DurableStore, DurableStoreSettings, MessageHistory, PendingQueue, SYNC_STATS_KEY,
    StorageQuotaService,
};
use bolt_offline_lib::domain::entities::{PendingOperation, QuotaReport, StorageStats, SyncStats};
use bolt_offline_lib::domain::value_objects::StorageOptions;
use bolt_offline_lib::infrastructure::compression::GzipCompressor;
use bolt_offline_lib::infrastructure::crypto::{AesGcmPayloadCipher, DisabledCipher};
use bolt_offline_lib::infrastructure::network::ConnectivityMonitor;
use bolt_offline_lib::infrastructure::storage::SqliteKeyValueBackend;
use bolt_offline_lib::infrastructure::SystemClock;
use bolt_offline_lib::AppConfig;
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
struct CliOptions {
    output: Option<PathBuf>,
    pretty: bool,
    database_url: Option<String>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    generated_at_ms: i64,
    pending: Vec<PendingOperation>,
    failed: Vec<PendingOperation>,
    sync_stats: SyncStats,
    storage_stats: StorageStats,
    quota: QuotaReport,
}

fn usage() -> &'static str {
    "Usage: offline_status [--output <path>] [--pretty] [--database-url <url>]"
}

fn write_output(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    fs::write(path, data).with_context(|| format!("Failed to write {}", path.display()))
}

fn emit_payload(target: Option<&Path>, payload: &str) -> Result<()> {
    if let Some(path) = target {
        write_output(path, payload)?;
        println!("Status written to {}", path.display());
    } else {
        println!("{payload}");
    }
    Ok(())
}

fn main() -> Result<()> {
    bolt_offline_lib::init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_args(args.into_iter())?;

    let mut config = AppConfig::from_env();
    if let Some(url) = &options.database_url {
        config.database.url = url.clone();
    }
    config
        .validate()
        .map_err(|err| anyhow::anyhow!("Invalid configuration: {err}"))?;

    let rt = Runtime::new().context("Failed to create Tokio runtime")?;
    let report = rt.block_on(async {
        collect_status(&config)
            .await
            .with_context(|| format!("Failed to read offline state from {}", config.database.url))
    })?;

    let payload = to_json(&report, options.pretty)?;
    emit_payload(options.output.as_deref(), &payload)
}

async fn collect_status(config: &AppConfig) -> Result<StatusReport> {
    let backend = Arc::new(
        SqliteKeyValueBackend::connect(&config.database.url, config.database.max_connections)
            .await?,
    );
    let cipher: Arc<dyn PayloadCipher> = match &config.storage.encryption_secret {
        Some(secret) => Arc::new(AesGcmPayloadCipher::new(secret)),
        None => Arc::new(DisabledCipher),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(DurableStore::new(
        backend.clone(),
        cipher,
        Arc::new(GzipCompressor::new()),
        Arc::clone(&clock),
        DurableStoreSettings {
            compression_threshold: config.storage.compression_threshold,
            chunk_size: config.storage.chunk_size,
        },
    ));

    let queue = PendingQueue::new(Arc::clone(&store), Arc::clone(&clock), config.sync.max_retries);
    queue.load().await?;

    let sync_stats = store
        .get::<SyncStats>(SYNC_STATS_KEY, StorageOptions::default())
        .await?
        .unwrap_or_default();

    // 読み取り専用なのでネットワーク状態は使わない
    let reachability: Arc<dyn ReachabilityProbe> = Arc::new(ConnectivityMonitor::default());
    let quota = StorageQuotaService::new(
        Arc::clone(&store),
        Arc::new(MessageHistory::new(Arc::clone(&store))),
        reachability,
        Arc::clone(&clock),
        config.quota.clone(),
    );
    let quota = quota.check_quotas().await?;

    let report = StatusReport {
        generated_at_ms: clock.now_ms(),
        pending: queue.list().await,
        failed: queue.failed().await,
        sync_stats,
        storage_stats: quota.stats,
        quota,
    };
    backend.close().await;
    Ok(report)
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(value)?)
    } else {
        Ok(serde_json::to_string(value)?)
    }
}

fn parse_args<I>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut output: Option<PathBuf> = None;
    let mut pretty = false;
    let mut database_url: Option<String> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-o" | "--output" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--output requires a path\n{}", usage()))?;
                output = Some(PathBuf::from(path));
            }
            "--pretty" => {
                pretty = true;
            }
            "--database-url" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow::anyhow!("--database-url requires a value\n{}", usage())
                })?;
                database_url = Some(value);
            }
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other => {
                bail!("Unknown argument: {other}\n{}", usage());
            }
        }
    }

    Ok(CliOptions {
        output,
        pretty,
        database_url,
    })
}
