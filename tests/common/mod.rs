#![allow(dead_code)]

pub mod mocks;

use bolt_offline_lib::application::ports::{KeyValueBackend, MessageDelivery, RemoteChangeSource};
use bolt_offline_lib::domain::value_objects::Connectivity;
use bolt_offline_lib::infrastructure::analytics::TracingAnalyticsSink;
use bolt_offline_lib::infrastructure::backup::DirectoryBackupTarget;
use bolt_offline_lib::infrastructure::jobs::ProcessLease;
use bolt_offline_lib::infrastructure::network::ConnectivityMonitor;
use bolt_offline_lib::infrastructure::storage::MemoryKeyValueBackend;
use bolt_offline_lib::infrastructure::ManualClock;
use bolt_offline_lib::{AppConfig, AppState, Collaborators};
use std::sync::Arc;
use tempfile::TempDir;

pub const START_MS: i64 = 1_700_000_000_000;

pub struct OfflineTestContext {
    pub state: AppState,
    pub backend: Arc<dyn KeyValueBackend>,
    pub clock: Arc<ManualClock>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub backup_dir: TempDir,
}

/// バックアップと分析送信を切り、再試行待ちを短くした設定
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.sync.initial_retry_delay_ms = 1;
    config.sync.max_retry_delay_ms = 5;
    config.sync.jitter_ms = 0;
    config.sync.cycle_retry_limit = 0;
    config.backup.enabled = false;
    config.analytics.enabled = false;
    config
}

pub async fn setup_offline_state(
    config: AppConfig,
    delivery: Arc<dyn MessageDelivery>,
    remote: Option<Arc<dyn RemoteChangeSource>>,
) -> OfflineTestContext {
    let backend: Arc<dyn KeyValueBackend> = Arc::new(MemoryKeyValueBackend::new());
    setup_with_backend(config, backend, delivery, remote).await
}

pub async fn setup_with_backend(
    config: AppConfig,
    backend: Arc<dyn KeyValueBackend>,
    delivery: Arc<dyn MessageDelivery>,
    remote: Option<Arc<dyn RemoteChangeSource>>,
) -> OfflineTestContext {
    let backup_dir = tempfile::tempdir().expect("backup dir");
    let clock = Arc::new(ManualClock::new(START_MS));
    let connectivity = Arc::new(ConnectivityMonitor::new(Connectivity::offline()));

    let collaborators = Collaborators {
        backend: Arc::clone(&backend),
        delivery,
        remote,
        connectivity: Arc::clone(&connectivity),
        lease: Arc::new(ProcessLease::new()),
        backup_target: Arc::new(DirectoryBackupTarget::new(backup_dir.path())),
        analytics_sink: Arc::new(TracingAnalyticsSink),
        clock: clock.clone(),
    };

    let state = AppState::new(config, collaborators)
        .await
        .expect("app state");

    OfflineTestContext {
        state,
        backend,
        clock,
        connectivity,
        backup_dir,
    }
}
