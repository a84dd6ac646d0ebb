pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use shared::config::AppConfig;
pub use shared::error::{AppError, Result};
pub use state::{AppState, Collaborators};

/// ログ設定の初期化。`RUST_LOG` があればそちらを優先する
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    // 二重初期化はエラーになるので無視する
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bolt_offline_lib=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
