pub mod analytics_queue;
pub mod backup_service;
pub mod conflict;
pub mod durable_store;
pub mod message_history;
pub mod pending_queue;
pub mod storage_quota;
pub mod sync_service;

pub use analytics_queue::AnalyticsQueue;
pub use backup_service::BackupService;
pub use conflict::resolve_conflicts;
pub use durable_store::{DurableStore, DurableStoreSettings};
pub use message_history::MessageHistory;
pub use pending_queue::PendingQueue;
pub use storage_quota::StorageQuotaService;
pub use sync_service::{
    SYNC_STATS_KEY, SendOutcome, SkipReason, SyncEngine, SyncOutcome, SyncReport,
};
