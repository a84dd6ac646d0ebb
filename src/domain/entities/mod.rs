pub mod analytics_event;
pub mod backup;
pub mod change_record;
pub mod chat_message;
pub mod pending_operation;
pub mod scheduled_task;
pub mod storage_stats;
pub mod sync_stats;

pub use analytics_event::AnalyticsEvent;
pub use backup::{
    BACKUP_FILE_EXTENSION, BACKUP_FILE_PREFIX, BackupDescriptor, BackupOutcome, BackupSnapshot,
};
pub use change_record::{ChangeRecord, ConflictResolution, TransferStats};
pub use chat_message::{ChatMessage, StoredAttachment};
pub use pending_operation::{PendingOperation, QueueSummary};
pub use scheduled_task::ScheduledTask;
pub use storage_stats::{CleanupReport, QuotaReport, StorageStats};
pub use sync_stats::SyncStats;
