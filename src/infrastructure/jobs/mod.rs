pub mod analytics_flush_job;
pub mod backup_job;
pub mod process_lease;
pub mod scheduler;
pub mod storage_jobs;
pub mod sync_job;

pub use analytics_flush_job::AnalyticsFlushJob;
pub use backup_job::BackupJob;
pub use process_lease::ProcessLease;
pub use scheduler::{BackgroundScheduler, FnTaskHandler, RunOutcome, TaskHandler, TaskRegistration};
pub use storage_jobs::{CleanupJob, QuotaCheckJob};
pub use sync_job::SyncJob;

pub const SYNC_TASK_ID: &str = "sync";
pub const QUOTA_CHECK_TASK_ID: &str = "storage_quota_check";
pub const CLEANUP_TASK_ID: &str = "storage_cleanup";
pub const BACKUP_TASK_ID: &str = "auto_backup";
pub const ANALYTICS_FLUSH_TASK_ID: &str = "analytics_flush";
