pub mod conflict_policy;
pub mod connectivity;
pub mod operation_id;
pub mod retry_backoff;
pub mod storage_options;
pub mod task_id;
pub mod task_status;

pub use conflict_policy::ConflictPolicy;
pub use connectivity::Connectivity;
pub use operation_id::OperationId;
pub use retry_backoff::RetryBackoff;
pub use storage_options::StorageOptions;
pub use task_id::TaskId;
pub use task_status::TaskStatus;
