pub mod entities;
pub mod value_objects;

pub use entities::{ChangeRecord, ChatMessage, PendingOperation, ScheduledTask, SyncStats};
pub use value_objects::{ConflictPolicy, Connectivity, OperationId, StorageOptions, TaskId};
