pub mod analytics_sink;
pub mod backup_target;
pub mod cipher;
pub mod clock;
pub mod compression;
pub mod delivery;
pub mod execution_lease;
pub mod kv_backend;
pub mod reachability;
pub mod remote_changes;

pub use analytics_sink::AnalyticsSink;
pub use backup_target::BackupTarget;
pub use cipher::PayloadCipher;
pub use clock::Clock;
pub use compression::PayloadCompressor;
pub use delivery::MessageDelivery;
pub use execution_lease::BackgroundLease;
pub use kv_backend::KeyValueBackend;
pub use reachability::ReachabilityProbe;
pub use remote_changes::RemoteChangeSource;
