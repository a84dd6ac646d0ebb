pub mod connection_pool;
pub mod memory_backend;
pub mod sqlite_backend;

pub use connection_pool::ConnectionPool;
pub use memory_backend::MemoryKeyValueBackend;
pub use sqlite_backend::SqliteKeyValueBackend;
