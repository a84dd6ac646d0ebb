pub mod message_cache;
pub mod ttl_cache;

pub use message_cache::{MESSAGE_CACHE_KEY, MessageCache};
pub use ttl_cache::{CacheEntry, TtlCache, TtlCacheSettings};
