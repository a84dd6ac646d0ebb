pub mod analytics;
pub mod backup;
pub mod cache;
pub mod clock;
pub mod compression;
pub mod crypto;
pub mod jobs;
pub mod network;
pub mod storage;

pub use clock::{ManualClock, SystemClock};
