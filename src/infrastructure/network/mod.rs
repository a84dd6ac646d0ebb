pub mod connectivity_monitor;

pub use connectivity_monitor::ConnectivityMonitor;
