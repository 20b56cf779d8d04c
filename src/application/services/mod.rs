pub mod connectivity_monitor;
pub mod sync_manager;
pub mod sync_queue;

pub use connectivity_monitor::{ConnectivityMonitor, ListenerHandle};
pub use sync_manager::SyncManager;
pub use sync_queue::{FailureDisposition, SyncQueue};
