//! Offline-first sync core for point-of-sale clients.
//!
//! Mutations are written to a local SQLite store and a durable FIFO queue,
//! then replayed against the remote store whenever the client is online.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::ports::{ConnectivitySource, RemoteDataStore, RemoteStoreError};
pub use application::services::{
    ConnectivityMonitor, FailureDisposition, ListenerHandle, SyncManager, SyncQueue,
};
pub use domain::entities::{
    Collection, DeadLetterEntry, DrainReport, LocalWrite, QueueEntry, SkipReason,
    SyncDiagnostics, SyncOutcome,
};
pub use domain::value_objects::{OperationType, QueueEntryId, TableName};
pub use infrastructure::connectivity::ConnectivitySignal;
pub use infrastructure::database::{LocalStore, LocalStoreProvider, StoreTransaction};
pub use infrastructure::remote::RestRemoteStore;
pub use shared::{AppConfig, AppError};
pub use state::SyncRuntime;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pos_offline_sync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
