use crate::application::ports::{ConnectivitySource, RemoteDataStore};
use crate::application::services::{ConnectivityMonitor, SyncManager, SyncQueue};
use crate::infrastructure::database::{LocalStore, LocalStoreProvider};
use crate::infrastructure::remote::RestRemoteStore;
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Wires the store, queue, monitor and manager of one client.
pub struct SyncRuntime {
    pub config: AppConfig,
    pub store_provider: Arc<LocalStoreProvider>,
    pub store: LocalStore,
    pub monitor: Arc<ConnectivityMonitor>,
    pub sync_manager: Arc<SyncManager>,
}

impl SyncRuntime {
    pub async fn new(
        config: AppConfig,
        remote: Arc<dyn RemoteDataStore>,
        connectivity: Option<Arc<dyn ConnectivitySource>>,
    ) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;

        let store_provider = Arc::new(LocalStoreProvider::new(config.database.clone()));
        let store = store_provider.open().await?.clone();

        let monitor = ConnectivityMonitor::start(connectivity);
        let sync_manager = SyncManager::new(
            SyncQueue::new(store.clone()),
            remote,
            Arc::clone(&monitor),
            &config.sync,
        );

        info!("Sync runtime initialized");

        Ok(Self {
            config,
            store_provider,
            store,
            monitor,
            sync_manager,
        })
    }

    /// Uses the REST adapter configured in `config.remote`.
    pub async fn from_config(
        config: AppConfig,
        connectivity: Option<Arc<dyn ConnectivitySource>>,
    ) -> Result<Self, AppError> {
        let remote = Arc::new(RestRemoteStore::new(&config.remote)?);
        Self::new(config, remote, connectivity).await
    }

    /// Drains whatever a previous session left behind and, when auto sync
    /// is on, starts the periodic drain.
    pub fn start_background_sync(&self) -> Option<JoinHandle<()>> {
        if self.monitor.get_status() {
            self.sync_manager.trigger_sync();
        }

        let sync = &self.config.sync;
        if !sync.auto_sync {
            return None;
        }

        self.sync_manager
            .schedule_sync(Duration::from_secs(sync.sync_interval))
    }

    pub async fn shutdown(&self) {
        self.store.close().await;
        info!("Sync runtime shut down");
    }
}
