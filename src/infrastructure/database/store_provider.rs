use super::LocalStore;
use crate::shared::config::DatabaseConfig;
use crate::shared::error::AppError;
use tokio::sync::OnceCell;

/// Owns the one `LocalStore` of a running client. The first `open` connects
/// and migrates; later and concurrent calls get the same handle.
pub struct LocalStoreProvider {
    config: DatabaseConfig,
    handle: OnceCell<LocalStore>,
}

impl LocalStoreProvider {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            handle: OnceCell::new(),
        }
    }

    pub async fn open(&self) -> Result<&LocalStore, AppError> {
        self.handle
            .get_or_try_init(|| LocalStore::connect(&self.config))
            .await
    }

    /// The handle, if `open` already succeeded.
    pub fn get(&self) -> Option<&LocalStore> {
        self.handle.get()
    }
}
