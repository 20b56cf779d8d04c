use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;

use pos_offline_sync::application::ports::{RemoteDataStore, RemoteStoreError};

mock! {
    pub RemoteStorePort {}

    #[async_trait]
    impl RemoteDataStore for RemoteStorePort {
        async fn insert(&self, table: &str, record: &Value) -> Result<(), RemoteStoreError>;
        async fn update(
            &self,
            table: &str,
            id: &str,
            changes: &Value,
        ) -> Result<(), RemoteStoreError>;
        async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteStoreError>;
    }
}

pub type MockRemoteStore = MockRemoteStorePort;
