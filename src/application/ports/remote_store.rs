use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteStoreError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Rejected by remote store ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Authoritative backend the queue is replayed against. Every error is
/// treated as retryable by the sync manager.
#[async_trait]
pub trait RemoteDataStore: Send + Sync {
    async fn insert(&self, table: &str, record: &Value) -> Result<(), RemoteStoreError>;

    /// Applies `changes` to the record identified by `id`.
    async fn update(&self, table: &str, id: &str, changes: &Value)
        -> Result<(), RemoteStoreError>;

    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteStoreError>;
}
