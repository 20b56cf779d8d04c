use crate::application::ports::{RemoteDataStore, RemoteStoreError};
use crate::shared::config::RemoteConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Url};
use serde_json::Value;
use tracing::debug;

/// Remote store speaking the PostgREST dialect used by hosted
/// backend-as-a-service databases: `/rest/v1/{table}` with `id=eq.{id}`
/// row filters.
pub struct RestRemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestRemoteStore {
    pub fn new(config: &RemoteConfig) -> Result<Self, AppError> {
        let base_url = config.base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(AppError::ConfigurationError(
                "Remote base_url is not configured".to_string(),
            ));
        }
        Url::parse(base_url)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid remote base_url: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::ConfigurationError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, RemoteStoreError> {
        Url::parse(&format!("{}/rest/v1/{}", self.base_url, table))
            .map_err(|e| RemoteStoreError::InvalidPayload(format!("Bad table url: {e}")))
    }

    fn record_url(&self, table: &str, id: &str) -> Result<Url, RemoteStoreError> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Prefer", "return=minimal");
        match &self.api_key {
            Some(key) => builder.header("apikey", key).bearer_auth(key),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<(), RemoteStoreError> {
        let response = builder
            .send()
            .await
            .map_err(|e| RemoteStoreError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(RemoteStoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RemoteDataStore for RestRemoteStore {
    async fn insert(&self, table: &str, record: &Value) -> Result<(), RemoteStoreError> {
        debug!("POST {}", table);
        let url = self.table_url(table)?;
        self.execute(self.request(Method::POST, url).json(record))
            .await
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        changes: &Value,
    ) -> Result<(), RemoteStoreError> {
        debug!("PATCH {} id={}", table, id);
        let url = self.record_url(table, id)?;
        self.execute(self.request(Method::PATCH, url).json(changes))
            .await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteStoreError> {
        debug!("DELETE {} id={}", table, id);
        let url = self.record_url(table, id)?;
        self.execute(self.request(Method::DELETE, url)).await
    }
}
