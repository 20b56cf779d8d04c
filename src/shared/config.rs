use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    /// Seconds between background drains. 0 disables the periodic drain.
    pub sync_interval: u64,
    /// Failed replays allowed before an entry is dead-lettered. 0 retries forever.
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub request_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            busy_timeout_ms: 5_000,
        }
    }

    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            url: format!("sqlite://{}?mode=rwc", path.into().display()),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval: 300, // 5 minutes
            max_attempts: 10,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            request_timeout: 30,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

fn default_database_url() -> String {
    let base = dirs::data_local_dir()
        .map(|dir| dir.join("pos-offline-sync"))
        .unwrap_or_else(|| PathBuf::from("./data"));
    format!("sqlite://{}?mode=rwc", base.join("local.db").display())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("POS_SYNC_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Some(value) = env_u64("POS_SYNC_DATABASE_MAX_CONNECTIONS") {
            cfg.database.max_connections = value.clamp(1, u32::MAX as u64) as u32;
        }
        if let Some(value) = env_u64("POS_SYNC_DATABASE_BUSY_TIMEOUT_MS") {
            cfg.database.busy_timeout_ms = value;
        }

        if let Ok(v) = std::env::var("POS_SYNC_AUTO_SYNC") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(value) = env_u64("POS_SYNC_INTERVAL_SECS") {
            cfg.sync.sync_interval = value;
        }
        if let Some(value) = env_u64("POS_SYNC_MAX_ATTEMPTS") {
            cfg.sync.max_attempts = value.min(u32::MAX as u64) as u32;
        }

        if let Ok(v) = std::env::var("POS_SYNC_REMOTE_URL") {
            cfg.remote.base_url = v.trim().trim_end_matches('/').to_string();
        }
        if let Ok(v) = std::env::var("POS_SYNC_REMOTE_API_KEY") {
            let key = v.trim();
            cfg.remote.api_key = if key.is_empty() {
                None
            } else {
                Some(key.to_string())
            };
        }
        if let Some(value) = env_u64("POS_SYNC_REMOTE_TIMEOUT_SECS") {
            cfg.remote.request_timeout = value.max(1);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.trim().is_empty() {
            return Err("Database url must not be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if !self.remote.base_url.is_empty() {
            let url = reqwest::Url::parse(&self.remote.base_url)
                .map_err(|e| format!("Remote base_url is invalid: {e}"))?;
            if url.cannot_be_a_base() {
                return Err("Remote base_url must be an absolute http(s) url".to_string());
            }
        }
        if self.remote.request_timeout == 0 {
            return Err("Remote request_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
