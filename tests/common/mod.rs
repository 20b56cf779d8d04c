#![allow(dead_code)]

pub mod mocks;

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pos_offline_sync::application::ports::{RemoteDataStore, RemoteStoreError};
use pos_offline_sync::shared::config::{AppConfig, DatabaseConfig};
use pos_offline_sync::{ConnectivitySignal, SyncManager, SyncRuntime};
use serde_json::Value;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Insert { table: String, record: Value },
    Update { table: String, id: String, changes: Value },
    Delete { table: String, id: String },
}

impl RemoteCall {
    pub fn record_id(&self) -> Option<String> {
        match self {
            RemoteCall::Insert { record, .. } => record
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string),
            RemoteCall::Update { id, .. } | RemoteCall::Delete { id, .. } => Some(id.clone()),
        }
    }
}

/// In-memory remote store that records every call. Calls for rejected ids
/// fail with a 500; a held remote parks calls until released.
pub struct RecordingRemote {
    calls: Mutex<Vec<RemoteCall>>,
    rejected_ids: Mutex<HashSet<String>>,
    first_call_delay: Mutex<Option<Duration>>,
    held: AtomicBool,
    gate: Semaphore,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            rejected_ids: Mutex::new(HashSet::new()),
            first_call_delay: Mutex::new(None),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub fn reject(&self, id: &str) {
        self.rejected_ids
            .lock()
            .expect("rejected lock")
            .insert(id.to_string());
    }

    pub fn accept(&self, id: &str) {
        self.rejected_ids.lock().expect("rejected lock").remove(id);
    }

    pub fn delay_first_call(&self, delay: Duration) {
        *self.first_call_delay.lock().expect("delay lock") = Some(delay);
    }

    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.add_permits(1024);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn handle(&self, call: RemoteCall) -> Result<(), RemoteStoreError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let id = call.record_id();
        self.calls.lock().expect("calls lock").push(call);

        let delay = self.first_call_delay.lock().expect("delay lock").take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.held.load(Ordering::SeqCst) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let rejected = id
            .map(|id| self.rejected_ids.lock().expect("rejected lock").contains(&id))
            .unwrap_or(false);
        if rejected {
            return Err(RemoteStoreError::Rejected {
                status: 500,
                message: "rejected by test remote".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteDataStore for RecordingRemote {
    async fn insert(&self, table: &str, record: &Value) -> Result<(), RemoteStoreError> {
        self.handle(RemoteCall::Insert {
            table: table.to_string(),
            record: record.clone(),
        })
        .await
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        changes: &Value,
    ) -> Result<(), RemoteStoreError> {
        self.handle(RemoteCall::Update {
            table: table.to_string(),
            id: id.to_string(),
            changes: changes.clone(),
        })
        .await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), RemoteStoreError> {
        self.handle(RemoteCall::Delete {
            table: table.to_string(),
            id: id.to_string(),
        })
        .await
    }
}

pub struct SyncTestContext {
    pub runtime: SyncRuntime,
    pub remote: Arc<RecordingRemote>,
    pub signal: Arc<ConnectivitySignal>,
}

impl SyncTestContext {
    pub fn manager(&self) -> &Arc<SyncManager> {
        &self.runtime.sync_manager
    }
}

pub fn test_config(database: DatabaseConfig, max_attempts: u32) -> AppConfig {
    let mut config = AppConfig {
        database,
        ..AppConfig::default()
    };
    config.sync.max_attempts = max_attempts;
    config.sync.auto_sync = false;
    config
}

pub async fn setup_sync(online: bool) -> SyncTestContext {
    setup_sync_with(DatabaseConfig::in_memory(), online, 10).await
}

pub async fn setup_sync_with(
    database: DatabaseConfig,
    online: bool,
    max_attempts: u32,
) -> SyncTestContext {
    pos_offline_sync::init_logging();
    let remote = RecordingRemote::new();
    let signal = Arc::new(ConnectivitySignal::new(online));
    let runtime = SyncRuntime::new(
        test_config(database, max_attempts),
        remote.clone(),
        Some(signal.clone()),
    )
    .await
    .expect("sync runtime");

    SyncTestContext {
        runtime,
        remote,
        signal,
    }
}

pub fn file_database(dir: &Path) -> DatabaseConfig {
    DatabaseConfig::for_path(dir.join("pos.db"))
}

/// Polls until the queue holds `expected` entries and no drain is running.
pub async fn wait_for_queue_len(manager: &SyncManager, expected: u64) {
    for _ in 0..300 {
        let pending = manager.queue().len().await.expect("queue len");
        if pending == expected && !manager.is_syncing() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queue never reached {expected} entries");
}

pub async fn wait_for_calls(remote: &RecordingRemote, expected: usize) {
    for _ in 0..300 {
        if remote.call_count() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("remote never received {expected} calls");
}

pub async fn wait_for_idle(manager: &SyncManager) {
    for _ in 0..300 {
        if !manager.is_syncing() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("sync never finished");
}

/// Lets spawned tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
