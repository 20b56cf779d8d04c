use super::connectivity_monitor::{ConnectivityMonitor, ListenerHandle};
use super::sync_queue::{FailureDisposition, SyncQueue};
use crate::application::ports::{RemoteDataStore, RemoteStoreError};
use crate::domain::entities::{
    DeadLetterEntry, DrainReport, LocalWrite, QueueEntry, SkipReason, SyncDiagnostics,
    SyncOutcome,
};
use crate::domain::value_objects::{OperationType, QueueEntryId};
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct SyncStats {
    last_sync: Option<DateTime<Utc>>,
    last_error: Option<String>,
    total_synced: u64,
    total_failed: u64,
}

/// Replays the sync queue against the remote store whenever the client is
/// online. At most one drain runs at a time.
pub struct SyncManager {
    queue: SyncQueue,
    remote: Arc<dyn RemoteDataStore>,
    monitor: Arc<ConnectivityMonitor>,
    max_attempts: u32,
    syncing: AtomicBool,
    invocations: AtomicU64,
    stats: RwLock<SyncStats>,
}

impl SyncManager {
    /// Builds the manager and hooks it to the monitor so that every
    /// offline to online transition starts one drain.
    pub fn new(
        queue: SyncQueue,
        remote: Arc<dyn RemoteDataStore>,
        monitor: Arc<ConnectivityMonitor>,
        config: &SyncConfig,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            queue,
            remote,
            monitor,
            max_attempts: config.max_attempts,
            syncing: AtomicBool::new(false),
            invocations: AtomicU64::new(0),
            stats: RwLock::new(SyncStats::default()),
        });

        let weak = Arc::downgrade(&manager);
        manager.monitor.set_reconnect_hook(move || {
            if let Some(manager) = weak.upgrade() {
                info!("Back online, draining sync queue");
                manager.trigger_sync();
            }
        });

        manager
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Durably queues a mutation. When online a drain is started in the
    /// background; the returned entry is queued, not necessarily synced.
    pub async fn queue_operation(
        self: &Arc<Self>,
        operation: OperationType,
        table: &str,
        data: Value,
    ) -> Result<QueueEntry, AppError> {
        let entry = self.queue.enqueue(operation, table, data).await?;
        self.trigger_if_online();
        Ok(entry)
    }

    /// Like [`queue_operation`](Self::queue_operation), with `writes` applied
    /// to the local collections in the same transaction as the enqueue.
    pub async fn commit_mutation(
        self: &Arc<Self>,
        writes: &[LocalWrite],
        operation: OperationType,
        table: &str,
        data: Value,
    ) -> Result<QueueEntry, AppError> {
        let entry = self
            .queue
            .enqueue_with(writes, operation, table, data)
            .await?;
        self.trigger_if_online();
        Ok(entry)
    }

    /// Starts a drain on a background task and logs its result.
    pub fn trigger_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            match manager.sync().await {
                Ok(SyncOutcome::Drained(report)) if report.failed > 0 => {
                    warn!(
                        "Sync pass finished with {} of {} entries failing",
                        report.failed, report.attempted
                    );
                }
                Ok(outcome) => debug!("Sync finished: {:?}", outcome),
                Err(e) => error!("Sync error: {}", e),
            }
        })
    }

    fn trigger_if_online(self: &Arc<Self>) {
        if self.monitor.get_status() {
            self.trigger_sync();
        } else {
            debug!("Offline, mutation stays queued");
        }
    }

    /// Drains the queue in FIFO order. Returns immediately when offline or
    /// when another drain is in progress; neither case is an error.
    pub async fn sync(&self) -> Result<SyncOutcome, AppError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        if !self.monitor.get_status() {
            debug!("Skipping sync: offline");
            return Ok(SyncOutcome::skipped(SkipReason::Offline));
        }

        let Some(_guard) = DrainGuard::acquire(&self.syncing) else {
            debug!("Skipping sync: already syncing");
            return Ok(SyncOutcome::skipped(SkipReason::AlreadySyncing));
        };

        let result = self.drain().await;

        let mut stats = self.stats.write().await;
        match &result {
            Ok((report, last_error)) => {
                stats.last_sync = Some(report.finished_at);
                stats.last_error = last_error.clone();
                stats.total_synced += report.synced as u64;
                stats.total_failed += report.failed as u64;
            }
            Err(e) => stats.last_error = Some(e.to_string()),
        }

        result.map(|(report, _)| SyncOutcome::Drained(report))
    }

    async fn drain(&self) -> Result<(DrainReport, Option<String>), AppError> {
        let entries = self.queue.drain_candidates().await?;
        let mut report = DrainReport::start(entries.len());
        let mut last_error = None;

        for entry in entries {
            if !self.monitor.get_status() {
                info!(
                    "Went offline mid-sync, {} entries left for the next pass",
                    report.candidates - report.attempted
                );
                report.interrupted = true;
                break;
            }

            report.attempted += 1;
            match self.replay(&entry).await {
                Ok(()) => match self.queue.remove(&entry.id).await {
                    Ok(_) => {
                        report.synced += 1;
                        debug!("Synced {} on {} ({})", entry.operation, entry.table, entry.id);
                    }
                    Err(e) => {
                        // Replayed remotely but still queued: it will be sent again.
                        error!("Synced {} but could not dequeue it: {}", entry.id, e);
                        report.failed += 1;
                        last_error = Some(e.to_string());
                    }
                },
                Err(e) => {
                    let message = e.to_string();
                    warn!(
                        "Failed to sync {} on {} ({}): {}",
                        entry.operation, entry.table, entry.id, message
                    );
                    report.failed += 1;

                    match self
                        .queue
                        .record_failure(&entry, &message, self.max_attempts)
                        .await
                    {
                        Ok(FailureDisposition::DeadLettered) => {
                            warn!(
                                "Dead-lettered {} after {} attempts",
                                entry.id, self.max_attempts
                            );
                            report.dead_lettered += 1;
                        }
                        Ok(_) => {}
                        Err(e) => error!("Could not record failure of {}: {}", entry.id, e),
                    }
                    last_error = Some(message);
                }
            }
        }

        Ok((report.finish(), last_error))
    }

    async fn replay(&self, entry: &QueueEntry) -> Result<(), RemoteStoreError> {
        let table = entry.table.as_str();
        match entry.operation {
            OperationType::Create => self.remote.insert(table, &entry.data).await,
            OperationType::Update => {
                let id = target_id(entry)?;
                self.remote.update(table, &id, &entry.changes()).await
            }
            OperationType::Delete => {
                let id = target_id(entry)?;
                self.remote.delete(table, &id).await
            }
        }
    }

    pub fn get_status(&self) -> bool {
        self.monitor.get_status()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    pub fn on_status_change<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.monitor.on_status_change(listener)
    }

    pub async fn diagnostics(&self) -> Result<SyncDiagnostics, AppError> {
        let pending_count = self.queue.len().await?;
        let dead_letter_count = self.queue.dead_letter_count().await?;
        let stats = self.stats.read().await;

        Ok(SyncDiagnostics {
            is_online: self.get_status(),
            is_syncing: self.is_syncing(),
            pending_count,
            dead_letter_count,
            last_sync: stats.last_sync,
            last_error: stats.last_error.clone(),
            total_synced: stats.total_synced,
            total_failed: stats.total_failed,
            sync_invocations: self.invocations.load(Ordering::SeqCst),
        })
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetterEntry>, AppError> {
        self.queue.dead_letters().await
    }

    /// Puts a dead letter back on the queue and starts a drain when online.
    pub async fn requeue_dead_letter(
        self: &Arc<Self>,
        id: &QueueEntryId,
    ) -> Result<QueueEntry, AppError> {
        let entry = self.queue.requeue_dead_letter(id).await?;
        self.trigger_if_online();
        Ok(entry)
    }

    pub async fn discard_dead_letter(&self, id: &QueueEntryId) -> Result<bool, AppError> {
        let removed = self.queue.discard_dead_letter(id).await?;
        if removed {
            info!("Discarded dead letter {}", id);
        }
        Ok(removed)
    }

    /// Runs `sync()` every `interval`, starting one interval from now. Picks
    /// up entries queued while a drain was already running. The task ends
    /// once the manager is dropped. A zero interval schedules nothing.
    pub fn schedule_sync(self: &Arc<Self>, interval: Duration) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            warn!("Ignoring periodic sync with a zero interval");
            return None;
        }

        info!("Scheduling sync every {:?}", interval);
        let weak = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let Some(manager) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = manager.sync().await {
                    error!("Scheduled sync error: {}", e);
                }
            }
        }))
    }
}

fn target_id(entry: &QueueEntry) -> Result<String, RemoteStoreError> {
    entry.target_id().ok_or_else(|| {
        RemoteStoreError::InvalidPayload(format!(
            "{} entry {} has no record id",
            entry.operation, entry.id
        ))
    })
}

/// Holds the drain flag for one pass. Released on drop, so an error, a
/// panic or a cancelled future cannot leave the flag stuck.
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
