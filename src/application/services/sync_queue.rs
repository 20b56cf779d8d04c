use crate::domain::entities::{Collection, DeadLetterEntry, LocalWrite, QueueEntry};
use crate::domain::value_objects::{OperationType, QueueEntryId, TableName};
use crate::infrastructure::database::{LocalStore, StoreTransaction};
use crate::shared::error::AppError;
use serde_json::Value;
use tracing::{debug, warn};

/// What `record_failure` did with the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Still queued, to be retried on a later drain.
    Retained { attempts: u32 },
    /// Moved to the dead-letter collection.
    DeadLettered,
    /// The entry left the queue while it was being replayed.
    Missing,
}

/// Durable FIFO of pending mutations, stored in the `sync_queue` collection
/// of the local store.
#[derive(Clone)]
pub struct SyncQueue {
    store: LocalStore,
}

impl SyncQueue {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub async fn enqueue(
        &self,
        operation: OperationType,
        table: &str,
        data: Value,
    ) -> Result<QueueEntry, AppError> {
        let entry = build_entry(operation, table, data)?;
        self.store
            .put(Collection::SyncQueue, &entry.to_record()?)
            .await?;
        debug!("Queued {} on {} ({})", entry.operation, entry.table, entry.id);
        Ok(entry)
    }

    /// Applies `writes` to the business collections and queues the mutation
    /// in a single local transaction.
    pub async fn enqueue_with(
        &self,
        writes: &[LocalWrite],
        operation: OperationType,
        table: &str,
        data: Value,
    ) -> Result<QueueEntry, AppError> {
        let entry = build_entry(operation, table, data)?;
        for write in writes {
            if !write.collection().is_business() {
                return Err(AppError::InvalidInput(format!(
                    "Local writes cannot target {}",
                    write.collection()
                )));
            }
        }

        let mut tx = self.store.begin().await?;
        for write in writes {
            apply_write(&mut tx, write).await?;
        }
        tx.put(Collection::SyncQueue, &entry.to_record()?).await?;
        tx.commit().await?;

        debug!(
            "Queued {} on {} ({}) with {} local writes",
            entry.operation,
            entry.table,
            entry.id,
            writes.len()
        );
        Ok(entry)
    }

    /// Every queued entry, oldest first.
    pub async fn drain_candidates(&self) -> Result<Vec<QueueEntry>, AppError> {
        let records = self.store.get_all(Collection::SyncQueue).await?;
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            match QueueEntry::from_record(record) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping undecodable sync queue entry: {}", e),
            }
        }
        Ok(entries)
    }

    pub async fn remove(&self, id: &QueueEntryId) -> Result<bool, AppError> {
        self.store
            .delete(Collection::SyncQueue, &id.to_string())
            .await
    }

    /// Counts a failed replay against `entry`. Once `max_attempts` failures
    /// accumulate the entry is moved to the dead-letter collection in the
    /// same transaction. `max_attempts == 0` never dead-letters.
    pub async fn record_failure(
        &self,
        entry: &QueueEntry,
        error: &str,
        max_attempts: u32,
    ) -> Result<FailureDisposition, AppError> {
        let key = entry.id.to_string();
        let mut tx = self.store.begin().await?;

        let current = match tx.get(Collection::SyncQueue, &key).await? {
            Some(record) => QueueEntry::from_record(record)?,
            None => return Ok(FailureDisposition::Missing),
        };
        let failed = current.failed(error);

        let disposition = if max_attempts > 0 && failed.attempts >= max_attempts {
            let dead = DeadLetterEntry::new(failed);
            tx.delete(Collection::SyncQueue, &key).await?;
            tx.put(Collection::DeadLetters, &dead.to_record()?).await?;
            FailureDisposition::DeadLettered
        } else {
            tx.put(Collection::SyncQueue, &failed.to_record()?).await?;
            FailureDisposition::Retained {
                attempts: failed.attempts,
            }
        };

        tx.commit().await?;
        Ok(disposition)
    }

    pub async fn len(&self) -> Result<u64, AppError> {
        self.store.count(Collection::SyncQueue).await
    }

    pub async fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.len().await? == 0)
    }

    pub async fn clear(&self) -> Result<u64, AppError> {
        self.store.clear(Collection::SyncQueue).await
    }

    /// Queued entries targeting one remote table, oldest first.
    pub async fn entries_for_table(&self, table: &str) -> Result<Vec<QueueEntry>, AppError> {
        let records = self
            .store
            .get_all_by_index(Collection::SyncQueue, "by_table", table)
            .await?;
        records
            .into_iter()
            .map(|record| QueueEntry::from_record(record).map_err(AppError::from))
            .collect()
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetterEntry>, AppError> {
        let records = self.store.get_all(Collection::DeadLetters).await?;
        records
            .into_iter()
            .map(|record| DeadLetterEntry::from_record(record).map_err(AppError::from))
            .collect()
    }

    pub async fn dead_letter_count(&self) -> Result<u64, AppError> {
        self.store.count(Collection::DeadLetters).await
    }

    /// Moves a dead letter back to the tail of the queue with a fresh retry
    /// budget.
    pub async fn requeue_dead_letter(&self, id: &QueueEntryId) -> Result<QueueEntry, AppError> {
        let key = id.to_string();
        let mut tx = self.store.begin().await?;

        let record = tx
            .get(Collection::DeadLetters, &key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Dead letter {key}")))?;
        let entry = DeadLetterEntry::from_record(record)?.into_requeued();

        tx.delete(Collection::DeadLetters, &key).await?;
        tx.put(Collection::SyncQueue, &entry.to_record()?).await?;
        tx.commit().await?;

        debug!("Requeued dead letter {}", key);
        Ok(entry)
    }

    pub async fn discard_dead_letter(&self, id: &QueueEntryId) -> Result<bool, AppError> {
        self.store
            .delete(Collection::DeadLetters, &id.to_string())
            .await
    }
}

fn build_entry(operation: OperationType, table: &str, data: Value) -> Result<QueueEntry, AppError> {
    let table = TableName::new(table).map_err(AppError::ValidationError)?;
    QueueEntry::new(operation, table, data).map_err(AppError::ValidationError)
}

async fn apply_write(tx: &mut StoreTransaction, write: &LocalWrite) -> Result<(), AppError> {
    match write {
        LocalWrite::Put { collection, record } => tx.put(*collection, record).await,
        LocalWrite::Delete { collection, id } => tx.delete(*collection, id).await.map(|_| ()),
    }
}
