use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a `sync()` call returned without draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Offline,
    AlreadySyncing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SyncOutcome {
    Skipped { reason: SkipReason },
    Drained(DrainReport),
}

impl SyncOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        SyncOutcome::Skipped { reason }
    }

    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            SyncOutcome::Drained(report) => Some(report),
            SyncOutcome::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SyncOutcome::Skipped { .. })
    }
}

/// Summary of one drain pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Entries that were queued when the pass started.
    pub candidates: usize,
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Connectivity dropped mid-pass; the rest of the queue was left alone.
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DrainReport {
    pub fn start(candidates: usize) -> Self {
        let now = Utc::now();
        Self {
            candidates,
            attempted: 0,
            synced: 0,
            failed: 0,
            dead_lettered: 0,
            interrupted: false,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }
}

/// Operator-facing view of the sync subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncDiagnostics {
    pub is_online: bool,
    pub is_syncing: bool,
    pub pending_count: u64,
    pub dead_letter_count: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub total_synced: u64,
    pub total_failed: u64,
    pub sync_invocations: u64,
}
