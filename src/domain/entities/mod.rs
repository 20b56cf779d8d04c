pub mod collection;
pub mod local_write;
pub mod queue_entry;
pub mod record;
pub mod sync_report;

pub use collection::{Collection, IndexSpec};
pub use local_write::LocalWrite;
pub use queue_entry::{DeadLetterEntry, QueueEntry};
pub use record::{index_value, record_id};
pub use sync_report::{DrainReport, SkipReason, SyncDiagnostics, SyncOutcome};
