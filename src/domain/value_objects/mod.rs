pub mod operation_type;
pub mod queue_entry_id;
pub mod table_name;

pub use operation_type::OperationType;
pub use queue_entry_id::QueueEntryId;
pub use table_name::TableName;
