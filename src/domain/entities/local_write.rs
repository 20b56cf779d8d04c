use crate::domain::entities::Collection;
use serde_json::Value;

/// Business-record write applied in the same local transaction as an
/// enqueue.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalWrite {
    Put { collection: Collection, record: Value },
    Delete { collection: Collection, id: String },
}

impl LocalWrite {
    pub fn put(collection: Collection, record: Value) -> Self {
        LocalWrite::Put { collection, record }
    }

    pub fn delete(collection: Collection, id: impl Into<String>) -> Self {
        LocalWrite::Delete {
            collection,
            id: id.into(),
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            LocalWrite::Put { collection, .. } | LocalWrite::Delete { collection, .. } => {
                *collection
            }
        }
    }
}
