use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Identifier of a sync queue entry. Unrelated to the id of the record the
/// entry mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueEntryId(Uuid);

impl QueueEntryId {
    /// Time-ordered (UUID v7) so ids sort roughly by enqueue time.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|e| format!("Invalid queue entry id: {e}"))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for QueueEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueEntryId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<QueueEntryId> for String {
    fn from(id: QueueEntryId) -> Self {
        id.0.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_and_parse_back() {
        let first = QueueEntryId::generate();
        let second = QueueEntryId::generate();
        assert_ne!(first, second);

        let parsed: QueueEntryId = first.to_string().parse().unwrap();
        assert_eq!(parsed, first);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(QueueEntryId::parse("not-a-uuid").is_err());
    }
}
