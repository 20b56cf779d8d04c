use crate::domain::entities::record::record_id;
use crate::domain::value_objects::{OperationType, QueueEntryId, TableName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A mutation waiting to be replayed against the remote store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub id: QueueEntryId,
    #[serde(rename = "type")]
    pub operation: OperationType,
    pub table: TableName,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueEntry {
    pub fn new(operation: OperationType, table: TableName, data: Value) -> Result<Self, String> {
        Self::validate(operation, &data)?;
        Ok(Self {
            id: QueueEntryId::generate(),
            operation,
            table,
            data,
            timestamp: Utc::now(),
            attempts: 0,
            last_error: None,
        })
    }

    fn validate(operation: OperationType, data: &Value) -> Result<(), String> {
        if !data.is_object() {
            return Err(format!(
                "{operation} payload must be a JSON object, got {}",
                type_name(data)
            ));
        }
        if operation.requires_record_id() && record_id(data).is_none() {
            return Err(format!("{operation} payload must contain the record id"));
        }
        Ok(())
    }

    /// Id of the business record this entry targets, if the payload has one.
    pub fn target_id(&self) -> Option<String> {
        record_id(&self.data)
    }

    /// Payload without the `id` field: the columns an update replaces.
    pub fn changes(&self) -> Value {
        match &self.data {
            Value::Object(map) => {
                let mut map = map.clone();
                map.remove("id");
                Value::Object(map)
            }
            other => other.clone(),
        }
    }

    /// Copy of the entry after one more failed replay.
    pub fn failed(&self, error: impl Into<String>) -> Self {
        Self {
            attempts: self.attempts.saturating_add(1),
            last_error: Some(error.into()),
            ..self.clone()
        }
    }

    pub fn to_record(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_record(record: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(record)
    }
}

/// Queue entry that exhausted its retry budget and was parked for an
/// operator to inspect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetterEntry {
    #[serde(flatten)]
    pub entry: QueueEntry,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(entry: QueueEntry) -> Self {
        let reason = entry
            .last_error
            .clone()
            .unwrap_or_else(|| "retry budget exhausted".to_string());
        Self {
            entry,
            dead_lettered_at: Utc::now(),
            reason,
        }
    }

    /// The original mutation, reset so it gets a fresh retry budget.
    pub fn into_requeued(self) -> QueueEntry {
        QueueEntry {
            attempts: 0,
            last_error: None,
            ..self.entry
        }
    }

    pub fn to_record(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_record(record: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(record)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orders() -> TableName {
        TableName::new("orders").unwrap()
    }

    #[test]
    fn test_new_entry_starts_with_zero_attempts() {
        let entry =
            QueueEntry::new(OperationType::Create, orders(), json!({"id": "o1", "total": 42.5}))
                .unwrap();
        assert_eq!(entry.attempts, 0);
        assert!(entry.last_error.is_none());
        assert_eq!(entry.target_id().as_deref(), Some("o1"));
    }

    #[test]
    fn test_update_and_delete_require_record_id() {
        assert!(QueueEntry::new(OperationType::Update, orders(), json!({"status": "paid"})).is_err());
        assert!(QueueEntry::new(OperationType::Delete, orders(), json!({})).is_err());
        assert!(QueueEntry::new(OperationType::Create, orders(), json!({"total": 1})).is_ok());
        assert!(QueueEntry::new(OperationType::Create, orders(), json!([1, 2])).is_err());
    }

    #[test]
    fn test_changes_strip_the_id() {
        let entry = QueueEntry::new(
            OperationType::Update,
            orders(),
            json!({"id": "o1", "status": "sent"}),
        )
        .unwrap();
        assert_eq!(entry.changes(), json!({"status": "sent"}));
    }

    #[test]
    fn test_record_layout_uses_type_and_table_keys() {
        let entry =
            QueueEntry::new(OperationType::Delete, orders(), json!({"id": "o9"})).unwrap();
        let record = entry.to_record().unwrap();
        assert_eq!(record["type"], "delete");
        assert_eq!(record["table"], "orders");
        assert_eq!(record["id"], entry.id.to_string());
        assert!(record.get("last_error").is_none());
        assert_eq!(QueueEntry::from_record(record).unwrap(), entry);
    }

    #[test]
    fn test_dead_letter_keeps_reason_and_requeue_resets_budget() {
        let entry = QueueEntry::new(OperationType::Update, orders(), json!({"id": "o1"}))
            .unwrap()
            .failed("foreign key violation");
        let dead = DeadLetterEntry::new(entry.clone());
        assert_eq!(dead.reason, "foreign key violation");

        let record = dead.to_record().unwrap();
        assert_eq!(record["type"], "update");
        assert_eq!(DeadLetterEntry::from_record(record).unwrap(), dead);

        let requeued = dead.into_requeued();
        assert_eq!(requeued.id, entry.id);
        assert_eq!(requeued.attempts, 0);
        assert!(requeued.last_error.is_none());
    }
}
