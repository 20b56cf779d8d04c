use serde_json::Value;

/// Primary key of a JSON record: a non-empty string or an integer `id`.
pub fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Value stored in a secondary index column for `key_path`. Only scalars are
/// indexed.
pub fn index_value(record: &Value, key_path: &str) -> Option<String> {
    match record.get(key_path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_accepts_strings_and_integers() {
        assert_eq!(record_id(&json!({"id": "o1"})), Some("o1".to_string()));
        assert_eq!(record_id(&json!({"id": 17})), Some("17".to_string()));
        assert_eq!(record_id(&json!({"id": ""})), None);
        assert_eq!(record_id(&json!({"id": 1.5})), None);
        assert_eq!(record_id(&json!({"total": 3})), None);
        assert_eq!(record_id(&json!("o1")), None);
    }

    #[test]
    fn test_index_value_only_uses_scalars() {
        let record = json!({"status": "open", "table_no": 4, "tags": ["a"], "note": null});
        assert_eq!(index_value(&record, "status"), Some("open".to_string()));
        assert_eq!(index_value(&record, "table_no"), Some("4".to_string()));
        assert_eq!(index_value(&record, "tags"), None);
        assert_eq!(index_value(&record, "note"), None);
        assert_eq!(index_value(&record, "missing"), None);
    }
}
