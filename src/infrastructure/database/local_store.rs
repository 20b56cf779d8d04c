use super::rows::RecordRow;
use crate::domain::entities::{index_value, record_id, Collection};
use crate::shared::config::DatabaseConfig;
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Executor, Pool, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub type DbPool = Pool<Sqlite>;

/// Embedded store holding the cached business records and the sync queue.
/// Clones share the same connection pool.
#[derive(Clone)]
pub struct LocalStore {
    pool: DbPool,
}

impl LocalStore {
    /// Opens the database and applies pending schema migrations. Prefer
    /// [`LocalStoreProvider::open`](super::LocalStoreProvider::open), which
    /// memoizes the handle.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .busy_timeout(config.busy_timeout());

        let pool = if config.is_in_memory() {
            // The database lives only as long as its connection.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            ensure_parent_dir(&config.url)?;
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options.journal_mode(SqliteJournalMode::Wal))
                .await?
        };

        info!("Local store connected: {}", config.url);

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), AppError> {
        info!("Running local store migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Local store migrations completed");
        Ok(())
    }

    /// Raw pool, for maintenance queries outside the collection API.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Inserts or replaces a record by its `id`.
    pub async fn put(&self, collection: Collection, record: &Value) -> Result<(), AppError> {
        put_record(&self.pool, collection, record).await
    }

    /// Inserts or replaces every record in one transaction: either all of
    /// them become visible or none do.
    pub async fn put_many(&self, collection: Collection, records: &[Value]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            put_record(&mut *tx, collection, record).await?;
        }
        tx.commit().await?;
        debug!("Stored {} records in {}", records.len(), collection);
        Ok(())
    }

    pub async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>, AppError> {
        get_record(&self.pool, collection, id).await
    }

    /// All records in insertion order.
    pub async fn get_all(&self, collection: Collection) -> Result<Vec<Value>, AppError> {
        let sql = format!("SELECT id, data FROM {} ORDER BY seq ASC", collection.table());
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    /// Records whose indexed field equals `value`, in insertion order.
    pub async fn get_all_by_index(
        &self,
        collection: Collection,
        index_name: &str,
        value: &str,
    ) -> Result<Vec<Value>, AppError> {
        let index = collection.index(index_name).ok_or_else(|| {
            AppError::InvalidInput(format!("Unknown index {index_name} on {collection}"))
        })?;

        let sql = format!(
            "SELECT id, data FROM {} WHERE {} = ?1 ORDER BY seq ASC",
            collection.table(),
            index.column
        );
        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    /// Returns whether a record was removed.
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<bool, AppError> {
        delete_record(&self.pool, collection, id).await
    }

    /// Removes every record in the collection and returns how many there were.
    pub async fn clear(&self, collection: Collection) -> Result<u64, AppError> {
        let sql = format!("DELETE FROM {}", collection.table());
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self, collection: Collection) -> Result<u64, AppError> {
        let sql = format!("SELECT COUNT(*) FROM {}", collection.table());
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    /// Starts a transaction spanning any number of collections.
    pub async fn begin(&self) -> Result<StoreTransaction, AppError> {
        Ok(StoreTransaction {
            tx: self.pool.begin().await?,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Multi-collection write unit. Dropping it without `commit` rolls back.
pub struct StoreTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTransaction {
    pub async fn put(&mut self, collection: Collection, record: &Value) -> Result<(), AppError> {
        put_record(&mut *self.tx, collection, record).await
    }

    pub async fn get(&mut self, collection: Collection, id: &str) -> Result<Option<Value>, AppError> {
        get_record(&mut *self.tx, collection, id).await
    }

    pub async fn delete(&mut self, collection: Collection, id: &str) -> Result<bool, AppError> {
        delete_record(&mut *self.tx, collection, id).await
    }

    pub async fn commit(self) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}

async fn put_record<'e, E>(executor: E, collection: Collection, record: &Value) -> Result<(), AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = record_id(record).ok_or_else(|| {
        AppError::ValidationError(format!(
            "Records stored in {collection} must be JSON objects with an id"
        ))
    })?;
    let data = serde_json::to_string(record)?;

    let sql = upsert_sql(collection);
    let mut query = sqlx::query(&sql)
        .bind(id)
        .bind(data)
        .bind(Utc::now().timestamp());
    for index in collection.indexes() {
        query = query.bind(index_value(record, index.key_path));
    }
    query.execute(executor).await?;
    Ok(())
}

async fn get_record<'e, E>(
    executor: E,
    collection: Collection,
    id: &str,
) -> Result<Option<Value>, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT id, data FROM {} WHERE id = ?1", collection.table());
    let row = sqlx::query_as::<_, RecordRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(decode_row).transpose()
}

async fn delete_record<'e, E>(executor: E, collection: Collection, id: &str) -> Result<bool, AppError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("DELETE FROM {} WHERE id = ?1", collection.table());
    let result = sqlx::query(&sql).bind(id).execute(executor).await?;
    Ok(result.rows_affected() > 0)
}

/// Replacing a record keeps its `seq`, so insertion order survives updates.
fn upsert_sql(collection: Collection) -> String {
    let indexes = collection.indexes();
    let mut columns = String::from("id, data, updated_at");
    let mut placeholders = String::from("?1, ?2, ?3");
    let mut updates = String::from("data = excluded.data, updated_at = excluded.updated_at");

    for (offset, index) in indexes.iter().enumerate() {
        columns.push_str(&format!(", {}", index.column));
        placeholders.push_str(&format!(", ?{}", offset + 4));
        updates.push_str(&format!(", {col} = excluded.{col}", col = index.column));
    }

    format!(
        "INSERT INTO {table} ({columns}) VALUES ({placeholders}) \
         ON CONFLICT(id) DO UPDATE SET {updates}",
        table = collection.table()
    )
}

fn decode_row(row: &RecordRow) -> Result<Value, AppError> {
    serde_json::from_str(&row.data).map_err(|e| {
        AppError::SerializationError(format!("Corrupt record {}: {}", row.id, e))
    })
}

fn ensure_parent_dir(url: &str) -> Result<(), AppError> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn memory_store() -> LocalStore {
        LocalStore::connect(&DatabaseConfig::in_memory()).await.unwrap()
    }

    #[test]
    fn test_upsert_sql_lists_index_columns() {
        let sql = upsert_sql(Collection::Orders);
        assert!(sql.contains("(id, data, updated_at, location_id, status)"));
        assert!(sql.contains("VALUES (?1, ?2, ?3, ?4, ?5)"));
        assert!(sql.contains("status = excluded.status"));
    }

    #[tokio::test]
    async fn test_put_and_get_round_trip() {
        let store = memory_store().await;
        let order = json!({"id": "o1", "location_id": "loc-1", "status": "open", "total": 42.5});

        store.put(Collection::Orders, &order).await.unwrap();

        assert_eq!(store.get(Collection::Orders, "o1").await.unwrap(), Some(order));
        assert_eq!(store.get(Collection::Orders, "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_replaces_without_reordering() {
        let store = memory_store().await;
        store.put(Collection::Orders, &json!({"id": "a", "status": "open"})).await.unwrap();
        store.put(Collection::Orders, &json!({"id": "b", "status": "open"})).await.unwrap();
        store.put(Collection::Orders, &json!({"id": "a", "status": "paid"})).await.unwrap();

        let all = store.get_all(Collection::Orders).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(all[0]["status"], "paid");
        assert_eq!(store.count(Collection::Orders).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_put_rejects_records_without_id() {
        let store = memory_store().await;
        let err = store
            .put(Collection::MenuItems, &json!({"name": "Flat white"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_put_many_is_all_or_nothing() {
        let store = memory_store().await;
        let batch = vec![
            json!({"id": "m1", "location_id": "loc-1"}),
            json!({"location_id": "loc-1"}),
        ];

        assert!(store.put_many(Collection::MenuItems, &batch).await.is_err());
        assert_eq!(store.count(Collection::MenuItems).await.unwrap(), 0);

        let batch = vec![
            json!({"id": "m1", "location_id": "loc-1"}),
            json!({"id": "m2", "location_id": "loc-2"}),
        ];
        store.put_many(Collection::MenuItems, &batch).await.unwrap();
        assert_eq!(store.count(Collection::MenuItems).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_get_all_by_index() {
        let store = memory_store().await;
        store
            .put_many(
                Collection::OrderItems,
                &[
                    json!({"id": "li1", "order_id": "o1", "qty": 1}),
                    json!({"id": "li2", "order_id": "o2", "qty": 2}),
                    json!({"id": "li3", "order_id": "o1", "qty": 3}),
                ],
            )
            .await
            .unwrap();

        let items = store
            .get_all_by_index(Collection::OrderItems, "by_order", "o1")
            .await
            .unwrap();
        let ids: Vec<_> = items.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["li1", "li3"]);

        let err = store
            .get_all_by_index(Collection::OrderItems, "by_location", "loc-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_index_follows_replaced_value() {
        let store = memory_store().await;
        store.put(Collection::Orders, &json!({"id": "o1", "status": "open"})).await.unwrap();
        store.put(Collection::Orders, &json!({"id": "o1", "status": "paid"})).await.unwrap();

        let open = store.get_all_by_index(Collection::Orders, "by_status", "open").await.unwrap();
        let paid = store.get_all_by_index(Collection::Orders, "by_status", "paid").await.unwrap();
        assert!(open.is_empty());
        assert_eq!(paid.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = memory_store().await;
        store
            .put_many(Collection::MenuItems, &[json!({"id": "m1"}), json!({"id": "m2"})])
            .await
            .unwrap();

        assert!(store.delete(Collection::MenuItems, "m1").await.unwrap());
        assert!(!store.delete(Collection::MenuItems, "m1").await.unwrap());
        assert_eq!(store.clear(Collection::MenuItems).await.unwrap(), 1);
        assert!(store.get_all(Collection::MenuItems).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_spans_collections_and_rolls_back_on_drop() {
        let store = memory_store().await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.put(Collection::Orders, &json!({"id": "o1"})).await.unwrap();
            tx.put(Collection::OrderItems, &json!({"id": "li1", "order_id": "o1"}))
                .await
                .unwrap();
        }
        assert_eq!(store.count(Collection::Orders).await.unwrap(), 0);
        assert_eq!(store.count(Collection::OrderItems).await.unwrap(), 0);

        let mut tx = store.begin().await.unwrap();
        tx.put(Collection::Orders, &json!({"id": "o1"})).await.unwrap();
        tx.put(Collection::OrderItems, &json!({"id": "li1", "order_id": "o1"}))
            .await
            .unwrap();
        assert!(tx.get(Collection::Orders, "o1").await.unwrap().is_some());
        tx.commit().await.unwrap();

        assert_eq!(store.count(Collection::Orders).await.unwrap(), 1);
        assert_eq!(store.count(Collection::OrderItems).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_file_store_survives_reconnect() {
        let temp_dir = TempDir::new().unwrap();
        let config = DatabaseConfig::for_path(temp_dir.path().join("nested/pos.db"));

        let store = LocalStore::connect(&config).await.unwrap();
        store.put(Collection::Orders, &json!({"id": "o1", "total": 10})).await.unwrap();
        store.close().await;

        let reopened = LocalStore::connect(&config).await.unwrap();
        assert_eq!(
            reopened.get(Collection::Orders, "o1").await.unwrap(),
            Some(json!({"id": "o1", "total": 10}))
        );
        reopened.close().await;
    }
}
