//! SQLite-backed document store.
//!
//! Every document lives in one `documents` table keyed by (collection, id)
//! with its body as JSON text. Filters and ordering are translated to
//! `json_extract` expressions; field names are validated before they are
//! spliced into SQL.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::Database;
use crate::document::{
    ChangeEvent, ChangeKind, Direction, Document, DocumentStore, FieldUpdate, Filter, FilterOp,
    Query, ServerClock, apply_updates, check_object,
};
use crate::error::{StoreError, StoreResult};

pub struct SqliteStore {
    db: Arc<Database>,
    changes: broadcast::Sender<ChangeEvent>,
    clock: ServerClock,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        let (changes, _) = broadcast::channel(1024);
        Self {
            db: Arc::new(db),
            changes,
            clock: ServerClock::new(),
        }
    }

    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Run blocking DB work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| StoreError::Unavailable(format!("spawn_blocking join error: {}", e)))?
    }

    fn publish(&self, kind: ChangeKind, collection: &str, id: &str, data: Option<Value>) {
        let _ = self.changes.send(ChangeEvent {
            kind,
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        });
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.blocking(move |conn| {
            Ok(read_document(conn, &collection, &id)?.map(|data| Document { id, data }))
        })
        .await
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        check_object(&data)?;
        let (col, doc_id, body) = (collection.to_string(), id.to_string(), data.to_string());
        self.blocking(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO documents (collection, id, data) VALUES (?1, ?2, ?3)",
                rusqlite::params![col, doc_id, body],
            )?;
            if inserted == 0 {
                return Err(StoreError::already_exists(&col, &doc_id));
            }
            Ok(())
        })
        .await?;
        self.publish(ChangeKind::Created, collection, id, Some(data));
        Ok(())
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        check_object(&data)?;
        let (col, doc_id, body) = (collection.to_string(), id.to_string(), data.to_string());
        let existed = self
            .blocking(move |conn| {
                let tx = conn.unchecked_transaction()?;
                let existed = read_document(&tx, &col, &doc_id)?.is_some();
                tx.execute(
                    "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3)
                     ON CONFLICT(collection, id)
                     DO UPDATE SET data = excluded.data, updated_at = datetime('now')",
                    rusqlite::params![col, doc_id, body],
                )?;
                tx.commit()?;
                Ok(existed)
            })
            .await?;
        let kind = if existed { ChangeKind::Updated } else { ChangeKind::Created };
        self.publish(kind, collection, id, Some(data));
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> StoreResult<Document> {
        let (col, doc_id) = (collection.to_string(), id.to_string());
        let data = self
            .blocking(move |conn| {
                let tx = conn.unchecked_transaction()?;
                let mut data = read_document(&tx, &col, &doc_id)?
                    .ok_or_else(|| StoreError::not_found(&col, &doc_id))?;
                apply_updates(&mut data, &updates)?;
                tx.execute(
                    "UPDATE documents SET data = ?3, updated_at = datetime('now')
                     WHERE collection = ?1 AND id = ?2",
                    rusqlite::params![col, doc_id, data.to_string()],
                )?;
                tx.commit()?;
                Ok(data)
            })
            .await?;
        self.publish(ChangeKind::Updated, collection, id, Some(data.clone()));
        Ok(Document {
            id: id.to_string(),
            data,
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let (col, doc_id) = (collection.to_string(), id.to_string());
        let removed = self
            .blocking(move |conn| {
                let n = conn.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    rusqlite::params![col, doc_id],
                )?;
                Ok(n > 0)
            })
            .await?;
        if removed {
            self.publish(ChangeKind::Deleted, collection, id, None);
        }
        Ok(removed)
    }

    async fn query(&self, collection: &str, query: Query) -> StoreResult<Vec<Document>> {
        query.validate()?;
        let col = collection.to_string();
        self.blocking(move |conn| run_query(conn, &col, &query)).await
    }

    async fn count(&self, collection: &str, filters: Vec<Filter>) -> StoreResult<u64> {
        let query = Query {
            filters,
            ..Query::default()
        };
        query.validate()?;
        let col = collection.to_string();
        self.blocking(move |conn| {
            let mut sql = String::from("SELECT COUNT(*) FROM documents WHERE collection = ?");
            let mut params = vec![SqlValue::Text(col)];
            push_filters(&mut sql, &mut params, &query.filters)?;

            let n: i64 = conn.query_row(&sql, rusqlite::params_from_iter(params.iter()), |row| {
                row.get(0)
            })?;
            Ok(n as u64)
        })
        .await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    fn server_time(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

fn read_document(conn: &Connection, collection: &str, id: &str) -> StoreResult<Option<Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection, id],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|body| serde_json::from_str(&body).map_err(StoreError::from))
        .transpose()
}

fn run_query(conn: &Connection, collection: &str, query: &Query) -> StoreResult<Vec<Document>> {
    let mut sql = String::from("SELECT id, data FROM documents WHERE collection = ?");
    let mut params = vec![SqlValue::Text(collection.to_string())];
    push_filters(&mut sql, &mut params, &query.filters)?;

    match &query.order_by {
        Some(order) => {
            let expr = field_expr(&order.field);
            let cmp = match order.direction {
                Direction::Asc => ">",
                Direction::Desc => "<",
            };
            sql.push_str(&format!(" AND {expr} IS NOT NULL"));

            if let Some(cursor) = &query.start_after {
                let anchor = to_sql(&cursor.value)?;
                sql.push_str(&format!(
                    " AND ({expr} {cmp} ? OR ({expr} = ? AND id {cmp} ?))"
                ));
                params.push(anchor.clone());
                params.push(anchor);
                params.push(SqlValue::Text(cursor.id.clone()));
            }

            let dir = match order.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {expr} {dir}, id {dir}"));
        }
        None => {
            if let Some(cursor) = &query.start_after {
                sql.push_str(" AND id > ?");
                params.push(SqlValue::Text(cursor.id.clone()));
            }
            sql.push_str(" ORDER BY id ASC");
        }
    }

    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        params.push(SqlValue::Integer(limit as i64));
    }

    debug!(%sql, "document query");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, body)| -> StoreResult<Document> {
            Ok(Document {
                id,
                data: serde_json::from_str(&body)?,
            })
        })
        .collect()
}

fn push_filters(sql: &mut String, params: &mut Vec<SqlValue>, filters: &[Filter]) -> StoreResult<()> {
    for filter in filters {
        let expr = field_expr(&filter.field);
        match filter.op {
            FilterOp::Eq if filter.value.is_null() => {
                sql.push_str(&format!(" AND {expr} IS NULL"));
            }
            FilterOp::Eq | FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge => {
                let op = match filter.op {
                    FilterOp::Eq => "=",
                    FilterOp::Lt => "<",
                    FilterOp::Le => "<=",
                    FilterOp::Gt => ">",
                    _ => ">=",
                };
                sql.push_str(&format!(" AND {expr} {op} ?"));
                params.push(to_sql(&filter.value)?);
            }
            FilterOp::In => {
                let options = filter.value.as_array().map(Vec::as_slice).unwrap_or_default();
                if options.is_empty() {
                    sql.push_str(" AND 0");
                    continue;
                }
                let placeholders = vec!["?"; options.len()].join(", ");
                sql.push_str(&format!(" AND {expr} IN ({placeholders})"));
                for option in options {
                    params.push(to_sql(option)?);
                }
            }
            FilterOp::ArrayContains => {
                sql.push_str(&format!(
                    " AND EXISTS (SELECT 1 FROM json_each(documents.data, '$.{}') WHERE json_each.value = ?)",
                    filter.field
                ));
                params.push(to_sql(&filter.value)?);
            }
        }
    }
    Ok(())
}

fn field_expr(field: &str) -> String {
    format!("json_extract(data, '$.{field}')")
}

/// Scalar JSON to the SQL value `json_extract` would produce for it.
fn to_sql(value: &Value) -> StoreResult<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => {
            return Err(StoreError::InvalidQuery(
                "only scalar values can be compared".into(),
            ));
        }
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> StoreResult<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> StoreResult<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Cursor;
    use serde_json::json;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test]
    async fn round_trips_documents() {
        let store = store();
        store
            .create("users", "u1", json!({ "id": "u1", "handle": "alice" }))
            .await
            .unwrap();

        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(doc.data["handle"], "alice");
        assert!(store.get("users", "u2").await.unwrap().is_none());

        let err = store.create("users", "u1", json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn paginates_in_descending_order() {
        let store = store();
        for i in 1..=5 {
            let id = format!("p{i}");
            store
                .create(
                    "posts",
                    &id,
                    json!({ "id": id, "createdAt": format!("2026-01-01T00:00:0{i}.000000Z") }),
                )
                .await
                .unwrap();
        }

        let page = |cursor: Option<Cursor>| {
            Query::new()
                .order_by("createdAt", Direction::Desc)
                .start_after(cursor)
                .limit(2)
        };
        let first = store.query("posts", page(None)).await.unwrap();
        assert_eq!(ids(&first), ["p5", "p4"]);
        let second = store
            .query("posts", page(Some(Cursor::after(&first[1], "createdAt"))))
            .await
            .unwrap();
        assert_eq!(ids(&second), ["p3", "p2"]);

        // Deleting the anchor does not break the next page
        store.delete("posts", "p2").await.unwrap();
        let last = store
            .query("posts", page(Some(Cursor::after(&second[1], "createdAt"))))
            .await
            .unwrap();
        assert_eq!(ids(&last), ["p1"]);
    }

    #[tokio::test]
    async fn increments_atomically_and_filters_booleans() {
        let store = store();
        store
            .create("notifications", "n1", json!({ "receiverId": "b", "isRead": false }))
            .await
            .unwrap();
        store
            .create("notifications", "n2", json!({ "receiverId": "b", "isRead": true }))
            .await
            .unwrap();

        let unread = store
            .query(
                "notifications",
                Query::new().eq("receiverId", "b").eq("isRead", false),
            )
            .await
            .unwrap();
        assert_eq!(ids(&unread), ["n1"]);

        let doc = store
            .update("notifications", "n1", vec![FieldUpdate::increment("seen", 2)])
            .await
            .unwrap();
        assert_eq!(doc.data["seen"], 2);
    }

    #[tokio::test]
    async fn membership_and_range_filters() {
        let store = store();
        store
            .set("users", "a", json!({ "handle": "alice", "friends": ["b"] }))
            .await
            .unwrap();
        store
            .set("users", "b", json!({ "handle": "bob", "friends": ["a", "c"] }))
            .await
            .unwrap();

        let with_c = store
            .query("users", Query::new().filter("friends", FilterOp::ArrayContains, "c"))
            .await
            .unwrap();
        assert_eq!(ids(&with_c), ["b"]);

        let prefixed = store
            .query(
                "users",
                Query::new()
                    .filter("handle", FilterOp::Ge, "al")
                    .filter("handle", FilterOp::Le, "al\u{f8ff}"),
            )
            .await
            .unwrap();
        assert_eq!(ids(&prefixed), ["a"]);

        let picked = store
            .count("users", vec![Filter::new("handle", FilterOp::In, json!(["bob", "carol"]))])
            .await
            .unwrap();
        assert_eq!(picked, 1);
    }

    #[tokio::test]
    async fn rejects_injected_field_names() {
        let store = store();
        let err = store
            .query("users", Query::new().eq("handle') OR 1=1 --", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
    }
}
