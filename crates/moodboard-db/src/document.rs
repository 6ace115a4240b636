//! The document store contract shared by every backend.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{StoreError, StoreResult};

/// A stored document: its id plus a JSON object body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    /// Field equals any element of the (array) value.
    In,
    /// Field is an array holding the value.
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Where a page picks up: the order-by value and id of the last document
/// already seen. The document itself need not exist any more.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub value: Value,
    pub id: String,
}

impl Cursor {
    pub fn new(value: impl Into<Value>, id: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            id: id.into(),
        }
    }

    /// For unordered queries, which page by id alone.
    pub fn id(id: impl Into<String>) -> Self {
        Self::new(Value::Null, id)
    }

    /// Cursor just past `doc` in a query ordered by `field`.
    pub fn after(doc: &Document, field: &str) -> Self {
        Self::new(doc.field(field).cloned().unwrap_or(Value::Null), doc.id.clone())
    }
}

/// Collection query. Results are ordered by `order_by` (document id breaks
/// ties) or by id when unordered; `start_after` keeps only what sorts after
/// the cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub start_after: Option<Cursor>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::new(field, op, value));
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn start_after(mut self, cursor: Option<Cursor>) -> Self {
        self.start_after = cursor;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn validate(&self) -> StoreResult<()> {
        for filter in &self.filters {
            check_field(&filter.field)?;
            if filter.op == FilterOp::In && !filter.value.is_array() {
                return Err(StoreError::InvalidQuery(format!(
                    "`in` filter on {} needs an array value",
                    filter.field
                )));
            }
        }
        if let Some(order) = &self.order_by {
            check_field(&order.field)?;
            match &self.start_after {
                Some(cursor) if cursor.value.is_null() => {
                    return Err(StoreError::InvalidQuery(format!(
                        "cursor {} has no {} value",
                        cursor.id, order.field
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// A single field mutation applied by [`DocumentStore::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(String, Value),
    /// Atomic integer add; a missing field counts as zero.
    Increment(String, i64),
    ArrayUnion(String, Value),
    ArrayRemove(String, Value),
    Remove(String),
}

impl FieldUpdate {
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        Self::Set(field.to_string(), value.into())
    }

    pub fn increment(field: &str, by: i64) -> Self {
        Self::Increment(field.to_string(), by)
    }

    pub fn array_union(field: &str, value: impl Into<Value>) -> Self {
        Self::ArrayUnion(field.to_string(), value.into())
    }

    pub fn array_remove(field: &str, value: impl Into<Value>) -> Self {
        Self::ArrayRemove(field.to_string(), value.into())
    }

    fn field(&self) -> &str {
        match self {
            Self::Set(f, _)
            | Self::Increment(f, _)
            | Self::ArrayUnion(f, _)
            | Self::ArrayRemove(f, _)
            | Self::Remove(f) => f,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Emitted on the store's change feed after every successful write.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub collection: String,
    pub id: String,
    /// Document body after the write; `None` for deletions.
    pub data: Option<Value>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Insert a new document; fails with `AlreadyExists` if the id is taken.
    async fn create(&self, collection: &str, id: &str, data: Value) -> StoreResult<()>;

    /// Insert or replace.
    async fn set(&self, collection: &str, id: &str, data: Value) -> StoreResult<()>;

    /// Apply all updates atomically and return the resulting document.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<FieldUpdate>,
    ) -> StoreResult<Document>;

    /// Returns whether a document was removed.
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool>;

    async fn query(&self, collection: &str, query: Query) -> StoreResult<Vec<Document>>;

    async fn count(&self, collection: &str, filters: Vec<Filter>) -> StoreResult<u64>;

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;

    /// Server-assigned timestamp for new documents.
    fn server_time(&self) -> DateTime<Utc>;
}

/// Field names end up inside JSON paths, so only plain identifiers pass.
pub(crate) fn check_field(field: &str) -> StoreResult<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidQuery(format!("bad field name: {field:?}")))
    }
}

pub(crate) fn check_object(data: &Value) -> StoreResult<()> {
    if data.is_object() {
        Ok(())
    } else {
        Err(StoreError::InvalidQuery(
            "document body must be a JSON object".into(),
        ))
    }
}

/// Apply `updates` in order to a document body.
pub(crate) fn apply_updates(data: &mut Value, updates: &[FieldUpdate]) -> StoreResult<()> {
    let obj = data
        .as_object_mut()
        .ok_or_else(|| StoreError::InvalidQuery("document body must be a JSON object".into()))?;

    for update in updates {
        check_field(update.field())?;
        match update {
            FieldUpdate::Set(field, value) => {
                obj.insert(field.clone(), value.clone());
            }
            FieldUpdate::Increment(field, by) => {
                let current = match obj.get(field) {
                    None | Some(Value::Null) => 0,
                    Some(v) => v.as_i64().ok_or_else(|| {
                        StoreError::InvalidQuery(format!("{field} is not an integer"))
                    })?,
                };
                obj.insert(field.clone(), Value::from(current + by));
            }
            FieldUpdate::ArrayUnion(field, value) => {
                let entry = obj
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if entry.is_null() {
                    *entry = Value::Array(Vec::new());
                }
                let items = entry
                    .as_array_mut()
                    .ok_or_else(|| StoreError::InvalidQuery(format!("{field} is not an array")))?;
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
            FieldUpdate::ArrayRemove(field, value) => {
                if let Some(items) = obj.get_mut(field).and_then(Value::as_array_mut) {
                    items.retain(|item| item != value);
                }
            }
            FieldUpdate::Remove(field) => {
                obj.remove(field);
            }
        }
    }
    Ok(())
}

/// Hands out strictly increasing microsecond timestamps so documents written
/// back to back still order deterministically.
#[derive(Debug)]
pub struct ServerClock {
    last: Mutex<DateTime<Utc>>,
}

impl ServerClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now();
        let wall = DateTime::from_timestamp_micros(wall.timestamp_micros()).unwrap_or(wall);

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let next = if wall > *last {
            wall
        } else {
            *last + Duration::microseconds(1)
        };
        *last = next;
        next
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}
