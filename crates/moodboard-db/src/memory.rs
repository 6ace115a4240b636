//! In-process document store with the same query semantics as the SQLite
//! backend. Used by tests and local tooling.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::document::{
    ChangeEvent, ChangeKind, Direction, Document, DocumentStore, Filter, FilterOp, OrderBy,
    Query, ServerClock, apply_updates, check_object,
};
use crate::error::{StoreError, StoreResult};

type Collection = BTreeMap<String, Value>;

pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    changes: broadcast::Sender<ChangeEvent>,
    clock: ServerClock,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(1024);
        Self {
            collections: RwLock::new(HashMap::new()),
            changes,
            clock: ServerClock::new(),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&HashMap<String, Collection>) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self
            .collections
            .read()
            .map_err(|e| StoreError::Unavailable(format!("memory store lock poisoned: {e}")))?;
        f(&guard)
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Collection>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self
            .collections
            .write()
            .map_err(|e| StoreError::Unavailable(format!("memory store lock poisoned: {e}")))?;
        f(&mut guard)
    }

    fn publish(&self, kind: ChangeKind, collection: &str, id: &str, data: Option<Value>) {
        // No subscribers is fine
        let _ = self.changes.send(ChangeEvent {
            kind,
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.read(|cols| {
            Ok(cols.get(collection).and_then(|c| c.get(id)).map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
        })
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        check_object(&data)?;
        self.write(|cols| {
            let col = cols.entry(collection.to_string()).or_default();
            if col.contains_key(id) {
                return Err(StoreError::already_exists(collection, id));
            }
            col.insert(id.to_string(), data.clone());
            Ok(())
        })?;
        self.publish(ChangeKind::Created, collection, id, Some(data));
        Ok(())
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> StoreResult<()> {
        check_object(&data)?;
        let existed = self.write(|cols| {
            Ok(cols
                .entry(collection.to_string())
                .or_default()
                .insert(id.to_string(), data.clone())
                .is_some())
        })?;
        let kind = if existed { ChangeKind::Updated } else { ChangeKind::Created };
        self.publish(kind, collection, id, Some(data));
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<crate::document::FieldUpdate>,
    ) -> StoreResult<Document> {
        let data = self.write(|cols| {
            let current = cols
                .get_mut(collection)
                .and_then(|c| c.get_mut(id))
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            // Apply to a copy so a failing update leaves the document untouched
            let mut next = current.clone();
            apply_updates(&mut next, &updates)?;
            *current = next.clone();
            Ok(next)
        })?;
        self.publish(ChangeKind::Updated, collection, id, Some(data.clone()));
        Ok(Document {
            id: id.to_string(),
            data,
        })
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let removed = self.write(|cols| {
            Ok(cols
                .get_mut(collection)
                .and_then(|c| c.remove(id))
                .is_some())
        })?;
        if removed {
            self.publish(ChangeKind::Deleted, collection, id, None);
        }
        Ok(removed)
    }

    async fn query(&self, collection: &str, query: Query) -> StoreResult<Vec<Document>> {
        query.validate()?;
        self.read(|cols| {
            let Some(col) = cols.get(collection) else {
                return Ok(Vec::new());
            };

            let mut docs: Vec<Document> = col
                .iter()
                .filter(|(_, data)| query.filters.iter().all(|f| matches(data, f)))
                .filter(|(_, data)| match &query.order_by {
                    Some(order) => !data.get(&order.field).unwrap_or(&Value::Null).is_null(),
                    None => true,
                })
                .map(|(id, data)| Document {
                    id: id.clone(),
                    data: data.clone(),
                })
                .collect();

            docs.sort_by(|a, b| position(query.order_by.as_ref(), a, b));

            if let Some(cursor) = &query.start_after {
                let order = query.order_by.as_ref();
                docs.retain(|doc| {
                    compare_keys(order, sort_value(order, doc), &doc.id, &cursor.value, &cursor.id)
                        == Ordering::Greater
                });
            }

            if let Some(limit) = query.limit {
                docs.truncate(limit);
            }
            Ok(docs)
        })
    }

    async fn count(&self, collection: &str, filters: Vec<Filter>) -> StoreResult<u64> {
        let query = Query {
            filters,
            ..Query::default()
        };
        query.validate()?;
        self.read(|cols| {
            Ok(cols
                .get(collection)
                .map(|col| {
                    col.values()
                        .filter(|data| query.filters.iter().all(|f| matches(data, f)))
                        .count() as u64
                })
                .unwrap_or(0))
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    fn server_time(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Where `a` sits relative to `b` in result order.
fn position(order: Option<&OrderBy>, a: &Document, b: &Document) -> Ordering {
    compare_keys(order, sort_value(order, a), &a.id, sort_value(order, b), &b.id)
}

fn sort_value<'a>(order: Option<&OrderBy>, doc: &'a Document) -> &'a Value {
    order
        .and_then(|order| doc.field(&order.field))
        .unwrap_or(&Value::Null)
}

fn compare_keys(
    order: Option<&OrderBy>,
    a: &Value,
    a_id: &str,
    b: &Value,
    b_id: &str,
) -> Ordering {
    match order {
        Some(order) => {
            let by_field = compare_values(a, b)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a_id.cmp(b_id));
            match order.direction {
                Direction::Asc => by_field,
                Direction::Desc => by_field.reverse(),
            }
        }
        None => a_id.cmp(b_id),
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn matches(data: &Value, filter: &Filter) -> bool {
    let field = data.get(&filter.field).unwrap_or(&Value::Null);
    let cmp = || compare_values(field, &filter.value);
    match filter.op {
        FilterOp::Eq => field == &filter.value,
        FilterOp::Lt => !field.is_null() && cmp() == Some(Ordering::Less),
        FilterOp::Le => !field.is_null() && matches!(cmp(), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Gt => !field.is_null() && cmp() == Some(Ordering::Greater),
        FilterOp::Ge => {
            !field.is_null() && matches!(cmp(), Some(Ordering::Greater | Ordering::Equal))
        }
        FilterOp::In => filter
            .value
            .as_array()
            .is_some_and(|options| options.contains(field)),
        FilterOp::ArrayContains => field
            .as_array()
            .is_some_and(|items| items.contains(&filter.value)),
    }
}
