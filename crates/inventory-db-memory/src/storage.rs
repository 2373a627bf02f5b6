use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use indexmap::IndexMap;
use inventory_storage::{InventoryStorage, QueryDescriptor, RecordStream, StorageError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

pub type StorageKey = String; // Format: "ResourceType/id"

pub(crate) fn make_storage_key(resource_type: &str, id: &str) -> StorageKey {
    format!("{resource_type}/{id}")
}

/// One observed `create_many` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWrite {
    pub resource_type: String,
    pub size: usize,
}

/// In-memory inventory storage.
///
/// Records are kept in insertion order so `find_stream` is deterministic.
/// Patches and batch writes are logged for inspection.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    /// Main storage, keyed by "ResourceType/id"
    data: RwLock<IndexMap<StorageKey, Value>>,
    /// Every patch applied, per record key, in application order
    patch_log: RwLock<HashMap<StorageKey, Vec<Value>>>,
    /// Every `create_many` call, in call order
    batch_log: RwLock<Vec<BatchWrite>>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a single record.
    pub async fn insert(&self, resource_type: &str, record: Value) -> Result<String, StorageError> {
        let mut record = into_object(record)?;
        let id = ensure_id(&mut record);
        let key = make_storage_key(resource_type, &id);
        self.data.write().await.insert(key, Value::Object(record));
        Ok(id)
    }

    /// Returns a copy of the record, if present.
    pub async fn get(&self, resource_type: &str, id: &str) -> Option<Value> {
        let key = make_storage_key(resource_type, id);
        self.data.read().await.get(&key).cloned()
    }

    /// Returns every record of `resource_type` in insertion order.
    pub async fn records(&self, resource_type: &str) -> Vec<Value> {
        let prefix = format!("{resource_type}/");
        self.data
            .read()
            .await
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub async fn count_by_type(&self, resource_type: &str) -> usize {
        let prefix = format!("{resource_type}/");
        self.data
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .count()
    }

    /// Returns the patches applied to a record, oldest first.
    pub async fn patches(&self, resource_type: &str, id: &str) -> Vec<Value> {
        let key = make_storage_key(resource_type, id);
        self.patch_log
            .read()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns every `create_many` call observed so far.
    pub async fn batch_writes(&self) -> Vec<BatchWrite> {
        self.batch_log.read().await.clone()
    }
}

#[async_trait]
impl InventoryStorage for InMemoryStorage {
    async fn find_stream(
        &self,
        resource_type: &str,
        query: &QueryDescriptor,
    ) -> Result<RecordStream, StorageError> {
        let prefix = format!("{resource_type}/");
        let limit = match query.options.limit {
            0 => usize::MAX,
            n => n,
        };

        // Snapshot under the read lock; the stream itself holds no lock.
        let matched: Vec<Value> = self
            .data
            .read()
            .await
            .iter()
            .filter(|(key, record)| key.starts_with(&prefix) && query.matches(record))
            .skip(query.options.skip)
            .take(limit)
            .map(|(_, record)| project(record, query))
            .collect();

        tracing::debug!(
            resource_type,
            matched = matched.len(),
            "Opened in-memory record stream"
        );

        Ok(stream::iter(matched.into_iter().map(Ok)).boxed())
    }

    async fn create_many(
        &self,
        resource_type: &str,
        records: Vec<Value>,
    ) -> Result<(), StorageError> {
        let size = records.len();
        let mut prepared = Vec::with_capacity(size);
        for record in records {
            let mut record = into_object(record)?;
            let id = ensure_id(&mut record);
            prepared.push((make_storage_key(resource_type, &id), Value::Object(record)));
        }

        {
            let mut data = self.data.write().await;
            for (key, record) in prepared {
                data.insert(key, record);
            }
        }

        self.batch_log.write().await.push(BatchWrite {
            resource_type: resource_type.to_string(),
            size,
        });
        Ok(())
    }

    async fn patch(
        &self,
        resource_type: &str,
        id: &str,
        update: &Value,
    ) -> Result<(), StorageError> {
        let fields = update
            .as_object()
            .ok_or_else(|| StorageError::invalid_record("patch must be a JSON object"))?;
        let key = make_storage_key(resource_type, id);

        {
            let mut data = self.data.write().await;
            let record = data
                .get_mut(&key)
                .and_then(Value::as_object_mut)
                .ok_or_else(|| StorageError::not_found(resource_type, id))?;
            for (field, value) in fields {
                record.insert(field.clone(), value.clone());
            }
        }

        self.patch_log
            .write()
            .await
            .entry(key)
            .or_default()
            .push(update.clone());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

fn into_object(record: Value) -> Result<Map<String, Value>, StorageError> {
    match record {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::invalid_record(format!(
            "expected a JSON object, got {}",
            type_name(&other)
        ))),
    }
}

fn ensure_id(record: &mut Map<String, Value>) -> String {
    match record.get("id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            record.insert("id".to_string(), Value::String(id.clone()));
            id
        }
    }
}

/// Applies the storage-level projection. Like a document store, internal
/// (`_`-prefixed) keys survive the projection.
fn project(record: &Value, query: &QueryDescriptor) -> Value {
    if query.options.projection.is_empty() {
        return record.clone();
    }
    match record {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| {
                    key.starts_with('_') || query.options.projection.contains_key(key.as_str())
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
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
