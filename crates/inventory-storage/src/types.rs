//! Types shared between the storage contract and its callers.

use futures_util::stream::BoxStream;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;

/// A stream of records produced by [`InventoryStorage::find_stream`].
///
/// [`InventoryStorage::find_stream`]: crate::InventoryStorage::find_stream
pub type RecordStream = BoxStream<'static, Result<Value, StorageError>>;

/// A parsed list/read request.
///
/// Built once per request or job and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Equality criteria, in request order.
    #[serde(default)]
    pub criteria: IndexMap<String, String>,
    /// Window and projection options.
    #[serde(default)]
    pub options: QueryOptions,
    /// Optional JSONPath filter expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonpath: Option<String>,
}

/// Window and projection options of a [`QueryDescriptor`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Number of records to skip.
    #[serde(default)]
    pub skip: usize,
    /// Maximum number of records to return (0 means unbounded).
    #[serde(default)]
    pub limit: usize,
    /// Requested fields, each mapped to `1`.
    #[serde(default)]
    pub projection: IndexMap<String, u8>,
}

impl QueryDescriptor {
    /// Creates an empty descriptor (all records, full objects).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality criterion.
    #[must_use]
    pub fn with_criterion(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.criteria.insert(field.into(), value.into());
        self
    }

    /// Sets the skip/limit window.
    #[must_use]
    pub fn with_window(mut self, skip: usize, limit: usize) -> Self {
        self.options.skip = skip;
        self.options.limit = limit;
        self
    }

    /// Adds a projected field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.options.projection.insert(field.into(), 1);
        self
    }

    /// Sets the JSONPath filter.
    #[must_use]
    pub fn with_jsonpath(mut self, jsonpath: impl Into<String>) -> Self {
        self.jsonpath = Some(jsonpath.into());
        self
    }

    /// Returns the projected field names in request order.
    pub fn projected_fields(&self) -> impl Iterator<Item = &str> {
        self.options.projection.keys().map(String::as_str)
    }

    /// Returns `true` if `record` satisfies every equality criterion.
    ///
    /// String fields compare verbatim; other scalars compare by their JSON
    /// text, so `count=3` matches `{"count": 3}`.
    #[must_use]
    pub fn matches(&self, record: &Value) -> bool {
        self.criteria.iter().all(|(field, expected)| {
            match record.get(field) {
                Some(Value::String(s)) => s == expected,
                Some(Value::Null) | None => false,
                Some(other @ (Value::Bool(_) | Value::Number(_))) => {
                    other.to_string() == *expected
                }
                Some(_) => false,
            }
        })
    }
}
