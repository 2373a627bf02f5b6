//! The storage collaborator contract.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::types::{QueryDescriptor, RecordStream};

/// The persistence plugin as seen by the bulk pipelines.
///
/// Implementations are shared across concurrently running jobs and must be
/// safe for concurrent use (`Send + Sync`). Callers do no locking of their
/// own.
///
/// # Example
///
/// ```ignore
/// use inventory_storage::{InventoryStorage, StorageError};
/// use serde_json::json;
///
/// async fn mark_running(storage: &dyn InventoryStorage, id: &str) -> Result<(), StorageError> {
///     storage.patch("ExportJob", id, &json!({"status": "Running"})).await
/// }
/// ```
#[async_trait]
pub trait InventoryStorage: Send + Sync {
    /// Opens a stream over the records of `resource_type` matching `query`.
    ///
    /// The stream yields records in storage order. Dropping it releases the
    /// underlying cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened. Failures while the
    /// stream is consumed surface as `Err` items.
    async fn find_stream(
        &self,
        resource_type: &str,
        query: &QueryDescriptor,
    ) -> Result<RecordStream, StorageError>;

    /// Writes a batch of records of `resource_type`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidRecord` if a record is not an object.
    async fn create_many(
        &self,
        resource_type: &str,
        records: Vec<Value>,
    ) -> Result<(), StorageError>;

    /// Merges the top-level keys of `update` into the record `id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    async fn patch(&self, resource_type: &str, id: &str, update: &Value)
    -> Result<(), StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test that InventoryStorage is object-safe
    fn _assert_storage_object_safe(_: &dyn InventoryStorage) {}
}
