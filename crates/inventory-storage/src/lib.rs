//! # inventory-storage
//!
//! Storage abstraction for the inventory bulk transfer engine.
//!
//! This crate defines the contract the bulk pipelines use to talk to the
//! persistence plugin. It contains no backend; see `inventory-db-memory` for
//! the in-memory one.
//!
//! ## Overview
//!
//! The main trait is [`InventoryStorage`]:
//! - `find_stream` yields matching records one at a time
//! - `create_many` writes a batch of records
//! - `patch` applies a partial update (used for job status)
//!
//! ## Example
//!
//! ```ignore
//! use futures_util::StreamExt;
//! use inventory_storage::{InventoryStorage, QueryDescriptor, StorageError};
//!
//! async fn count_resources(storage: &dyn InventoryStorage) -> Result<usize, StorageError> {
//!     let mut stream = storage.find_stream("Resource", &QueryDescriptor::default()).await?;
//!     let mut n = 0;
//!     while let Some(record) = stream.next().await {
//!         record?;
//!         n += 1;
//!     }
//!     Ok(n)
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StorageError};
pub use traits::InventoryStorage;
pub use types::{QueryDescriptor, QueryOptions, RecordStream};

/// Type alias for a shared storage trait object.
pub type DynStorage = std::sync::Arc<dyn InventoryStorage>;
