//! In-memory storage backend for the inventory bulk engine.
//!
//! This crate provides an in-memory implementation of the `InventoryStorage`
//! trait from `inventory-storage`. Besides the records themselves it keeps a
//! log of every patch and every batch write, which tests use to observe what
//! a job persisted.
//!
//! # Example
//!
//! ```ignore
//! use inventory_db_memory::InMemoryStorage;
//! use inventory_storage::InventoryStorage;
//!
//! let storage = InMemoryStorage::new();
//! storage
//!     .create_many("Resource", vec![serde_json::json!({"id": "r1"})])
//!     .await?;
//! ```

mod storage;

pub use inventory_storage::{InventoryStorage, StorageError};
pub use storage::{BatchWrite, InMemoryStorage, StorageKey};
