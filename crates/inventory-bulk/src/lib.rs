//! # inventory-bulk
//!
//! Asynchronous bulk export and import for the resource inventory.
//!
//! A job arrives as a [`JobEvent`] naming a file URL and an API path. The
//! path is resolved to a resource type, then:
//!
//! - an **export** streams matching records from storage, strips internal
//!   fields, applies the `fields=` projection, writes one JSON array,
//!   compresses it according to the URL suffix (`.gz`, `.zip` or plain) and
//!   uploads it;
//! - an **import** downloads the file, decompresses it, parses the JSON array
//!   incrementally, normalizes each record with bounded concurrency and
//!   writes batches with `create_many`.
//!
//! Every job moves `Not Started → Running → Succeeded | Failed` exactly once
//! and its status is persisted through the same storage plugin.
//!
//! ## Example
//!
//! ```ignore
//! use inventory_bulk::{JobEvent, JobPlugins, JobRunner, loader};
//!
//! let config = loader::load_config(None)?;
//! let plugins = JobPlugins::from_config(storage, config)?;
//! let runner = JobRunner::new(plugins);
//! let record = runner.submit(event)?.await?;
//! println!("{}: {:?}", record.status, record.message);
//! ```

pub mod compression;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod job;
pub mod json_array;
pub mod normalizer;
pub mod observability;
pub mod queue;
pub mod resolver;
pub mod runner;
pub mod transport;

pub use compression::Encoding;
pub use config::{BulkConfig, PathMapping, loader};
pub use error::{ConfigError, JobError, NormalizeError, PipelineError, TransportError};
pub use export::ExportJob;
pub use import::ImportJob;
pub use job::{BulkJob, JobEvent, JobKind, JobPatch, JobPlugins, JobRecord, JobState, JobStatus};
pub use normalizer::{CommonAttributes, NormalizeContext, RecordNormalizer};
pub use queue::QueueEndpoint;
pub use resolver::{PathMappingResolver, ResourceTypeResolver};
pub use runner::JobRunner;
pub use transport::{DownloadBody, HttpTransport, Transport, UploadBody};
