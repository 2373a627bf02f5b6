//! Error types for bulk jobs.
//!
//! Every stage failure is folded into [`PipelineError`]; the job boundary
//! turns it into a single `Failed` update. [`JobError`] covers lifecycle
//! violations and never reaches storage.

use inventory_query::QueryError;
use inventory_storage::StorageError;
use thiserror::Error;

use crate::job::JobStatus;

/// Failures of the HTTP collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned HTTP {status}")]
    Status {
        method: String,
        url: String,
        status: u16,
    },

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Unsupported upload method: {0}")]
    InvalidMethod(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{address} not reachable after {waited_ms} ms")]
    Unreachable { address: String, waited_ms: u64 },
}

/// Failures of a [`RecordNormalizer`](crate::normalizer::RecordNormalizer).
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Record is not a JSON object: {0}")]
    NotAnObject(String),

    #[error("Normalization failed: {0}")]
    Failed(String),
}

/// Any failure inside an import or export pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unable to identify resource type from path")]
    UnresolvedPath { path: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    InvalidQuery(#[from] QueryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }
}

/// Job lifecycle violations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("Invalid job status transition from {from} to {to}")]
    InvalidStatusTransition { from: JobStatus, to: JobStatus },

    #[error("Job {id} already finished with status {status}")]
    AlreadyTerminal { id: String, status: JobStatus },

    #[error("Unsupported job resource type: {0}")]
    UnsupportedKind(String),
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config load error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("HTTP transport setup failed: {0}")]
    Transport(#[from] TransportError),
}
