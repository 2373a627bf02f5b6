//! Bulk job lifecycle.
//!
//! A job moves `Not Started → Running → Succeeded | Failed` exactly once.
//! [`JobState`] owns the record, checks every transition and persists it as
//! a partial update; once a terminal status is reached further updates are
//! refused locally and never hit storage.

use std::fmt;
use std::sync::Arc;

use inventory_storage::DynStorage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::config::BulkConfig;
use crate::error::{ConfigError, JobError, PipelineError};
use crate::export::ExportJob;
use crate::import::ImportJob;
use crate::normalizer::{CommonAttributes, RecordNormalizer};
use crate::resolver::{PathMappingResolver, ResourceTypeResolver};
use crate::transport::{HttpTransport, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "Not Started")]
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotStarted => "Not Started",
            JobStatus::Running => "Running",
            JobStatus::Succeeded => "Succeeded",
            JobStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::NotStarted, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobKind {
    #[serde(rename = "ExportJob")]
    Export,
    #[serde(rename = "ImportJob")]
    Import,
}

impl JobKind {
    pub fn resource_type(&self) -> &'static str {
        match self {
            JobKind::Export => "ExportJob",
            JobKind::Import => "ImportJob",
        }
    }

    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        match resource_type {
            "ExportJob" => Some(JobKind::Export),
            "ImportJob" => Some(JobKind::Import),
            _ => None,
        }
    }
}

/// A queued request to run a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub id: String,
    /// `ExportJob` or `ImportJob`.
    pub resource_type: String,
    /// File to write (export) or read (import).
    pub url: String,
    /// API path the job operates on, e.g. `/resource`.
    pub path: String,
    /// Query string applied to the export source.
    #[serde(default)]
    pub query: String,
}

/// The persisted view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub resource_type: String,
    pub status: JobStatus,
    pub url: String,
    pub path: String,
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<String>,
}

impl JobRecord {
    pub fn from_event(event: &JobEvent) -> Self {
        Self {
            id: event.id.clone(),
            resource_type: event.resource_type.clone(),
            status: JobStatus::NotStarted,
            url: event.url.clone(),
            path: event.path.clone(),
            query: event.query.clone(),
            message: None,
            error_log: None,
            completion_date: None,
        }
    }

    fn apply(&mut self, patch: &JobPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(message) = &patch.message {
            self.message = Some(message.clone());
        }
        if let Some(error_log) = &patch.error_log {
            self.error_log = Some(error_log.clone());
        }
        if let Some(date) = &patch.completion_date {
            self.completion_date = Some(date.clone());
        }
    }
}

/// A partial update; only the set fields are sent to storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub message: Option<String>,
    pub error_log: Option<String>,
    pub completion_date: Option<String>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::default().with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error_log(mut self, error_log: impl Into<String>) -> Self {
        self.error_log = Some(error_log.into());
        self
    }

    pub fn completed_now(mut self) -> Self {
        self.completion_date = Some(now_rfc3339());
        self
    }

    /// JSON object with the set fields, in record field naming.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(status) = self.status {
            map.insert("status".into(), Value::String(status.as_str().into()));
        }
        if let Some(message) = &self.message {
            map.insert("message".into(), Value::String(message.clone()));
        }
        if let Some(error_log) = &self.error_log {
            map.insert("errorLog".into(), Value::String(error_log.clone()));
        }
        if let Some(date) = &self.completion_date {
            map.insert("completionDate".into(), Value::String(date.clone()));
        }
        Value::Object(map)
    }
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// Collaborators a job runs against, injected at construction.
#[derive(Clone)]
pub struct JobPlugins {
    pub storage: DynStorage,
    pub resolver: Arc<dyn ResourceTypeResolver>,
    pub normalizer: Arc<dyn RecordNormalizer>,
    pub transport: Arc<dyn Transport>,
    pub config: Arc<BulkConfig>,
}

impl JobPlugins {
    pub fn new(
        storage: DynStorage,
        resolver: Arc<dyn ResourceTypeResolver>,
        normalizer: Arc<dyn RecordNormalizer>,
        transport: Arc<dyn Transport>,
        config: Arc<BulkConfig>,
    ) -> Self {
        Self {
            storage,
            resolver,
            normalizer,
            transport,
            config,
        }
    }

    /// Default collaborators: configured path mappings, common attribute
    /// stamping and HTTP transport. `config` is validated first.
    pub fn from_config(storage: DynStorage, config: BulkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = HttpTransport::new(&config.http, &config.export)?;
        let resolver = PathMappingResolver::new(config.resources.paths.clone());
        Ok(Self::new(
            storage,
            Arc::new(resolver),
            Arc::new(CommonAttributes),
            Arc::new(transport),
            Arc::new(config),
        ))
    }
}

/// Record plus persistence for one job.
pub struct JobState {
    record: JobRecord,
    storage: DynStorage,
}

impl JobState {
    pub fn new(event: &JobEvent, storage: DynStorage) -> Self {
        Self {
            record: JobRecord::from_event(event),
            storage,
        }
    }

    pub fn record(&self) -> &JobRecord {
        &self.record
    }

    pub fn into_record(self) -> JobRecord {
        self.record
    }

    pub fn is_terminal(&self) -> bool {
        self.record.status.is_terminal()
    }

    pub async fn start(&mut self) -> Result<(), JobError> {
        self.update_job(JobPatch::status(JobStatus::Running)).await
    }

    /// Records the pipeline outcome as the single terminal transition.
    pub async fn complete(&mut self, outcome: Result<String, PipelineError>) {
        let patch = match outcome {
            Ok(message) => {
                tracing::info!(job_id = %self.record.id, %message, "job succeeded");
                JobPatch::status(JobStatus::Succeeded)
                    .with_message(message)
                    .completed_now()
            }
            Err(err) => {
                let text = err.to_string();
                tracing::error!(job_id = %self.record.id, error = %text, "job failed");
                JobPatch::status(JobStatus::Failed)
                    .with_message(text.clone())
                    .with_error_log(text)
                    .completed_now()
            }
        };
        if let Err(err) = self.update_job(patch).await {
            tracing::warn!(job_id = %self.record.id, error = %err, "terminal update refused");
        }
    }

    /// Applies `patch` locally and persists it.
    ///
    /// Transition errors are returned. Persistence errors are not: they are
    /// logged and turned into a best-effort `Failed` update.
    pub async fn update_job(&mut self, patch: JobPatch) -> Result<(), JobError> {
        if self.is_terminal() {
            tracing::warn!(
                job_id = %self.record.id,
                status = %self.record.status,
                "ignoring update after terminal status"
            );
            return Err(JobError::AlreadyTerminal {
                id: self.record.id.clone(),
                status: self.record.status,
            });
        }
        if let Some(next) = patch.status {
            if !self.record.status.can_transition_to(next) {
                return Err(JobError::InvalidStatusTransition {
                    from: self.record.status,
                    to: next,
                });
            }
        }

        self.record.apply(&patch);
        self.persist(&patch).await;
        Ok(())
    }

    async fn persist(&mut self, patch: &JobPatch) {
        let result = self
            .storage
            .patch(&self.record.resource_type, &self.record.id, &patch.to_value())
            .await;
        let Err(err) = result else {
            tracing::debug!(job_id = %self.record.id, status = %self.record.status, "job updated");
            return;
        };

        tracing::error!(
            job_id = %self.record.id,
            category = %err.category(),
            error = %err,
            "failed to persist job update"
        );
        if patch.status == Some(JobStatus::Failed) {
            return;
        }

        let text = format!("unable to persist job update: {err}");
        let failed = JobPatch::status(JobStatus::Failed)
            .with_message(text.clone())
            .with_error_log(text)
            .completed_now();
        self.record.apply(&failed);
        if let Err(err) = self
            .storage
            .patch(&self.record.resource_type, &self.record.id, &failed.to_value())
            .await
        {
            tracing::error!(job_id = %self.record.id, error = %err, "failed to record job failure");
        }
    }
}

/// A runnable bulk job.
pub enum BulkJob {
    Export(ExportJob),
    Import(ImportJob),
}

impl BulkJob {
    /// Picks the job variant named by `event.resource_type`.
    pub fn from_event(event: JobEvent, plugins: JobPlugins) -> Result<Self, JobError> {
        match JobKind::from_resource_type(&event.resource_type) {
            Some(JobKind::Export) => Ok(BulkJob::Export(ExportJob::new(event, plugins))),
            Some(JobKind::Import) => Ok(BulkJob::Import(ImportJob::new(event, plugins))),
            None => Err(JobError::UnsupportedKind(event.resource_type)),
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            BulkJob::Export(_) => JobKind::Export,
            BulkJob::Import(_) => JobKind::Import,
        }
    }

    /// Runs the job to completion and returns its final record.
    pub async fn run(self) -> JobRecord {
        match self {
            BulkJob::Export(job) => job.run().await,
            BulkJob::Import(job) => job.run().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_db_memory::InMemoryStorage;
    use serde_json::json;

    fn event() -> JobEvent {
        JobEvent {
            id: "job-1".into(),
            resource_type: "ExportJob".into(),
            url: "http://files/out.json".into(),
            path: "/resource".into(),
            query: String::new(),
        }
    }

    async fn seeded_storage() -> Arc<InMemoryStorage> {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .insert(
                "ExportJob",
                json!({"id": "job-1", "status": "Not Started"}),
            )
            .await
            .unwrap();
        storage
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(JobStatus::NotStarted).unwrap(),
            json!("Not Started")
        );
        let status: JobStatus = serde_json::from_value(json!("Succeeded")).unwrap();
        assert_eq!(status, JobStatus::Succeeded);
    }

    #[test]
    fn test_transitions() {
        use JobStatus::*;
        assert!(NotStarted.can_transition_to(Running));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        assert!(!NotStarted.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Running.can_transition_to(NotStarted));
    }

    #[test]
    fn test_patch_only_contains_set_fields() {
        assert_eq!(
            JobPatch::message("processed 0 record(s)").to_value(),
            json!({"message": "processed 0 record(s)"})
        );
        let patch = JobPatch::status(JobStatus::Failed).with_error_log("boom");
        assert_eq!(
            patch.to_value(),
            json!({"status": "Failed", "errorLog": "boom"})
        );
    }

    #[test]
    fn test_event_deserializes_camel_case() {
        let event: JobEvent = serde_json::from_value(json!({
            "id": "j", "resourceType": "ImportJob", "url": "http://f/a.gz", "path": "/resource"
        }))
        .unwrap();
        assert_eq!(event.resource_type, "ImportJob");
        assert_eq!(event.query, "");
    }

    #[tokio::test]
    async fn test_terminal_status_refuses_updates() {
        let storage = seeded_storage().await;
        let mut state = JobState::new(&event(), storage.clone());

        state.start().await.unwrap();
        state.complete(Ok("3 records".into())).await;
        assert_eq!(state.record().status, JobStatus::Succeeded);
        assert!(state.record().completion_date.is_some());

        let err = state.update_job(JobPatch::message("late")).await.unwrap_err();
        assert!(matches!(err, JobError::AlreadyTerminal { .. }));
        state.complete(Err(PipelineError::decode("late failure"))).await;

        let patches = storage.patches("ExportJob", "job-1").await;
        let statuses: Vec<_> = patches.iter().map(|p| p["status"].clone()).collect();
        assert_eq!(statuses, vec![json!("Running"), json!("Succeeded")]);
        let stored = storage.get("ExportJob", "job-1").await.unwrap();
        assert_eq!(stored["message"], "3 records");
    }

    #[tokio::test]
    async fn test_invalid_transition_is_rejected() {
        let storage = seeded_storage().await;
        let mut state = JobState::new(&event(), storage);
        let err = state
            .update_job(JobPatch::status(JobStatus::Succeeded))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            JobError::InvalidStatusTransition {
                from: JobStatus::NotStarted,
                to: JobStatus::Succeeded
            }
        );
        assert_eq!(state.record().status, JobStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_persistence_failure_becomes_failed() {
        // No stored job record, so every patch reports NotFound.
        let storage = Arc::new(InMemoryStorage::new());
        let mut state = JobState::new(&event(), storage);

        state.start().await.unwrap();
        let record = state.record();
        assert_eq!(record.status, JobStatus::Failed);
        assert!(
            record
                .error_log
                .as_deref()
                .is_some_and(|e| e.contains("unable to persist job update"))
        );
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid_config() {
        let storage = seeded_storage().await;
        let mut config = BulkConfig::default();
        config.import.max_in_flight = 0;
        let err = JobPlugins::from_config(storage, config).err().unwrap();
        assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("max_in_flight")));
    }

    #[tokio::test]
    async fn test_unknown_kind() {
        let storage = seeded_storage().await;
        let plugins = JobPlugins::from_config(storage, BulkConfig::default()).unwrap();
        let mut bad = event();
        bad.resource_type = "ReindexJob".into();
        let err = BulkJob::from_event(bad, plugins.clone()).err().unwrap();
        assert_eq!(err, JobError::UnsupportedKind("ReindexJob".into()));

        let job = BulkJob::from_event(event(), plugins).unwrap();
        assert_eq!(job.kind(), JobKind::Export);
    }
}
