use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use inventory_bulk::{
    BulkConfig, BulkJob, CommonAttributes, HttpTransport, JobEvent, JobPlugins, JobRecord,
    JobStatus, NormalizeContext, NormalizeError, PathMappingResolver, RecordNormalizer,
};
use inventory_db_memory::{BatchWrite, InMemoryStorage};
use inventory_storage::{InventoryStorage, QueryDescriptor, RecordStream, StorageError};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JOB_ID: &str = "import-1";

async fn seeded_storage() -> Arc<InMemoryStorage> {
    let storage = Arc::new(InMemoryStorage::new());
    storage
        .insert("ImportJob", json!({"id": JOB_ID, "status": "Not Started"}))
        .await
        .unwrap();
    storage
}

async fn file_server(file: &str, status: u16, body: Vec<u8>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/files/{file}")))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(body))
        .mount(&server)
        .await;
    server
}

fn event(url: String) -> JobEvent {
    JobEvent {
        id: JOB_ID.into(),
        resource_type: "ImportJob".into(),
        url,
        path: "/resource".into(),
        query: String::new(),
    }
}

fn plugins_with(
    storage: Arc<dyn InventoryStorage>,
    normalizer: Arc<dyn RecordNormalizer>,
    config: BulkConfig,
) -> JobPlugins {
    let transport = HttpTransport::new(&config.http, &config.export).unwrap();
    JobPlugins::new(
        storage,
        Arc::new(PathMappingResolver::new(config.resources.paths.clone())),
        normalizer,
        Arc::new(transport),
        Arc::new(config),
    )
}

async fn run_import(storage: Arc<InMemoryStorage>, url: String) -> JobRecord {
    let plugins = JobPlugins::from_config(storage, BulkConfig::default()).unwrap();
    BulkJob::from_event(event(url), plugins).unwrap().run().await
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn statuses(patches: &[Value]) -> Vec<Value> {
    patches
        .iter()
        .map(|p| p["status"].clone())
        .filter(|s| !s.is_null())
        .collect()
}

/// Delays each record by an amount derived from its position so that
/// normalizations finish out of order.
struct SlowNormalizer;

#[async_trait]
impl RecordNormalizer for SlowNormalizer {
    async fn normalize(
        &self,
        resource_type: &str,
        record: Value,
        ctx: &NormalizeContext,
    ) -> Result<Value, NormalizeError> {
        let n = record["n"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis((n % 3) * 15)).await;
        CommonAttributes.normalize(resource_type, record, ctx).await
    }
}

struct RejectingNormalizer;

#[async_trait]
impl RecordNormalizer for RejectingNormalizer {
    async fn normalize(
        &self,
        _resource_type: &str,
        record: Value,
        _ctx: &NormalizeContext,
    ) -> Result<Value, NormalizeError> {
        if record.get("name").is_none() {
            return Err(NormalizeError::Failed("name is required".into()));
        }
        Ok(record)
    }
}

/// Rejects the `fail_on`-th batch write (1-based) and forwards everything
/// else to the wrapped memory storage.
struct FlakyBatchStorage {
    inner: Arc<InMemoryStorage>,
    fail_on: usize,
    writes: AtomicUsize,
}

#[async_trait]
impl InventoryStorage for FlakyBatchStorage {
    async fn find_stream(
        &self,
        resource_type: &str,
        query: &QueryDescriptor,
    ) -> Result<RecordStream, StorageError> {
        self.inner.find_stream(resource_type, query).await
    }

    async fn create_many(
        &self,
        resource_type: &str,
        records: Vec<Value>,
    ) -> Result<(), StorageError> {
        if self.writes.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(StorageError::unavailable("write rejected"));
        }
        self.inner.create_many(resource_type, records).await
    }

    async fn patch(
        &self,
        resource_type: &str,
        id: &str,
        update: &Value,
    ) -> Result<(), StorageError> {
        self.inner.patch(resource_type, id, update).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky-batch"
    }
}

#[tokio::test]
async fn gzip_import_writes_normalized_batch() {
    let storage = seeded_storage().await;
    let body = gzip(br#"[{"id":"a","name":"router"},{"id":"b","name":"switch"}]"#);
    let server = file_server("resources.json.gz", 200, body).await;

    let record = run_import(
        storage.clone(),
        format!("{}/files/resources.json.gz", server.uri()),
    )
    .await;

    assert_eq!(record.status, JobStatus::Succeeded);
    assert_eq!(record.message.as_deref(), Some("processed 2 record(s)"));
    assert_eq!(
        storage.batch_writes().await,
        vec![BatchWrite {
            resource_type: "Resource".into(),
            size: 2
        }]
    );

    let stored = storage.get("Resource", "a").await.unwrap();
    assert_eq!(stored["@type"], "Resource");
    assert_eq!(stored["href"], "http://localhost:8080/resource/a");

    let patches = storage.patches("ImportJob", JOB_ID).await;
    assert_eq!(statuses(&patches), vec![json!("Running"), json!("Succeeded")]);
}

#[tokio::test]
async fn all_normalizations_drain_before_completion() {
    let storage = seeded_storage().await;
    let records: Vec<Value> = (0..10).map(|n| json!({"n": n})).collect();
    let body = serde_json::to_vec(&records).unwrap();
    let server = file_server("many.json", 200, body).await;

    let mut config = BulkConfig::default();
    config.import.batch_size = 3;
    config.import.max_in_flight = 4;
    let plugins = plugins_with(storage.clone(), Arc::new(SlowNormalizer), config);

    let record = BulkJob::from_event(event(format!("{}/files/many.json", server.uri())), plugins)
        .unwrap()
        .run()
        .await;

    assert_eq!(record.status, JobStatus::Succeeded);
    assert_eq!(record.message.as_deref(), Some("processed 10 record(s)"));

    let sizes: Vec<usize> = storage
        .batch_writes()
        .await
        .iter()
        .map(|w| w.size)
        .collect();
    assert_eq!(sizes, vec![3, 3, 3, 1]);
    assert_eq!(storage.count_by_type("Resource").await, 10);
}

#[tokio::test]
async fn empty_import_stays_running() {
    let storage = seeded_storage().await;
    let server = file_server("empty.json", 200, b"[]".to_vec()).await;

    let record = run_import(storage.clone(), format!("{}/files/empty.json", server.uri())).await;

    assert_eq!(record.status, JobStatus::Running);
    assert_eq!(record.message.as_deref(), Some("processed 0 record(s)"));
    assert!(record.completion_date.is_none());
    assert!(storage.batch_writes().await.is_empty());

    let patches = storage.patches("ImportJob", JOB_ID).await;
    assert_eq!(
        patches,
        vec![
            json!({"status": "Running"}),
            json!({"message": "processed 0 record(s)"})
        ]
    );
}

#[tokio::test]
async fn zip_import_reads_first_entry_only() {
    let storage = seeded_storage().await;

    let mut archive = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    archive.start_file("first.json", options).unwrap();
    archive.write_all(br#"[{"id":"z1","name":"x"}]"#).unwrap();
    archive.start_file("second.json", options).unwrap();
    archive
        .write_all(br#"[{"id":"z2"},{"id":"z3"}]"#)
        .unwrap();
    let body = archive.finish().unwrap().into_inner();
    let server = file_server("bundle.zip", 200, body).await;

    let record = run_import(storage.clone(), format!("{}/files/bundle.zip", server.uri())).await;

    assert_eq!(record.status, JobStatus::Succeeded);
    assert_eq!(record.message.as_deref(), Some("processed 1 record(s)"));
    assert!(storage.get("Resource", "z1").await.is_some());
    assert!(storage.get("Resource", "z2").await.is_none());
}

#[tokio::test]
async fn malformed_json_fails_job() {
    let storage = seeded_storage().await;
    let server = file_server("broken.json", 200, br#"[{"id":"a"}, {"id": }"#.to_vec()).await;

    let record = run_import(storage.clone(), format!("{}/files/broken.json", server.uri())).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert!(record.error_log.is_some());
    let patches = storage.patches("ImportJob", JOB_ID).await;
    assert_eq!(statuses(&patches), vec![json!("Running"), json!("Failed")]);
}

#[tokio::test]
async fn non_array_document_fails_job() {
    let storage = seeded_storage().await;
    let server = file_server("object.json", 200, br#"{"id":"a"}"#.to_vec()).await;

    let record = run_import(storage.clone(), format!("{}/files/object.json", server.uri())).await;

    assert_eq!(record.status, JobStatus::Failed);
    assert!(storage.batch_writes().await.is_empty());
}

#[tokio::test]
async fn missing_file_fails_job() {
    let storage = seeded_storage().await;
    let server = file_server("other.json", 200, b"[]".to_vec()).await;

    let record = run_import(storage, format!("{}/files/missing.json", server.uri())).await;

    assert_eq!(record.status, JobStatus::Failed);
    let error_log = record.error_log.unwrap();
    assert!(error_log.contains("404"), "{error_log}");
}

#[tokio::test]
async fn normalization_error_fails_job() {
    let storage = seeded_storage().await;
    let body = br#"[{"id":"a","name":"ok"},{"id":"b"}]"#.to_vec();
    let server = file_server("partial.json", 200, body).await;
    let plugins = plugins_with(
        storage.clone(),
        Arc::new(RejectingNormalizer),
        BulkConfig::default(),
    );

    let record = BulkJob::from_event(event(format!("{}/files/partial.json", server.uri())), plugins)
        .unwrap()
        .run()
        .await;

    assert_eq!(record.status, JobStatus::Failed);
    assert!(
        record
            .error_log
            .as_deref()
            .is_some_and(|e| e.contains("name is required"))
    );
}

#[tokio::test]
async fn unresolved_path_fails_before_download() {
    let storage = seeded_storage().await;
    let server = file_server("r.json", 200, b"[]".to_vec()).await;
    let plugins = JobPlugins::from_config(storage, BulkConfig::default()).unwrap();
    let mut event = event(format!("{}/files/r.json", server.uri()));
    event.path = "/unknown".into();

    let record = BulkJob::from_event(event, plugins).unwrap().run().await;

    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(
        record.message.as_deref(),
        Some("Unable to identify resource type from path")
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn batch_write_error_fails_job() {
    let jobs = seeded_storage().await;
    let records: Vec<Value> = (0..6).map(|n| json!({"id": format!("r{n}")})).collect();
    let server = file_server("six.json", 200, serde_json::to_vec(&records).unwrap()).await;
    let storage = Arc::new(FlakyBatchStorage {
        inner: jobs.clone(),
        fail_on: 2,
        writes: AtomicUsize::new(0),
    });

    let mut config = BulkConfig::default();
    config.import.batch_size = 2;
    config.import.max_in_flight = 1;
    config.export.pipe_buffer_bytes = 4 * 1024 * 1024;
    let plugins = plugins_with(storage.clone(), Arc::new(CommonAttributes), config);

    let record = BulkJob::from_event(event(format!("{}/files/six.json", server.uri())), plugins)
        .unwrap()
        .run()
        .await;

    assert_eq!(record.status, JobStatus::Failed);
    let error_log = record.error_log.unwrap();
    assert!(error_log.contains("write rejected"), "{error_log}");
    assert_eq!(storage.writes.load(Ordering::SeqCst), 2);
    assert_eq!(
        jobs.batch_writes().await,
        vec![BatchWrite {
            resource_type: "Resource".into(),
            size: 2
        }]
    );

    let patches = jobs.patches("ImportJob", JOB_ID).await;
    assert_eq!(statuses(&patches), vec![json!("Running"), json!("Failed")]);
}

#[tokio::test]
async fn zero_limits_still_import_every_record() {
    let storage = seeded_storage().await;
    let body = br#"[{"id":"a"},{"id":"b"},{"id":"c"}]"#.to_vec();
    let server = file_server("three.json", 200, body).await;

    let mut config = BulkConfig::default();
    config.import.batch_size = 0;
    config.import.max_in_flight = 0;
    let plugins = plugins_with(storage.clone(), Arc::new(CommonAttributes), config);

    let record = BulkJob::from_event(event(format!("{}/files/three.json", server.uri())), plugins)
        .unwrap()
        .run()
        .await;

    assert_eq!(record.status, JobStatus::Succeeded);
    assert_eq!(record.message.as_deref(), Some("processed 3 record(s)"));
    assert_eq!(storage.count_by_type("Resource").await, 3);
}
