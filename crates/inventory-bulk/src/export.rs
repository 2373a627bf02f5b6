//! Export pipeline.
//!
//! ```text
//! find_stream ──► strip/project ──► JSON array ──► encode ──► upload
//!               (count)              (pipe)         (pipe)
//! ```
//!
//! Stages are joined with `try_join!`: the first failing stage ends the
//! job and drops the others, which closes the source stream and aborts the
//! upload. Pipes are bounded, so a slow upload throttles the source.

use futures_util::StreamExt;
use inventory_query::{ProjectionSpec, parse_query_string};
use inventory_storage::RecordStream;
use serde_json::Value;
use tokio::io::{AsyncWrite, DuplexStream};
use tracing::Instrument;

use crate::compression::{self, Encoding};
use crate::error::PipelineError;
use crate::job::{JobEvent, JobPlugins, JobRecord, JobState};
use crate::json_array::JsonArrayWriter;

pub struct ExportJob {
    event: JobEvent,
    plugins: JobPlugins,
    state: JobState,
}

impl ExportJob {
    pub fn new(event: JobEvent, plugins: JobPlugins) -> Self {
        let state = JobState::new(&event, plugins.storage.clone());
        Self {
            event,
            plugins,
            state,
        }
    }

    pub fn record(&self) -> &JobRecord {
        self.state.record()
    }

    /// Runs the export and returns the final job record.
    pub async fn run(mut self) -> JobRecord {
        let span = tracing::info_span!("export_job", job_id = %self.event.id);
        async {
            if let Err(err) = self.state.start().await {
                tracing::warn!(error = %err, "export job not started");
                return;
            }
            if self.state.is_terminal() {
                return;
            }
            let outcome = self
                .execute()
                .await
                .map(|count| format!("{count} records"));
            self.state.complete(outcome).await;
        }
        .instrument(span)
        .await;
        self.state.into_record()
    }

    async fn execute(&self) -> Result<usize, PipelineError> {
        let resource_type = self
            .plugins
            .resolver
            .resolve(&self.event.path)
            .ok_or_else(|| PipelineError::UnresolvedPath {
                path: self.event.path.clone(),
            })?;
        let query = parse_query_string(&self.event.query)?;
        let projection = ProjectionSpec::from_query(&query);
        let encoding = Encoding::from_url(&self.event.url)?;
        let buffer = self.plugins.config.export.pipe_buffer_bytes;

        tracing::info!(
            resource_type = %resource_type,
            url = %self.event.url,
            encoding = encoding.name(),
            backend = self.plugins.storage.backend_name(),
            "starting export"
        );

        let source = self
            .plugins
            .storage
            .find_stream(&resource_type, &query)
            .await?;

        let (json_tx, json_rx) = tokio::io::duplex(buffer);
        let (encoded_tx, encoded_rx) = tokio::io::duplex(buffer);

        let (count, bytes, ()) = tokio::try_join!(
            serialize_records(source, &projection, json_tx),
            compression::encode(&encoding, json_rx, encoded_tx),
            self.upload(encoded_rx),
        )?;

        tracing::info!(records = count, bytes, "export uploaded");
        Ok(count)
    }

    async fn upload(&self, body: DuplexStream) -> Result<(), PipelineError> {
        self.plugins
            .transport
            .upload(&self.event.url, Box::new(body))
            .await?;
        Ok(())
    }
}

/// Drops internal (`_`-prefixed) keys.
fn strip_internal(record: &mut Value) {
    if let Value::Object(map) = record {
        map.retain(|key, _| !key.starts_with('_'));
    }
}

/// Writes every source record as one JSON array; returns the number of
/// records read from the source.
async fn serialize_records<W>(
    mut source: RecordStream,
    projection: &ProjectionSpec,
    writer: W,
) -> Result<usize, PipelineError>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = JsonArrayWriter::new(writer);
    let mut count = 0usize;
    while let Some(record) = source.next().await {
        let mut record = record?;
        count += 1;
        strip_internal(&mut record);
        projection.apply(&mut record);
        writer.write(&record).await?;
    }
    writer.finish().await?;
    Ok(count)
}
