//! Import pipeline.
//!
//! ```text
//! download ──► decode ──► JSON array parser ──► normalize (≤ max_in_flight) ──► create_many
//!                (pipe)                          completes in any order          per batch
//! ```
//!
//! The load stage finishes only when the input is exhausted, no
//! normalization is in flight and the last partial batch is written.

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use serde_json::Value;
use tokio::io::AsyncRead;
use tracing::Instrument;

use crate::compression::{self, Encoding};
use crate::error::PipelineError;
use crate::job::{JobEvent, JobPatch, JobPlugins, JobRecord, JobState};
use crate::json_array::JsonArrayReader;
use crate::normalizer::NormalizeContext;

pub struct ImportJob {
    event: JobEvent,
    plugins: JobPlugins,
    state: JobState,
}

impl ImportJob {
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

    /// Runs the import and returns the final job record.
    ///
    /// An import that reads zero records stays `Running`; only its message
    /// is updated.
    pub async fn run(mut self) -> JobRecord {
        let span = tracing::info_span!("import_job", job_id = %self.event.id);
        async {
            if let Err(err) = self.state.start().await {
                tracing::warn!(error = %err, "import job not started");
                return;
            }
            if self.state.is_terminal() {
                return;
            }
            match self.execute().await {
                Ok(0) => {
                    tracing::info!("import read no records");
                    if let Err(err) = self
                        .state
                        .update_job(JobPatch::message("processed 0 record(s)"))
                        .await
                    {
                        tracing::warn!(error = %err, "import message update refused");
                    }
                }
                Ok(count) => {
                    self.state
                        .complete(Ok(format!("processed {count} record(s)")))
                        .await;
                }
                Err(err) => self.state.complete(Err(err)).await,
            }
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
        let encoding = Encoding::from_url(&self.event.url)?;

        tracing::info!(
            resource_type = %resource_type,
            url = %self.event.url,
            encoding = encoding.name(),
            backend = self.plugins.storage.backend_name(),
            "starting import"
        );

        let body = self.plugins.transport.download(&self.event.url).await?;
        let (decoded_tx, decoded_rx) =
            tokio::io::duplex(self.plugins.config.export.pipe_buffer_bytes);

        let (bytes, count) = tokio::try_join!(
            compression::decode(&encoding, body, decoded_tx),
            self.load(&resource_type, decoded_rx),
        )?;

        tracing::info!(records = count, bytes, "import loaded");
        Ok(count)
    }

    /// Parses, normalizes and writes every record; returns how many were
    /// written.
    async fn load<R>(&self, resource_type: &str, input: R) -> Result<usize, PipelineError>
    where
        R: AsyncRead + Unpin,
    {
        // Plugins built with `JobPlugins::new` skip validation; zero would
        // stall the loop before the first read.
        let batch_size = self.plugins.config.import.batch_size.max(1);
        let max_in_flight = self.plugins.config.import.max_in_flight.max(1);
        let ctx = NormalizeContext::new(&self.plugins.config.resources.base_url, &self.event.path);
        let normalizer = self.plugins.normalizer.as_ref();

        let mut parser = JsonArrayReader::new(input);
        let mut in_flight = FuturesUnordered::new();
        let mut batch: Vec<Value> = Vec::new();
        let mut written = 0usize;
        let mut input_done = false;

        loop {
            if input_done && in_flight.is_empty() {
                break;
            }
            tokio::select! {
                biased;

                Some(result) = in_flight.next(), if !in_flight.is_empty() => {
                    batch.push(result?);
                    if batch.len() >= batch_size {
                        written += self.flush(resource_type, &mut batch).await?;
                    }
                }
                next = parser.next_value(), if !input_done && in_flight.len() < max_in_flight => {
                    match next? {
                        Some(record) => {
                            in_flight.push(normalizer.normalize(resource_type, record, &ctx));
                        }
                        None => input_done = true,
                    }
                }
                else => break,
            }
        }

        written += self.flush(resource_type, &mut batch).await?;
        Ok(written)
    }

    async fn flush(
        &self,
        resource_type: &str,
        batch: &mut Vec<Value>,
    ) -> Result<usize, PipelineError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let records = std::mem::take(batch);
        let size = records.len();
        self.plugins
            .storage
            .create_many(resource_type, records)
            .await?;
        tracing::debug!(resource_type, size, "batch written");
        Ok(size)
    }
}
