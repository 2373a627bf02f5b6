//! Work-queue endpoint readiness.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::config::QueueConfig;
use crate::error::TransportError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEndpoint {
    pub host: String,
    pub port: u16,
}

impl QueueEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.host.clone(), config.port)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Polls a TCP connect until the endpoint accepts or `timeout` elapses.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), TransportError> {
        let address = self.address();
        let started = Instant::now();
        let deadline = started + timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, TcpStream::connect(&address)).await {
                Ok(Ok(_)) => {
                    tracing::info!(address = %address, attempts, "queue endpoint ready");
                    return Ok(());
                }
                Ok(Err(err)) => {
                    tracing::debug!(address = %address, attempts, error = %err, "queue not ready");
                }
                Err(_) => {}
            }

            if Instant::now() + POLL_INTERVAL > deadline {
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(address = %address, attempts, waited_ms, "queue endpoint unreachable");
                return Err(TransportError::Unreachable { address, waited_ms });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
