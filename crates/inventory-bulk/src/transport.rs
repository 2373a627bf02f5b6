//! Byte transport to and from the file URLs named by jobs.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, Method};
use tokio::io::AsyncRead;
use tokio_util::io::{ReaderStream, StreamReader};

use crate::config::{ExportConfig, HttpConfig};
use crate::error::TransportError;

/// Body handed to [`Transport::upload`]; consumed as it is sent.
pub type UploadBody = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Body returned by [`Transport::download`]; produced as it arrives.
pub type DownloadBody = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Streams `body` to `url`. Any non-2xx response is an error.
    async fn upload(&self, url: &str, body: UploadBody) -> Result<(), TransportError>;

    /// Opens `url` for reading. Any non-2xx response is an error.
    async fn download(&self, url: &str) -> Result<DownloadBody, TransportError>;
}

/// [`Transport`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    upload_method: Method,
}

impl HttpTransport {
    pub fn new(http: &HttpConfig, export: &ExportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(http.connect_timeout())
            .timeout(http.request_timeout())
            .build()
            .map_err(TransportError::Client)?;
        let upload_method = Method::from_bytes(export.upload_method.to_ascii_uppercase().as_bytes())
            .map_err(|_| TransportError::InvalidMethod(export.upload_method.clone()))?;
        Ok(Self {
            client,
            upload_method,
        })
    }

    pub fn with_client(client: Client, upload_method: Method) -> Self {
        Self {
            client,
            upload_method,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn upload(&self, url: &str, body: UploadBody) -> Result<(), TransportError> {
        let body = reqwest::Body::wrap_stream(ReaderStream::new(body));
        let response = self
            .client
            .request(self.upload_method.clone(), url)
            .header(reqwest::header::CONTENT_TYPE, content_type(url))
            .body(body)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                method: self.upload_method.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        tracing::debug!(url, status = status.as_u16(), "upload finished");
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<DownloadBody, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                method: Method::GET.to_string(),
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }
}

fn content_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if path.ends_with(".gz") {
        "application/gzip"
    } else if path.ends_with(".zip") {
        "application/zip"
    } else {
        "application/json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_by_suffix() {
        assert_eq!(content_type("http://x/out.json.gz?sig=1"), "application/gzip");
        assert_eq!(content_type("http://x/out.zip"), "application/zip");
        assert_eq!(content_type("http://x/out"), "application/json");
    }

    #[test]
    fn test_new_uses_configured_method() {
        let export = ExportConfig {
            upload_method: "post".into(),
            ..ExportConfig::default()
        };
        let transport = HttpTransport::new(&HttpConfig::default(), &export).unwrap();
        assert_eq!(transport.upload_method, Method::POST);
    }
}
