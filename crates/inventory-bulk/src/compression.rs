//! Compression stages.
//!
//! The destination or source URL decides the codec: a path ending in `.gz`
//! is gzip, `.zip` is a zip archive with one entry named after the file
//! without its extension, anything else is passed through. Each stage
//! copies from a reader into a writer and shuts the writer down on success
//! so the next stage sees end of input.

use async_compression::tokio::bufread::GzipDecoder;
use async_compression::tokio::write::GzipEncoder;
use async_zip::base::read::stream::ZipFileReader;
use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::compat::{FuturesAsyncReadCompatExt, TokioAsyncReadCompatExt};
use url::Url;

use crate::error::{PipelineError, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    Plain,
    Gzip,
    /// Single-entry archive; `entry_name` is used when writing.
    Zip { entry_name: String },
}

impl Encoding {
    /// Picks the codec from the last path segment of `url`.
    pub fn from_url(url: &str) -> Result<Self, PipelineError> {
        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let file_name = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();

        Ok(if file_name.ends_with(".gz") {
            Encoding::Gzip
        } else if let Some(stem) = file_name.strip_suffix(".zip") {
            let entry_name = if stem.is_empty() { "export" } else { stem };
            Encoding::Zip {
                entry_name: entry_name.to_string(),
            }
        } else {
            Encoding::Plain
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Plain => "plain",
            Encoding::Gzip => "gzip",
            Encoding::Zip { .. } => "zip",
        }
    }
}

fn zip_error(err: async_zip::error::ZipError) -> PipelineError {
    PipelineError::encode(format!("zip: {err}"))
}

/// Compresses everything read from `reader` into `writer`.
///
/// Returns the number of uncompressed bytes consumed.
pub async fn encode<R, W>(
    encoding: &Encoding,
    mut reader: R,
    writer: W,
) -> Result<u64, PipelineError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match encoding {
        Encoding::Plain => {
            let mut writer = writer;
            let n = tokio::io::copy(&mut reader, &mut writer).await?;
            writer.shutdown().await?;
            Ok(n)
        }
        Encoding::Gzip => {
            let mut encoder = GzipEncoder::new(writer);
            let n = tokio::io::copy(&mut reader, &mut encoder).await?;
            // Writes the gzip trailer and shuts the inner writer down.
            encoder.shutdown().await?;
            Ok(n)
        }
        Encoding::Zip { entry_name } => {
            let mut archive = ZipFileWriter::with_tokio(writer);
            let entry = ZipEntryBuilder::new(entry_name.clone().into(), Compression::Deflate);
            let mut entry_writer = archive.write_entry_stream(entry).await.map_err(zip_error)?;
            let n = futures_util::io::copy(reader.compat(), &mut entry_writer).await?;
            entry_writer.close().await.map_err(zip_error)?;
            let mut inner = archive.close().await.map_err(zip_error)?.into_inner();
            inner.shutdown().await?;
            Ok(n)
        }
    }
}

/// Decompresses `reader` into `writer`.
///
/// Gzip input may hold several concatenated members. For zip input only the
/// first entry is read.
pub async fn decode<R, W>(
    encoding: &Encoding,
    reader: R,
    mut writer: W,
) -> Result<u64, PipelineError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let n = match encoding {
        Encoding::Plain => {
            let mut reader = reader;
            tokio::io::copy(&mut reader, &mut writer).await?
        }
        Encoding::Gzip => {
            let mut decoder = GzipDecoder::new(BufReader::new(reader));
            decoder.multiple_members(true);
            tokio::io::copy(&mut decoder, &mut writer)
                .await
                .map_err(|e| PipelineError::decode(format!("gzip: {e}")))?
        }
        Encoding::Zip { .. } => {
            let archive = ZipFileReader::with_tokio(BufReader::new(reader));
            let Some(mut entry) = archive
                .next_with_entry()
                .await
                .map_err(|e| PipelineError::decode(format!("zip: {e}")))?
            else {
                return Err(PipelineError::decode("zip: archive has no entries"));
            };
            tracing::debug!(
                entry = entry.reader().entry().filename().as_str().unwrap_or("<non-utf8>"),
                "reading first zip entry"
            );
            let mut data = entry.reader_mut().compat();
            tokio::io::copy(&mut data, &mut writer)
                .await
                .map_err(|e| PipelineError::decode(format!("zip: {e}")))?
        }
    };
    writer.shutdown().await?;
    Ok(n)
}
