//! Transport dispatch over `reqwest`.
//!
//! The dispatcher turns a [`RequestEnvelope`] into one HTTP exchange. Any HTTP
//! response, whatever its status, is reported as a [`RawResponse`]; only
//! failures before a response arrives become errors.

use crate::{
    envelope::{Body, RequestEnvelope, Task},
    logger::RequestId,
    target::{DownloadDestination, FileNaming, MultipartPart, PartSource},
    Error, Result,
};
use futures_util::StreamExt;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use url::Url;

/// What the transport returned.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Empty for downloads that were written to disk.
    pub body: Vec<u8>,
    pub saved_to: Option<PathBuf>,
}

/// Sends envelopes through a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    http: reqwest::Client,
}

impl Dispatcher {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder().build().map_err(|e| {
            Error::Configuration(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { http })
    }

    /// Uses an existing `reqwest` client, keeping its connection pool.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Performs the exchange described by `envelope`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when no response was received,
    /// [`Error::Configuration`] for headers or MIME types that are not valid on
    /// the wire and [`Error::Io`] when an upload file cannot be read or a
    /// download cannot be written.
    pub async fn send(&self, envelope: &RequestEnvelope, id: RequestId) -> Result<RawResponse> {
        tracing::debug!(
            request_id = id.get(),
            method = %envelope.method,
            url = %envelope.url,
            "Executing HTTP request"
        );

        let mut request = self
            .http
            .request(envelope.method.to_http(), envelope.url.clone())
            .timeout(envelope.timeout)
            .headers(wire_headers(envelope)?);

        request = match &envelope.task {
            Task::Regular { body: Body::Empty } | Task::Download { .. } => request,
            Task::Regular {
                body: Body::Json(bytes),
            } => request.body(bytes.clone()),
            Task::Regular {
                body: Body::Form(form),
            } => request.body(form.clone()),
            Task::Upload { parts } => request.multipart(multipart_form(parts).await?),
        };

        let response = request.send().await.map_err(Error::transport)?;
        let status = response.status();
        let headers = response.headers().clone();

        if let Task::Download { destination } = &envelope.task {
            if status.as_u16() == envelope.success_status {
                let path = download_path(destination, &envelope.url, id);
                write_download(response, &path).await?;
                tracing::info!(request_id = id.get(), path = %path.display(), "Download saved");
                return Ok(RawResponse {
                    status,
                    headers,
                    body: Vec::new(),
                    saved_to: Some(path),
                });
            }
        }

        let body = response.bytes().await.map_err(Error::transport)?.to_vec();
        Ok(RawResponse {
            status,
            headers,
            body,
            saved_to: None,
        })
    }
}

fn wire_headers(envelope: &RequestEnvelope) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &envelope.headers {
        // The multipart encoder supplies its own Content-Type with a boundary.
        if matches!(envelope.task, Task::Upload { .. }) && name.eq_ignore_ascii_case("content-type")
        {
            continue;
        }
        let name = HeaderName::try_from(name.as_str())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_str())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

async fn multipart_form(parts: &[MultipartPart]) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        let (bytes, fallback_name) = match &part.source {
            PartSource::Bytes(bytes) => (bytes.clone(), None),
            PartSource::File(path) => (
                tokio::fs::read(path).await?,
                path.file_name().map(|n| n.to_string_lossy().into_owned()),
            ),
        };

        let mut wire = reqwest::multipart::Part::bytes(bytes);
        if let Some(file_name) = part.file_name.clone().or(fallback_name) {
            wire = wire.file_name(file_name);
        }
        if let Some(mime) = &part.mime_type {
            wire = wire.mime_str(mime).map_err(|e| {
                Error::Configuration(format!("Invalid MIME type '{}': {}", mime, e))
            })?;
        }
        form = form.part(part.field_name.clone(), wire);
    }
    Ok(form)
}

/// Resolves the file a download is written to.
pub(crate) fn download_path(destination: &DownloadDestination, url: &Url, id: RequestId) -> PathBuf {
    let name = match &destination.naming {
        FileNaming::Fixed(name) => name.clone(),
        FileNaming::Generated { prefix } => format!("{}-{}", prefix, id.get()),
        FileNaming::Suggested => url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("download-{}", id.get())),
    };
    destination.directory.join(name)
}

/// Streams the body next to `path` and renames it into place once complete.
///
/// Nothing is left at `path` or beside it when the transfer fails.
async fn write_download(response: reqwest::Response, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(path);
    match stream_to(response, &partial).await {
        Ok(()) => {
            tokio::fs::rename(&partial, path).await?;
            Ok(())
        }
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                tracing::debug!(error = %cleanup, path = %partial.display(), "No partial download to remove");
            }
            Err(e)
        }
    }
}

async fn stream_to(response: reqwest::Response, path: &Path) -> Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Error::transport)?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suggested_name_uses_last_segment() {
        let destination = DownloadDestination::new("/tmp/dl", FileNaming::Suggested);
        let url = Url::parse("https://cdn.example.com/files/report.pdf?sig=1").unwrap();
        let id = RequestId::next();
        assert_eq!(
            download_path(&destination, &url, id),
            PathBuf::from("/tmp/dl/report.pdf")
        );
    }

    #[test]
    fn test_suggested_name_falls_back_to_generated() {
        let destination = DownloadDestination::new("/tmp/dl", FileNaming::Suggested);
        let url = Url::parse("https://cdn.example.com/").unwrap();
        let id = RequestId::next();
        assert_eq!(
            download_path(&destination, &url, id),
            PathBuf::from(format!("/tmp/dl/download-{}", id.get()))
        );
    }

    #[test]
    fn test_fixed_and_generated_names() {
        let url = Url::parse("https://cdn.example.com/a.bin").unwrap();
        let id = RequestId::next();

        let fixed = DownloadDestination::new("/tmp/dl", FileNaming::Fixed("b.bin".to_string()));
        assert_eq!(download_path(&fixed, &url, id), PathBuf::from("/tmp/dl/b.bin"));

        let generated = DownloadDestination::new(
            "/tmp/dl",
            FileNaming::Generated {
                prefix: "media".to_string(),
            },
        );
        assert_eq!(
            download_path(&generated, &url, id),
            PathBuf::from(format!("/tmp/dl/media-{}", id.get()))
        );
    }

    #[test]
    fn test_partial_path_sits_beside_target() {
        assert_eq!(
            partial_path(Path::new("/tmp/dl/report.pdf")),
            PathBuf::from("/tmp/dl/report.pdf.part")
        );
    }
}
