use super::{Encoding, FileAccess, ReadStrategy};
use crate::error::ErrorKind;
use crate::mime::{detect_image_mime, mime_from_header};
use crate::models::{BinaryPayload, ImageReference, ResolvedReference};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

pub const FILE_INFO: &str = "file_info";
pub const STREAMING_REQUEST: &str = "streaming_request";
pub const BUFFERED_FETCH: &str = "buffered_fetch";

pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(10);

fn wrap(strategy: &'static str, error: Error) -> Error {
    match error {
        Error::Strategy { .. } => error,
        other => Error::strategy(strategy, other.to_string(), other.kind()),
    }
}

// Platforms hand back empty buffers for valid files now and then.
fn empty(strategy: &'static str, what: &str) -> Error {
    Error::strategy(strategy, format!("{} was empty", what), ErrorKind::Transient)
}

fn status_error(strategy: &'static str, status: StatusCode) -> Error {
    let kind = if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ErrorKind::Transient
    } else {
        ErrorKind::Permanent
    };
    Error::strategy(strategy, format!("request returned status {}", status), kind)
}

fn unsupported(strategy: &'static str, reference: &ImageReference) -> Error {
    Error::strategy(
        strategy,
        format!("unsupported reference {}", reference),
        ErrorKind::Permanent,
    )
}

fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Stats the file first and only reads it (as base64) when it looks non-empty.
pub struct FileInfoStrategy {
    files: Arc<dyn FileAccess>,
}

impl FileInfoStrategy {
    pub fn new(files: Arc<dyn FileAccess>) -> Self {
        Self { files }
    }
}

#[async_trait]
impl ReadStrategy for FileInfoStrategy {
    fn name(&self) -> &'static str {
        FILE_INFO
    }

    async fn read(&self, reference: &ImageReference) -> Result<BinaryPayload> {
        let info = self
            .files
            .resource_info(reference)
            .await
            .map_err(|e| wrap(FILE_INFO, e))?;

        if !info.exists {
            return Err(Error::strategy(
                FILE_INFO,
                "file does not exist",
                ErrorKind::Permanent,
            ));
        }
        if info.size == Some(0) {
            return Err(empty(FILE_INFO, "file"));
        }

        let encoded = self
            .files
            .read_as_encoded_text(reference, Encoding::Base64)
            .await
            .map_err(|e| wrap(FILE_INFO, e))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| wrap(FILE_INFO, e.into()))?;
        if bytes.is_empty() {
            return Err(empty(FILE_INFO, "decoded file"));
        }

        let mime = detect_image_mime(&bytes);
        BinaryPayload::new(bytes, mime)
    }
}

/// Binary-mode GET with a hard deadline, consuming the body as a stream.
pub struct StreamingRequestStrategy {
    client: Client,
    timeout: Duration,
}

impl StreamingRequestStrategy {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn read_remote(&self, url: reqwest::Url) -> Result<BinaryPayload> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| wrap(STREAMING_REQUEST, e.into()))?;

        if !response.status().is_success() {
            return Err(status_error(STREAMING_REQUEST, response.status()));
        }

        let header = content_type(&response);
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| wrap(STREAMING_REQUEST, e.into()))?;
            body.extend_from_slice(&chunk);
        }
        if body.is_empty() {
            return Err(empty(STREAMING_REQUEST, "response body"));
        }

        let mime = mime_from_header(header.as_deref(), &body);
        BinaryPayload::new(body, mime)
    }

    async fn read_local(&self, path: &Path) -> Result<BinaryPayload> {
        let read = async {
            let mut file = tokio::fs::File::open(path).await?;
            let mut body = Vec::new();
            let mut chunk = vec![0u8; 64 * 1024];
            loop {
                let n = file.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                body.extend_from_slice(&chunk[..n]);
            }
            Ok::<_, std::io::Error>(body)
        };

        let body = match tokio::time::timeout(self.timeout, read).await {
            Ok(result) => result.map_err(|e| wrap(STREAMING_REQUEST, e.into()))?,
            Err(_) => {
                return Err(Error::strategy(
                    STREAMING_REQUEST,
                    format!("timed out after {:?}", self.timeout),
                    ErrorKind::Transient,
                ))
            }
        };
        if body.is_empty() {
            return Err(empty(STREAMING_REQUEST, "file stream"));
        }

        let mime = detect_image_mime(&body);
        BinaryPayload::new(body, mime)
    }
}

#[async_trait]
impl ReadStrategy for StreamingRequestStrategy {
    fn name(&self) -> &'static str {
        STREAMING_REQUEST
    }

    async fn read(&self, reference: &ImageReference) -> Result<BinaryPayload> {
        match reference.resolve() {
            ResolvedReference::Remote(url) => self.read_remote(url).await,
            ResolvedReference::Local(path) => self.read_local(&path).await,
            ResolvedReference::Unsupported => Err(unsupported(STREAMING_REQUEST, reference)),
        }
    }
}

/// Plain fetch that buffers the whole response before looking at it.
pub struct BufferedFetchStrategy {
    client: Client,
}

impl BufferedFetchStrategy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReadStrategy for BufferedFetchStrategy {
    fn name(&self) -> &'static str {
        BUFFERED_FETCH
    }

    async fn read(&self, reference: &ImageReference) -> Result<BinaryPayload> {
        let (body, header) = match reference.resolve() {
            ResolvedReference::Remote(url) => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| wrap(BUFFERED_FETCH, e.into()))?;
                if !response.status().is_success() {
                    return Err(status_error(BUFFERED_FETCH, response.status()));
                }
                let header = content_type(&response);
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| wrap(BUFFERED_FETCH, e.into()))?;
                (body, header)
            }
            ResolvedReference::Local(path) => {
                let body = tokio::fs::read(&path)
                    .await
                    .map_err(|e| wrap(BUFFERED_FETCH, e.into()))?;
                (body.into(), None)
            }
            ResolvedReference::Unsupported => return Err(unsupported(BUFFERED_FETCH, reference)),
        };

        if body.is_empty() {
            return Err(empty(BUFFERED_FETCH, "response body"));
        }

        let mime = mime_from_header(header.as_deref(), &body);
        BinaryPayload::new(body, mime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::mock::MockFileAccess;
    use crate::reader::ResourceInfo;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn jpeg_bytes(len: usize) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.resize(len, 0xAB);
        bytes
    }

    #[tokio::test]
    async fn test_file_info_skips_read_when_missing() {
        let files = MockFileAccess::new().with_info(
            "file:///photos/1.jpg",
            ResourceInfo {
                exists: false,
                size: None,
            },
        );
        let strategy = FileInfoStrategy::new(Arc::new(files.clone()));

        let err = strategy
            .read(&ImageReference::new("file:///photos/1.jpg"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert_eq!(files.get_info_count(), 1);
        assert_eq!(files.get_read_count(), 0);
    }

    #[tokio::test]
    async fn test_file_info_skips_read_when_zero_size() {
        let files = MockFileAccess::new().with_info(
            "file:///photos/1.jpg",
            ResourceInfo {
                exists: true,
                size: Some(0),
            },
        );
        let strategy = FileInfoStrategy::new(Arc::new(files.clone()));

        let err = strategy
            .read(&ImageReference::new("file:///photos/1.jpg"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
        assert_eq!(files.get_read_count(), 0);
    }

    #[tokio::test]
    async fn test_file_info_decodes_base64_contents() {
        let files = MockFileAccess::new().with_file("file:///photos/1.jpg", jpeg_bytes(32));
        let strategy = FileInfoStrategy::new(Arc::new(files));

        let payload = strategy
            .read(&ImageReference::new("file:///photos/1.jpg"))
            .await
            .unwrap();
        assert_eq!(payload.size(), 32);
        assert_eq!(payload.mime_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn test_file_info_rejects_empty_decoded_file() {
        // Size is not reported, so the read happens and yields nothing.
        let files = MockFileAccess::new()
            .with_file("file:///photos/1.jpg", Vec::new())
            .with_info(
                "file:///photos/1.jpg",
                ResourceInfo {
                    exists: true,
                    size: None,
                },
            );
        let strategy = FileInfoStrategy::new(Arc::new(files.clone()));

        let err = strategy
            .read(&ImageReference::new("file:///photos/1.jpg"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("decoded file was empty"));
        assert_eq!(files.get_read_count(), 1);
    }

    #[tokio::test]
    async fn test_streaming_request_reads_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bike.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(jpeg_bytes(512)),
            )
            .mount(&server)
            .await;

        let strategy = StreamingRequestStrategy::new(Client::new(), DEFAULT_STREAM_TIMEOUT);
        let payload = strategy
            .read(&ImageReference::new(format!("{}/bike.jpg", server.uri())))
            .await
            .unwrap();
        assert_eq!(payload.size(), 512);
        assert_eq!(payload.mime_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn test_streaming_request_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(jpeg_bytes(16))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let strategy = StreamingRequestStrategy::new(Client::new(), Duration::from_millis(50));
        let err = strategy
            .read(&ImageReference::new(format!("{}/slow.jpg", server.uri())))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().starts_with(STREAMING_REQUEST));
    }

    #[tokio::test]
    async fn test_streaming_request_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let strategy = StreamingRequestStrategy::new(Client::new(), DEFAULT_STREAM_TIMEOUT);
        let err = strategy
            .read(&ImageReference::new(format!("{}/missing.jpg", server.uri())))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_streaming_request_reads_local_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bike.png");
        std::fs::write(&file, [0x89, 0x50, 0x4E, 0x47, 0x0D]).unwrap();

        let strategy = StreamingRequestStrategy::new(Client::new(), DEFAULT_STREAM_TIMEOUT);
        let payload = strategy
            .read(&ImageReference::new(file.to_string_lossy().to_string()))
            .await
            .unwrap();
        assert_eq!(payload.size(), 5);
        assert_eq!(payload.mime_type(), "image/png");
    }

    #[tokio::test]
    async fn test_buffered_fetch_uses_header_mime() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/webp")
                    .set_body_bytes(vec![1, 2, 3]),
            )
            .mount(&server)
            .await;

        let strategy = BufferedFetchStrategy::new(Client::new());
        let payload = strategy
            .read(&ImageReference::new(format!("{}/a", server.uri())))
            .await
            .unwrap();
        assert_eq!(payload.mime_type(), "image/webp");
        assert_eq!(payload.size(), 3);
    }

    #[tokio::test]
    async fn test_buffered_fetch_defaults_mime_and_rejects_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/raw"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7, 7, 7]))
            .mount(&server)
            .await;

        let strategy = BufferedFetchStrategy::new(Client::new());

        let err = strategy
            .read(&ImageReference::new(format!("{}/empty", server.uri())))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));

        let payload = strategy
            .read(&ImageReference::new(format!("{}/raw", server.uri())))
            .await
            .unwrap();
        assert_eq!(payload.mime_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn test_unsupported_scheme_fails_fast() {
        let strategy = BufferedFetchStrategy::new(Client::new());
        let err = strategy
            .read(&ImageReference::new("ph://asset/1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }
}
