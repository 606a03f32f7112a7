//! Binary reading for local image references
//!
//! Turns an [`ImageReference`] into a non-empty [`BinaryPayload`] by trying
//! an ordered list of read strategies until one of them yields bytes.
//! Platform file access is inconsistent (some APIs hand back empty buffers
//! for perfectly valid files), so cheaper strategies run first and the
//! slower ones act as fallbacks.

pub mod fs;
pub mod mock;
pub mod strategies;

pub use fs::LocalFileAccess;
pub use mock::{MockFileAccess, MockRead, MockReadStrategy};
pub use strategies::{BufferedFetchStrategy, FileInfoStrategy, StreamingRequestStrategy};

use crate::error::ErrorKind;
use crate::models::{BinaryPayload, ImageReference};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Metadata reported by the local file layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceInfo {
    pub exists: bool,
    /// `None` when the platform does not report a size.
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Base64,
    Utf8,
}

/// Local resource access collaborator.
#[async_trait]
pub trait FileAccess: Send + Sync {
    async fn resource_info(&self, reference: &ImageReference) -> Result<ResourceInfo>;
    async fn read_as_encoded_text(
        &self,
        reference: &ImageReference,
        encoding: Encoding,
    ) -> Result<String>;
}

/// One way of pulling raw bytes out of a reference.
#[async_trait]
pub trait ReadStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn read(&self, reference: &ImageReference) -> Result<BinaryPayload>;
}

pub struct BinaryReader {
    strategies: Vec<Box<dyn ReadStrategy>>,
}

impl BinaryReader {
    pub fn new(strategies: Vec<Box<dyn ReadStrategy>>) -> Self {
        Self { strategies }
    }

    /// File info + base64, then streaming request, then buffered fetch.
    pub fn with_defaults(
        files: Arc<dyn FileAccess>,
        client: reqwest::Client,
        stream_timeout: Duration,
    ) -> Self {
        Self::new(vec![
            Box::new(FileInfoStrategy::new(files)),
            Box::new(StreamingRequestStrategy::new(client.clone(), stream_timeout)),
            Box::new(BufferedFetchStrategy::new(client)),
        ])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Returns the first non-empty payload, or the last strategy's failure.
    ///
    /// A permission failure stops the chain immediately.
    pub async fn read_binary(&self, reference: &ImageReference) -> Result<BinaryPayload> {
        let mut last_error: Option<Error> = None;

        for (position, strategy) in self.strategies.iter().enumerate() {
            debug!(
                stage = "read.attempt",
                strategy = strategy.name(),
                position = position + 1,
                reference = %reference,
                "Trying read strategy"
            );

            match strategy.read(reference).await {
                Ok(payload) if payload.size() > 0 => {
                    info!(
                        stage = "read.result",
                        strategy = strategy.name(),
                        reference = %reference,
                        size_bytes = payload.size(),
                        mime_type = payload.mime_type(),
                        "Read image bytes"
                    );
                    return Ok(payload);
                }
                Ok(_) => {
                    last_error = Some(Error::strategy(
                        strategy.name(),
                        "produced 0 bytes",
                        ErrorKind::Transient,
                    ));
                }
                Err(e) if e.kind() == ErrorKind::Permission => {
                    warn!(
                        stage = "read.attempt",
                        strategy = strategy.name(),
                        reference = %reference,
                        error = %e,
                        "Read refused by platform permissions"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        stage = "read.attempt",
                        strategy = strategy.name(),
                        reference = %reference,
                        error = %e,
                        "Read strategy failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let (message, kind) = match last_error {
            Some(e) => (e.to_string(), e.kind()),
            None => (
                "no read strategies configured".to_string(),
                ErrorKind::Permanent,
            ),
        };
        Err(Error::Read {
            reference: reference.to_string(),
            message,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn jpeg_bytes(len: usize) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.resize(len, 0x11);
        bytes
    }

    #[tokio::test]
    async fn test_first_successful_strategy_wins() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let reader = BinaryReader::new(vec![
            Box::new(
                MockReadStrategy::new("first")
                    .with_outcome(MockRead::bytes(vec![1, 2, 3]))
                    .with_call_log(log.clone()),
            ),
            Box::new(MockReadStrategy::new("second").with_call_log(log.clone())),
        ]);

        let payload = reader
            .read_binary(&ImageReference::new("file:///a.jpg"))
            .await
            .unwrap();
        assert_eq!(payload.size(), 3);
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }

    #[tokio::test]
    async fn test_fallback_order_and_aggregate_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let reader = BinaryReader::new(vec![
            Box::new(
                MockReadStrategy::new("file_info")
                    .with_outcome(MockRead::fail("file reports 0 bytes", ErrorKind::Transient))
                    .with_call_log(log.clone()),
            ),
            Box::new(
                MockReadStrategy::new("streaming_request")
                    .with_outcome(MockRead::fail("timed out after 10s", ErrorKind::Transient))
                    .with_call_log(log.clone()),
            ),
            Box::new(
                MockReadStrategy::new("buffered_fetch")
                    .with_outcome(MockRead::fail("status 404", ErrorKind::Permanent))
                    .with_call_log(log.clone()),
            ),
        ]);

        let err = reader
            .read_binary(&ImageReference::new("file:///a.jpg"))
            .await
            .unwrap_err();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["file_info", "streaming_request", "buffered_fetch"]
        );
        match err {
            Error::Read { message, kind, .. } => {
                assert!(message.contains("buffered_fetch"));
                assert!(message.contains("status 404"));
                assert_eq!(kind, ErrorKind::Permanent);
            }
            other => panic!("expected read error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_permission_failure_stops_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let reader = BinaryReader::new(vec![
            Box::new(
                MockReadStrategy::new("file_info")
                    .with_outcome(MockRead::fail("photo library denied", ErrorKind::Permission))
                    .with_call_log(log.clone()),
            ),
            Box::new(MockReadStrategy::new("streaming_request").with_call_log(log.clone())),
        ]);

        let err = reader
            .read_binary(&ImageReference::new("file:///a.jpg"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(*log.lock().unwrap(), vec!["file_info"]);
    }

    #[tokio::test]
    async fn test_empty_reader_fails() {
        let reader = BinaryReader::new(Vec::new());
        let err = reader
            .read_binary(&ImageReference::new("file:///a.jpg"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no read strategies"));
    }

    #[tokio::test]
    async fn test_missing_file_falls_through_to_streaming_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(jpeg_bytes(512)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reference = ImageReference::new(format!("{}/bike42.jpg", server.uri()));
        let files = MockFileAccess::new().with_info(
            reference.as_str(),
            ResourceInfo {
                exists: false,
                size: None,
            },
        );
        let reader = BinaryReader::with_defaults(
            Arc::new(files.clone()),
            reqwest::Client::new(),
            Duration::from_secs(10),
        );

        let payload = reader.read_binary(&reference).await.unwrap();
        assert_eq!(payload.size(), 512);
        assert_eq!(payload.mime_type(), "image/jpeg");
        assert_eq!(files.get_read_count(), 0);
    }

    #[tokio::test]
    async fn test_streaming_timeout_falls_through_to_buffered_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(jpeg_bytes(64))
                    .set_delay(Duration::from_millis(500)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(jpeg_bytes(64)))
            .mount(&server)
            .await;

        let reference = ImageReference::new(format!("{}/slow.jpg", server.uri()));
        let files = MockFileAccess::new().with_info(
            reference.as_str(),
            ResourceInfo {
                exists: true,
                size: Some(0),
            },
        );
        let reader = BinaryReader::with_defaults(
            Arc::new(files),
            reqwest::Client::new(),
            Duration::from_millis(50),
        );

        let payload = reader.read_binary(&reference).await.unwrap();
        assert_eq!(payload.size(), 64);
        assert_eq!(payload.mime_type(), "image/jpeg");
    }

    #[test]
    fn test_default_strategy_order() {
        let reader = BinaryReader::with_defaults(
            Arc::new(MockFileAccess::new()),
            reqwest::Client::new(),
            Duration::from_secs(10),
        );
        assert_eq!(
            reader.strategy_names(),
            vec!["file_info", "streaming_request", "buffered_fetch"]
        );
    }
}
