use super::{Encoding, FileAccess, ReadStrategy, ResourceInfo};
use crate::error::ErrorKind;
use crate::models::{BinaryPayload, ImageReference};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Default)]
struct MockFile {
    info: Option<ResourceInfo>,
    contents: Option<Vec<u8>>,
}

#[derive(Clone)]
pub struct MockFileAccess {
    files: Arc<Mutex<HashMap<String, MockFile>>>,
    info_error: Arc<Mutex<Option<ErrorKind>>>,
    info_count: Arc<Mutex<usize>>,
    read_count: Arc<Mutex<usize>>,
}

impl MockFileAccess {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            info_error: Arc::new(Mutex::new(None)),
            info_count: Arc::new(Mutex::new(0)),
            read_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_file(self, reference: &str, contents: Vec<u8>) -> Self {
        {
            let mut files = self.files.lock().unwrap();
            let entry = files.entry(reference.to_string()).or_default();
            entry.info = Some(ResourceInfo {
                exists: true,
                size: Some(contents.len() as u64),
            });
            entry.contents = Some(contents);
        }
        self
    }

    /// Overrides what `resource_info` reports without touching the contents.
    pub fn with_info(self, reference: &str, info: ResourceInfo) -> Self {
        self.files
            .lock()
            .unwrap()
            .entry(reference.to_string())
            .or_default()
            .info = Some(info);
        self
    }

    pub fn with_info_error(self, kind: ErrorKind) -> Self {
        *self.info_error.lock().unwrap() = Some(kind);
        self
    }

    pub fn get_info_count(&self) -> usize {
        *self.info_count.lock().unwrap()
    }

    pub fn get_read_count(&self) -> usize {
        *self.read_count.lock().unwrap()
    }
}

impl Default for MockFileAccess {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileAccess for MockFileAccess {
    async fn resource_info(&self, reference: &ImageReference) -> Result<ResourceInfo> {
        *self.info_count.lock().unwrap() += 1;

        match *self.info_error.lock().unwrap() {
            Some(ErrorKind::Permission) => {
                return Err(Error::Permission(format!("mock denied {}", reference)))
            }
            Some(kind) => {
                return Err(Error::strategy(
                    "mock_file_access",
                    "mock info failure",
                    kind,
                ))
            }
            None => {}
        }

        let files = self.files.lock().unwrap();
        Ok(files
            .get(reference.as_str())
            .and_then(|file| file.info)
            .unwrap_or(ResourceInfo {
                exists: false,
                size: None,
            }))
    }

    async fn read_as_encoded_text(
        &self,
        reference: &ImageReference,
        encoding: Encoding,
    ) -> Result<String> {
        *self.read_count.lock().unwrap() += 1;

        let files = self.files.lock().unwrap();
        let contents = files
            .get(reference.as_str())
            .and_then(|file| file.contents.clone())
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", reference),
                ))
            })?;

        match encoding {
            Encoding::Base64 => Ok(base64::engine::general_purpose::STANDARD.encode(contents)),
            Encoding::Utf8 => String::from_utf8(contents)
                .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))),
        }
    }
}

/// Scripted result for one [`MockReadStrategy`] call.
#[derive(Debug, Clone)]
pub enum MockRead {
    Bytes { bytes: Vec<u8>, mime_type: String },
    Fail { message: String, kind: ErrorKind },
}

impl MockRead {
    pub fn bytes(bytes: Vec<u8>) -> Self {
        MockRead::Bytes {
            bytes,
            mime_type: "image/jpeg".to_string(),
        }
    }

    pub fn fail(message: &str, kind: ErrorKind) -> Self {
        MockRead::Fail {
            message: message.to_string(),
            kind,
        }
    }
}

/// Read strategy that plays back queued outcomes; the last one repeats.
#[derive(Clone)]
pub struct MockReadStrategy {
    name: &'static str,
    outcomes: Arc<Mutex<VecDeque<MockRead>>>,
    call_times: Arc<Mutex<Vec<Instant>>>,
    call_log: Option<Arc<Mutex<Vec<&'static str>>>>,
}

impl MockReadStrategy {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            call_times: Arc::new(Mutex::new(Vec::new())),
            call_log: None,
        }
    }

    pub fn with_outcome(self, outcome: MockRead) -> Self {
        self.outcomes.lock().unwrap().push_back(outcome);
        self
    }

    /// Records this strategy's name into a log shared with other strategies.
    pub fn with_call_log(mut self, log: Arc<Mutex<Vec<&'static str>>>) -> Self {
        self.call_log = Some(log);
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.call_times.lock().unwrap().len()
    }

    /// Gaps between consecutive calls, measured on the tokio clock.
    pub fn get_call_gaps(&self) -> Vec<Duration> {
        self.call_times
            .lock()
            .unwrap()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    fn next_outcome(&self) -> Option<MockRead> {
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.len() > 1 {
            outcomes.pop_front()
        } else {
            outcomes.front().cloned()
        }
    }
}

#[async_trait]
impl ReadStrategy for MockReadStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn read(&self, _reference: &ImageReference) -> Result<BinaryPayload> {
        self.call_times.lock().unwrap().push(Instant::now());
        if let Some(log) = &self.call_log {
            log.lock().unwrap().push(self.name);
        }

        match self.next_outcome() {
            Some(MockRead::Bytes { bytes, mime_type }) => BinaryPayload::new(bytes, mime_type),
            Some(MockRead::Fail { message, kind }) => Err(Error::strategy(self.name, message, kind)),
            None => Err(Error::strategy(
                self.name,
                "no outcome scripted",
                ErrorKind::Permanent,
            )),
        }
    }
}
