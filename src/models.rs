//! Data models and structures
//!
//! Defines image references, payloads, upload outcomes and the runtime
//! configuration loaded from the environment.

use crate::error::ErrorKind;
use crate::{Error, Result};
use bytes::Bytes;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Opaque local handle to image bytes that have not been uploaded yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageReference(String);

/// Where an [`ImageReference`] points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedReference {
    Local(PathBuf),
    Remote(Url),
    Unsupported,
}

impl ImageReference {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resolve(&self) -> ResolvedReference {
        match Url::parse(&self.0) {
            Ok(url) => match url.scheme() {
                "file" => url
                    .to_file_path()
                    .map(ResolvedReference::Local)
                    .unwrap_or(ResolvedReference::Unsupported),
                "http" | "https" => ResolvedReference::Remote(url),
                // Windows drive letters parse as one-letter schemes
                scheme if scheme.len() == 1 => ResolvedReference::Local(PathBuf::from(&self.0)),
                _ => ResolvedReference::Unsupported,
            },
            Err(_) if !self.0.is_empty() => ResolvedReference::Local(PathBuf::from(&self.0)),
            Err(_) => ResolvedReference::Unsupported,
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageReference {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

impl From<String> for ImageReference {
    fn from(uri: String) -> Self {
        Self(uri)
    }
}

/// Raw bytes read from a reference. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryPayload {
    bytes: Bytes,
    mime_type: String,
}

impl BinaryPayload {
    /// Wraps `bytes`, rejecting an empty buffer.
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::Invariant("binary payload is empty".to_string()));
        }
        Ok(Self {
            bytes,
            mime_type: mime_type.into(),
        })
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

/// Non-fatal conditions observed during an otherwise successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadWarning {
    VerificationUnavailable { key: String, reason: String },
    BucketNotVisible { bucket: String },
    BucketCheckFailed { bucket: String, reason: String },
}

impl fmt::Display for UploadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadWarning::VerificationUnavailable { key, reason } => {
                write!(f, "could not verify {}: {}", key, reason)
            }
            UploadWarning::BucketNotVisible { bucket } => {
                write!(f, "bucket {} is not listed by the store", bucket)
            }
            UploadWarning::BucketCheckFailed { bucket, reason } => {
                write!(f, "could not check bucket {}: {}", bucket, reason)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub url: String,
    pub key: String,
    pub size: usize,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<UploadWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadResult {
    Success(UploadedImage),
    Failure(UploadFailure),
}

impl UploadResult {
    pub(crate) fn failed(error: &Error, attempts: u32) -> Self {
        UploadResult::Failure(UploadFailure {
            kind: error.kind(),
            message: error.to_string(),
            attempts,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadResult::Success(_))
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            UploadResult::Success(image) => Some(&image.url),
            UploadResult::Failure(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            UploadResult::Success(_) => None,
            UploadResult::Failure(failure) => Some(&failure.message),
        }
    }
}

/// URLs that made it out of a batch, plus any bucket-level warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<UploadWarning>,
}

/// One entry of a batch: a reference plus an optional base64 copy of its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub reference: ImageReference,
    pub base64: Option<String>,
}

impl BatchItem {
    pub fn new(reference: impl Into<ImageReference>) -> Self {
        Self {
            reference: reference.into(),
            base64: None,
        }
    }

    pub fn with_base64(mut self, base64: String) -> Self {
        self.base64 = Some(base64);
        self
    }
}

/// Settings consumed by the upload orchestrator.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub bucket: String,
    pub key_prefix: String,
    pub extension: String,
    pub cache_control: String,
    pub max_retries: usize,
    pub retry_base_delay: Duration,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            bucket: "bike-images".to_string(),
            key_prefix: "bike".to_string(),
            extension: "jpg".to_string(),
            cache_control: "3600".to_string(),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(1000),
        }
    }
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_access_key_id: Option<String>,
    pub storage_secret_access_key: Option<String>,
    pub storage_endpoint: Option<String>,
    pub storage_region: String,
    pub storage_public_base_url: Option<String>,
    pub upload: UploadSettings,
    pub stream_timeout: Duration,
    pub batch_concurrency: usize,
    pub dry_run: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        allow_missing_env_file(dotenvy::dotenv().map(|_| ()))?;
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dry_run = match lookup("DRY_RUN") {
            Some(value) => parse_bool("DRY_RUN", &value)?,
            None => false,
        };

        let storage_access_key_id = lookup("STORAGE_ACCESS_KEY_ID");
        let storage_secret_access_key = lookup("STORAGE_SECRET_ACCESS_KEY");
        if !dry_run {
            if storage_access_key_id.is_none() {
                return Err(Error::Config("STORAGE_ACCESS_KEY_ID not set".to_string()));
            }
            if storage_secret_access_key.is_none() {
                return Err(Error::Config(
                    "STORAGE_SECRET_ACCESS_KEY not set".to_string(),
                ));
            }
        }

        let defaults = UploadSettings::default();
        let upload = UploadSettings {
            bucket: lookup("STORAGE_BUCKET").unwrap_or(defaults.bucket),
            key_prefix: lookup("UPLOAD_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            extension: defaults.extension,
            cache_control: lookup("UPLOAD_CACHE_CONTROL").unwrap_or(defaults.cache_control),
            max_retries: parse_or(&lookup, "UPLOAD_MAX_RETRIES", defaults.max_retries)?,
            retry_base_delay: Duration::from_millis(parse_or(
                &lookup,
                "UPLOAD_RETRY_BASE_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )?),
        };

        let batch_concurrency = parse_or(&lookup, "BATCH_CONCURRENCY", 4usize)?;
        if batch_concurrency == 0 {
            return Err(Error::Config(
                "BATCH_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            storage_access_key_id,
            storage_secret_access_key,
            storage_endpoint: lookup("STORAGE_ENDPOINT"),
            storage_region: lookup("STORAGE_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            storage_public_base_url: lookup("STORAGE_PUBLIC_BASE_URL"),
            upload,
            stream_timeout: Duration::from_secs(parse_or(
                &lookup,
                "READ_STREAM_TIMEOUT_SECS",
                10u64,
            )?),
            batch_concurrency,
            dry_run,
        })
    }
}

/// A missing `.env` file is fine; one that fails to parse is not.
fn allow_missing_env_file(loaded: dotenvy::Result<()>) -> Result<()> {
    match loaded {
        Err(e) if e.not_found() => Ok(()),
        other => Ok(other?),
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has invalid value '{}'", name, value))),
        None => Ok(default),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::Config(format!(
            "{} has invalid value '{}'",
            name, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_resolve_file_uri() {
        let reference = ImageReference::new("file:///tmp/photos/bike.jpg");
        assert_eq!(
            reference.resolve(),
            ResolvedReference::Local(PathBuf::from("/tmp/photos/bike.jpg"))
        );
    }

    #[test]
    fn test_resolve_bare_path() {
        let reference = ImageReference::new("/var/cache/picker/123.jpg");
        assert_eq!(
            reference.resolve(),
            ResolvedReference::Local(PathBuf::from("/var/cache/picker/123.jpg"))
        );
    }

    #[test]
    fn test_resolve_remote_and_unsupported() {
        assert!(matches!(
            ImageReference::new("https://example.com/a.jpg").resolve(),
            ResolvedReference::Remote(_)
        ));
        assert_eq!(
            ImageReference::new("ph://ABC-123").resolve(),
            ResolvedReference::Unsupported
        );
        assert_eq!(ImageReference::new("").resolve(), ResolvedReference::Unsupported);
    }

    #[test]
    fn test_payload_rejects_empty_bytes() {
        assert!(BinaryPayload::new(Vec::new(), "image/jpeg").is_err());

        let payload = BinaryPayload::new(vec![1, 2, 3], "image/png").unwrap();
        assert_eq!(payload.size(), 3);
        assert_eq!(payload.mime_type(), "image/png");
    }

    #[test]
    fn test_upload_result_serialization() {
        let success = UploadResult::Success(UploadedImage {
            url: "https://cdn.test/bike_1_2.jpg".to_string(),
            key: "bike_1_2.jpg".to_string(),
            size: 10,
            attempts: 1,
            warnings: Vec::new(),
        });
        let json = serde_json::to_string(&success).unwrap();
        assert!(json.contains("\"status\":\"success\""));
        assert!(!json.contains("warnings"));
        assert_eq!(success.url(), Some("https://cdn.test/bike_1_2.jpg"));

        let failure = UploadResult::failed(&Error::Permission("camera roll".to_string()), 1);
        let json = serde_json::to_string(&failure).unwrap();
        assert!(json.contains("\"status\":\"failure\""));
        assert!(json.contains("\"kind\":\"permission\""));
        assert!(failure.url().is_none());
    }

    #[test]
    fn test_config_requires_credentials_unless_dry_run() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("STORAGE_ACCESS_KEY_ID"));

        let config = Config::from_lookup(lookup_from(&[("DRY_RUN", "true")])).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.upload.bucket, "bike-images");
        assert_eq!(config.upload.max_retries, 2);
        assert_eq!(config.upload.retry_base_delay, Duration::from_millis(1000));
        assert_eq!(config.stream_timeout, Duration::from_secs(10));
        assert_eq!(config.batch_concurrency, 4);
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("STORAGE_ACCESS_KEY_ID", "id"),
            ("STORAGE_SECRET_ACCESS_KEY", "secret"),
            ("STORAGE_BUCKET", "fleet"),
            ("UPLOAD_MAX_RETRIES", "5"),
            ("BATCH_CONCURRENCY", "2"),
            ("READ_STREAM_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();

        assert!(!config.dry_run);
        assert_eq!(config.upload.bucket, "fleet");
        assert_eq!(config.upload.max_retries, 5);
        assert_eq!(config.batch_concurrency, 2);
        assert_eq!(config.stream_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_config_rejects_bad_numbers() {
        let err = Config::from_lookup(lookup_from(&[
            ("DRY_RUN", "1"),
            ("BATCH_CONCURRENCY", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BATCH_CONCURRENCY"));

        let err = Config::from_lookup(lookup_from(&[("DRY_RUN", "1"), ("BATCH_CONCURRENCY", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_missing_env_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let loaded = dotenvy::from_path(dir.path().join(".env"));
        assert!(allow_missing_env_file(loaded).is_ok());
    }

    #[test]
    fn test_malformed_env_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, ".STORAGE_BUCKET=fleet\n").unwrap();

        let err = allow_missing_env_file(dotenvy::from_path(&path)).unwrap_err();
        assert!(matches!(err, Error::EnvVar(_)));
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }
}
