use super::{Encoding, FileAccess, ResourceInfo};
use crate::models::{ImageReference, ResolvedReference};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use std::path::PathBuf;

/// [`FileAccess`] over the local filesystem via `tokio::fs`.
#[derive(Debug, Clone, Default)]
pub struct LocalFileAccess;

impl LocalFileAccess {
    pub fn new() -> Self {
        Self
    }

    fn local_path(reference: &ImageReference) -> Result<PathBuf> {
        match reference.resolve() {
            ResolvedReference::Local(path) => Ok(path),
            _ => Err(Error::UnsupportedReference(format!(
                "{} is not a local file",
                reference
            ))),
        }
    }
}

#[async_trait]
impl FileAccess for LocalFileAccess {
    async fn resource_info(&self, reference: &ImageReference) -> Result<ResourceInfo> {
        let path = Self::local_path(reference)?;
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(ResourceInfo {
                exists: true,
                size: Some(metadata.len()),
            }),
            Ok(_) => Ok(ResourceInfo {
                exists: false,
                size: None,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ResourceInfo {
                exists: false,
                size: None,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(
                Error::Permission(format!("cannot stat {}: {}", path.display(), e)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_as_encoded_text(
        &self,
        reference: &ImageReference,
        encoding: Encoding,
    ) -> Result<String> {
        let path = Self::local_path(reference)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                Error::Permission(format!("cannot read {}: {}", path.display(), e))
            } else {
                Error::Io(e)
            }
        })?;

        match encoding {
            Encoding::Base64 => Ok(base64::engine::general_purpose::STANDARD.encode(&bytes)),
            Encoding::Utf8 => String::from_utf8(bytes).map_err(|e| {
                Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            }),
        }
    }
}
