use super::key::KeyGenerator;
use super::retry::LinearBackoff;
use crate::mime::detect_image_mime;
use crate::models::{
    BinaryPayload, ImageReference, UploadResult, UploadSettings, UploadWarning, UploadedImage,
};
use crate::reader::BinaryReader;
use crate::store::{ObjectStore, StoreOptions};
use crate::{Error, Result};
use base64::Engine as _;
use percent_encoding::percent_decode_str;
use reqwest::Url;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_retry::RetryIf;
use tracing::{debug, error, info, warn};

/// Reads, stores, verifies and publishes one image at a time.
pub struct UploadOrchestrator {
    reader: BinaryReader,
    store: Arc<dyn ObjectStore>,
    keys: KeyGenerator,
    settings: UploadSettings,
}

impl UploadOrchestrator {
    pub fn new(reader: BinaryReader, store: Arc<dyn ObjectStore>, settings: UploadSettings) -> Self {
        Self {
            reader,
            store,
            keys: KeyGenerator::new(&settings.key_prefix, &settings.extension),
            settings,
        }
    }

    /// Uploads the image behind `reference` for `entity_id`.
    ///
    /// The whole read/store/verify sequence is retried on transient errors
    /// with linear backoff; anything else fails on the spot.
    pub async fn upload(&self, reference: &ImageReference, entity_id: &str) -> UploadResult {
        let attempts = AtomicU32::new(0);
        let delays = LinearBackoff::new(self.settings.retry_base_delay).take(self.settings.max_retries);

        let outcome = RetryIf::start(
            delays,
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                self.attempt_upload(reference, entity_id, attempt)
            },
            |e: &Error| {
                let transient = e.is_transient();
                if transient {
                    warn!(
                        stage = "upload.retry",
                        reference = %reference,
                        attempt = attempts.load(Ordering::SeqCst),
                        max_attempts = self.settings.max_retries + 1,
                        error = %e,
                        "Transient upload failure"
                    );
                }
                transient
            },
        )
        .await;

        let attempts = attempts.load(Ordering::SeqCst);
        match outcome {
            Ok(mut image) => {
                image.attempts = attempts;
                UploadResult::Success(image)
            }
            Err(e) => {
                error!(
                    stage = "upload.result",
                    reference = %reference,
                    entity_id = %entity_id,
                    attempts,
                    kind = ?e.kind(),
                    error = %e,
                    "Upload failed"
                );
                UploadResult::failed(&e, attempts)
            }
        }
    }

    /// Uploads an already base64-encoded image, bypassing the reader.
    ///
    /// A `data:<mime>;base64,` prefix is honored. Not retried.
    pub async fn upload_base64(&self, encoded: &str, entity_id: &str) -> UploadResult {
        let result = async {
            let payload = decode_base64_payload(encoded)?;
            let key = self.keys.next_key(entity_id);
            info!(
                stage = "upload.attempt",
                entity_id = %entity_id,
                key = %key,
                size_bytes = payload.size(),
                "Uploading base64 image"
            );
            self.store_payload(&payload, &key).await
        }
        .await;

        match result {
            Ok(image) => UploadResult::Success(image),
            Err(e) => {
                error!(
                    stage = "upload.result",
                    entity_id = %entity_id,
                    error = %e,
                    "Base64 upload failed"
                );
                UploadResult::failed(&e, 1)
            }
        }
    }

    /// Removes a previously uploaded image given its public URL.
    pub async fn delete_image(&self, url: &str) -> Result<()> {
        let base = self.store.public_url(&self.settings.bucket, "");
        let key = key_from_url(url, &base)?;
        self.store.remove_object(&self.settings.bucket, &key).await?;
        info!(bucket = %self.settings.bucket, key = %key, "Deleted image");
        Ok(())
    }

    /// Public URLs of every stored image for `entity_id`, batch items included.
    pub async fn list_entity_images(&self, entity_id: &str) -> Result<Vec<String>> {
        let prefix = self.keys.entity_prefix(entity_id);
        let objects = self
            .store
            .list_objects(&self.settings.bucket, &prefix)
            .await?;
        Ok(objects
            .iter()
            .map(|object| self.store.public_url(&self.settings.bucket, &object.name))
            .collect())
    }

    /// Advisory check that the configured bucket is visible. Never creates it.
    pub async fn check_bucket(&self) -> Option<UploadWarning> {
        let bucket = &self.settings.bucket;
        let warning = match self.store.list_buckets().await {
            Ok(buckets) if buckets.iter().any(|b| &b.name == bucket) => {
                debug!(bucket = %bucket, "Bucket is visible");
                return None;
            }
            Ok(_) => UploadWarning::BucketNotVisible {
                bucket: bucket.clone(),
            },
            Err(e) => UploadWarning::BucketCheckFailed {
                bucket: bucket.clone(),
                reason: e.to_string(),
            },
        };
        warn!(bucket = %bucket, warning = %warning, "Bucket check did not pass, continuing");
        Some(warning)
    }

    async fn attempt_upload(
        &self,
        reference: &ImageReference,
        entity_id: &str,
        attempt: u32,
    ) -> Result<UploadedImage> {
        info!(
            stage = "upload.attempt",
            reference = %reference,
            entity_id = %entity_id,
            attempt,
            "Uploading image"
        );

        let payload = self.reader.read_binary(reference).await?;
        let key = self.keys.next_key(entity_id);
        self.store_payload(&payload, &key).await
    }

    async fn store_payload(&self, payload: &BinaryPayload, key: &str) -> Result<UploadedImage> {
        let bucket = &self.settings.bucket;
        let options = StoreOptions {
            content_type: payload.mime_type().to_string(),
            cache_control: self.settings.cache_control.clone(),
            upsert: false,
        };

        self.store
            .store_object(bucket, key, payload.bytes().clone(), &options)
            .await
            .map_err(|e| match e {
                Error::StoreWrite { .. } => e,
                other => Error::StoreWrite {
                    message: other.to_string(),
                    kind: other.kind(),
                },
            })?;

        let warnings: Vec<UploadWarning> = self.verify(key).await?.into_iter().collect();

        let url = self.store.public_url(bucket, key);
        info!(
            stage = "upload.result",
            key = %key,
            url = %url,
            size_bytes = payload.size(),
            "Image uploaded"
        );

        Ok(UploadedImage {
            url,
            key: key.to_string(),
            size: payload.size(),
            attempts: 1,
            warnings,
        })
    }

    /// Fails on an object the store lists as 0 bytes; listing trouble is only a warning.
    async fn verify(&self, key: &str) -> Result<Option<UploadWarning>> {
        let objects = match self.store.list_objects(&self.settings.bucket, key).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!(
                    stage = "verify.result",
                    key = %key,
                    error = %e,
                    "Verification unavailable, continuing"
                );
                return Ok(Some(UploadWarning::VerificationUnavailable {
                    key: key.to_string(),
                    reason: e.to_string(),
                }));
            }
        };

        match objects.iter().find(|object| object.name == key) {
            Some(object) if object.size == Some(0) => {
                error!(stage = "verify.result", key = %key, "Store reports a 0-byte object");
                Err(Error::ZeroByte {
                    key: key.to_string(),
                })
            }
            Some(object) => {
                debug!(stage = "verify.result", key = %key, size_bytes = ?object.size, "Verified");
                Ok(None)
            }
            None => {
                warn!(stage = "verify.result", key = %key, "Object not listed yet, continuing");
                Ok(Some(UploadWarning::VerificationUnavailable {
                    key: key.to_string(),
                    reason: "object not listed".to_string(),
                }))
            }
        }
    }
}

fn decode_base64_payload(encoded: &str) -> Result<BinaryPayload> {
    let encoded = encoded.trim();
    let (declared_mime, data) = match encoded.strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((header, data)) => (
                header
                    .strip_suffix(";base64")
                    .filter(|mime| !mime.is_empty())
                    .map(str::to_string),
                data,
            ),
            None => (None, rest),
        },
        None => (None, encoded),
    };

    let bytes = base64::engine::general_purpose::STANDARD.decode(data)?;
    if bytes.is_empty() {
        return Err(Error::Invariant("base64 payload decoded to 0 bytes".to_string()));
    }
    let mime = declared_mime.unwrap_or_else(|| detect_image_mime(&bytes).to_string());
    BinaryPayload::new(bytes, mime)
}

/// Recovers the object key from a public URL issued under `base`.
///
/// Everything after the base path is the key, so prefixes containing `/`
/// survive, and percent escapes are decoded back to the stored characters.
fn key_from_url(url: &str, base: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| Error::Invariant(format!("Invalid image URL {}: {}", url, e)))?;
    let base = Url::parse(base)
        .map_err(|e| Error::Invariant(format!("Invalid public URL base {}: {}", base, e)))?;

    let encoded_key = Some(parsed.path())
        .filter(|_| parsed.origin() == base.origin())
        .and_then(|path| path.strip_prefix(base.path()))
        .ok_or_else(|| Error::Invariant(format!("Image URL {} is not served from {}", url, base)))?;

    let key = percent_decode_str(encoded_key)
        .decode_utf8()
        .map_err(|e| Error::Invariant(format!("Image URL {} has an invalid key: {}", url, e)))?;
    if key.is_empty() {
        return Err(Error::Invariant(format!("Image URL has no file name: {}", url)));
    }
    Ok(key.into_owned())
}
