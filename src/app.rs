//! Application wiring from configuration to upload services.

use crate::models::{
    BatchItem, BatchOutcome, Config, ImageReference, UploadResult, UploadWarning,
};
use crate::reader::{BinaryReader, LocalFileAccess};
use crate::store::{MockObjectStore, ObjectStore, S3ObjectStore};
use crate::upload::{BatchUploader, UploadOrchestrator};
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Front door for the CLI: batch uploads, base64 uploads, listing and deletion.
pub struct App {
    orchestrator: Arc<UploadOrchestrator>,
    batch: BatchUploader,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub reader: BinaryReader,
    pub store: Arc<dyn ObjectStore>,
}

impl App {
    /// Build an app from concrete service dependencies.
    pub fn with_services(services: AppServices, config: &Config) -> Self {
        let orchestrator = Arc::new(UploadOrchestrator::new(
            services.reader,
            services.store,
            config.upload.clone(),
        ));
        let batch = BatchUploader::new(Arc::clone(&orchestrator), config.batch_concurrency);
        Self {
            orchestrator,
            batch,
        }
    }

    /// Construct an app from environment configuration (`Config::from_env`).
    pub async fn new() -> Result<Self> {
        let config = Config::from_env()?;
        Self::from_config(&config).await
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = if config.dry_run {
            info!("DRY_RUN enabled, uploads go to an in-memory store");
            Arc::new(MockObjectStore::new().with_buckets(vec![config.upload.bucket.clone()]))
        } else {
            let access_key_id = config.storage_access_key_id.clone().ok_or_else(|| {
                Error::Config("STORAGE_ACCESS_KEY_ID not set".to_string())
            })?;
            let secret_access_key = config.storage_secret_access_key.clone().ok_or_else(|| {
                Error::Config("STORAGE_SECRET_ACCESS_KEY not set".to_string())
            })?;
            Arc::new(
                S3ObjectStore::new(
                    access_key_id,
                    secret_access_key,
                    config.storage_endpoint.clone(),
                    config.storage_region.clone(),
                    config.storage_public_base_url.clone(),
                )
                .await?,
            )
        };

        let reader = BinaryReader::with_defaults(
            Arc::new(LocalFileAccess::new()),
            reqwest::Client::new(),
            config.stream_timeout,
        );

        info!(
            bucket = %config.upload.bucket,
            max_retries = config.upload.max_retries,
            batch_concurrency = config.batch_concurrency,
            "Upload pipeline ready"
        );

        Ok(Self::with_services(AppServices { reader, store }, config))
    }

    pub async fn check_bucket(&self) -> Option<UploadWarning> {
        self.orchestrator.check_bucket().await
    }

    pub async fn upload(&self, reference: &ImageReference, entity_id: &str) -> UploadResult {
        self.orchestrator.upload(reference, entity_id).await
    }

    /// Uploads every reference for `entity_id`; returns the URLs that made it.
    pub async fn upload_references(&self, entity_id: &str, references: &[String]) -> BatchOutcome {
        let warnings = self.orchestrator.check_bucket().await.into_iter().collect();
        let items = references
            .iter()
            .map(|reference| BatchItem::new(reference.as_str()))
            .collect();
        BatchOutcome {
            urls: self.batch.upload_batch(entity_id, items).await,
            warnings,
        }
    }

    /// Uploads the base64 text stored in `path`.
    pub async fn upload_base64_file(&self, entity_id: &str, path: &Path) -> Result<UploadResult> {
        let encoded = tokio::fs::read_to_string(path).await?;
        Ok(self.orchestrator.upload_base64(&encoded, entity_id).await)
    }

    pub async fn list(&self, entity_id: &str) -> Result<Vec<String>> {
        self.orchestrator.list_entity_images(entity_id).await
    }

    pub async fn delete(&self, url: &str) -> Result<()> {
        self.orchestrator.delete_image(url).await
    }
}
