use super::orchestrator::UploadOrchestrator;
use crate::models::{BatchItem, UploadResult};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Uploads many images for one entity with a cap on in-flight uploads.
pub struct BatchUploader {
    orchestrator: Arc<UploadOrchestrator>,
    concurrency: usize,
}

impl BatchUploader {
    pub fn new(orchestrator: Arc<UploadOrchestrator>, concurrency: usize) -> Self {
        Self {
            orchestrator,
            concurrency: concurrency.max(1),
        }
    }

    /// Returns the URLs of the items that made it, in item order.
    ///
    /// Failed items are dropped and counted in the logs; one item failing
    /// never stops the others.
    pub async fn upload_batch(&self, entity_id: &str, items: Vec<BatchItem>) -> Vec<String> {
        let total = items.len();
        let batch_id = Uuid::new_v4();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        info!(
            stage = "batch.start",
            batch_id = %batch_id,
            entity_id = %entity_id,
            items = total,
            concurrency = self.concurrency,
            "Starting batch upload"
        );

        let handles: Vec<_> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let orchestrator = Arc::clone(&self.orchestrator);
                let semaphore = Arc::clone(&semaphore);
                let item_entity = format!("{}_{}", entity_id, index);
                tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            error!(batch_id = %batch_id, index, "Batch semaphore closed: {}", e);
                            return None;
                        }
                    };
                    upload_item(&orchestrator, &item_entity, item).await
                })
            })
            .collect();

        let mut urls = Vec::with_capacity(total);
        for (index, joined) in futures_util::future::join_all(handles)
            .await
            .into_iter()
            .enumerate()
        {
            match joined {
                Ok(Some(url)) => urls.push(url),
                Ok(None) => {}
                Err(e) => {
                    error!(batch_id = %batch_id, index, "Upload task aborted: {}", e);
                }
            }
        }

        let failed = total - urls.len();
        if failed > 0 {
            warn!(
                stage = "batch.result",
                batch_id = %batch_id,
                entity_id = %entity_id,
                succeeded = urls.len(),
                failed,
                "Batch upload finished with failures"
            );
        } else {
            info!(
                stage = "batch.result",
                batch_id = %batch_id,
                entity_id = %entity_id,
                succeeded = urls.len(),
                "Batch upload finished"
            );
        }

        urls
    }
}

/// Primary reference upload, then the base64 side channel if one came along.
async fn upload_item(
    orchestrator: &UploadOrchestrator,
    entity_id: &str,
    item: BatchItem,
) -> Option<String> {
    let failure = match orchestrator.upload(&item.reference, entity_id).await {
        UploadResult::Success(image) => return Some(image.url),
        UploadResult::Failure(failure) => failure,
    };

    let encoded = match item.base64 {
        Some(encoded) => encoded,
        None => {
            warn!(
                reference = %item.reference,
                error = %failure.message,
                "Dropping image from batch"
            );
            return None;
        }
    };

    warn!(
        reference = %item.reference,
        error = %failure.message,
        "Reference upload failed, trying base64 copy"
    );
    match orchestrator.upload_base64(&encoded, entity_id).await {
        UploadResult::Success(image) => Some(image.url),
        UploadResult::Failure(fallback) => {
            warn!(
                reference = %item.reference,
                error = %fallback.message,
                "Base64 upload failed too, dropping image from batch"
            );
            None
        }
    }
}
