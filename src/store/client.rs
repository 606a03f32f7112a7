use super::{BucketInfo, ObjectStore, StoreOptions, StoredObject};
use crate::error::ErrorKind;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use std::time::Instant;

pub struct S3ObjectStore {
    client: S3Client,
    endpoint: Option<String>,
    region: String,
    public_base_url: Option<String>,
}

impl S3ObjectStore {
    /// Builds a client for AWS S3 or, when `endpoint` is set, any
    /// S3-compatible store (path-style addressing).
    pub async fn new(
        access_key_id: String,
        secret_access_key: String,
        endpoint: Option<String>,
        region: String,
        public_base_url: Option<String>,
    ) -> Result<Self> {
        let credentials =
            Credentials::new(access_key_id, secret_access_key, None, None, "bike-image-uploader");

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.clone()));
        if let Some(endpoint) = &endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(endpoint.is_some())
            .build();

        Ok(Self {
            client: S3Client::from_conf(s3_config),
            endpoint,
            region,
            public_base_url,
        })
    }
}

fn build_public_url(
    public_base_url: Option<&str>,
    endpoint: Option<&str>,
    region: &str,
    bucket: &str,
    key: &str,
) -> String {
    match (public_base_url, endpoint) {
        (Some(base), _) => format!("{}/{}", base.trim_end_matches('/'), key),
        (None, Some(endpoint)) => {
            format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key)
        }
        (None, None) => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, region, key),
    }
}

/// A bare number of seconds becomes `max-age=<n>`; anything else passes through.
fn cache_control_header(value: &str) -> String {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        format!("max-age={}", value)
    } else {
        value.to_string()
    }
}

fn sdk_error_kind<E>(error: &SdkError<E, HttpResponse>) -> ErrorKind {
    match error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ErrorKind::Transient
        }
        SdkError::ServiceError(service) => match service.raw().status().as_u16() {
            429 | 500..=599 => ErrorKind::Transient,
            _ => ErrorKind::Permanent,
        },
        _ => ErrorKind::Permanent,
    }
}

fn sdk_status<E>(error: &SdkError<E, HttpResponse>) -> Option<u16> {
    error.raw_response().map(|raw| raw.status().as_u16())
}

fn store_error<E>(action: &str, error: SdkError<E, HttpResponse>) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::Store {
        kind: sdk_error_kind(&error),
        message: format!("Failed to {}: {}", action, DisplayErrorContext(&error)),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn store_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &StoreOptions,
    ) -> Result<()> {
        let size = data.len();
        let start = Instant::now();

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(&options.content_type)
            .cache_control(cache_control_header(&options.cache_control));
        if !options.upsert {
            request = request.if_none_match("*");
        }

        request.send().await.map_err(|e| {
            tracing::error!(
                error = %DisplayErrorContext(&e),
                bucket = %bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_millis() as u64,
                "Object upload failed"
            );
            let kind = sdk_error_kind(&e);
            let message = match sdk_status(&e) {
                Some(409) | Some(412) => format!("object {} already exists", key),
                _ => format!("Failed to upload {}: {}", key, DisplayErrorContext(&e)),
            };
            Error::StoreWrite { message, kind }
        })?;

        tracing::debug!(
            bucket = %bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_millis() as u64,
            "Object upload accepted"
        );
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, search_prefix: &str) -> Result<Vec<StoredObject>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(search_prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| store_error("list objects", e))?;

            objects.extend(output.contents().iter().filter_map(|object| {
                object.key().map(|name| StoredObject {
                    name: name.to_string(),
                    size: object.size().map(|size| size.max(0) as u64),
                })
            }));

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(objects)
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        build_public_url(
            self.public_base_url.as_deref(),
            self.endpoint.as_deref(),
            &self.region,
            bucket,
            key,
        )
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error("delete object", e))?;
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| store_error("list buckets", e))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name())
            .map(|name| BucketInfo {
                name: name.to_string(),
            })
            .collect())
    }
}
