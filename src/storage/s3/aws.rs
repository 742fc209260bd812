// src/storage/s3/aws.rs
//! AWS SDK bucket client

use crate::storage::s3::client::{
    BucketClient, BucketError, BucketResult, CompletedPart, MultipartUploadInfo, ObjectInfo,
};
use crate::utils::config::S3Config;
use crate::utils::errors::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, ObjectCannedAcl};
use aws_sdk_s3::Client as AwsS3Client;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Bucket client talking to S3 or an S3-compatible endpoint
#[derive(Clone)]
pub struct AwsBucketClient {
    client: AwsS3Client,
    bucket: String,
    acl: Option<ObjectCannedAcl>,
}

impl AwsBucketClient {
    pub async fn new(config: &S3Config) -> Result<Self> {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "sshaudit-static",
        );
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if config.path_style_access {
            builder = builder.force_path_style(true);
        }

        info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            "S3 bucket client created"
        );

        Ok(Self {
            client: AwsS3Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            acl: config.acl.as_deref().map(ObjectCannedAcl::from),
        })
    }
}

fn sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> BucketError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let retryable = !matches!(err, SdkError::ConstructionFailure(_));
    BucketError {
        message: format!("{} failed: {}", operation, DisplayErrorContext(&err)),
        retryable,
    }
}

#[async_trait]
impl BucketClient for AwsBucketClient {
    async fn create_multipart_upload(
        &self,
        key: &str,
        metadata: &HashMap<String, String>,
    ) -> BucketResult<String> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_metadata(Some(metadata.clone()))
            .set_acl(self.acl.clone())
            .send()
            .await
            .map_err(|e| sdk_error("create multipart upload", e))?;

        response
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| BucketError::retryable("no upload id returned"))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> BucketResult<String> {
        let response = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_error("upload part", e))?;

        response
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| BucketError::retryable("no ETag returned for part"))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BucketResult<()> {
        let completed: Vec<aws_sdk_s3::types::CompletedPart> = parts
            .iter()
            .map(|p| {
                aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_error("complete multipart upload", e))?;
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> BucketResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| sdk_error("abort multipart upload", e))?;
        Ok(())
    }

    async fn list_multipart_uploads(&self, prefix: &str) -> BucketResult<Vec<MultipartUploadInfo>> {
        let mut uploads = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut upload_id_marker: Option<String> = None;

        loop {
            let response = self
                .client
                .list_multipart_uploads()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_key_marker(key_marker.take())
                .set_upload_id_marker(upload_id_marker.take())
                .send()
                .await
                .map_err(|e| sdk_error("list multipart uploads", e))?;

            uploads.extend(response.uploads().iter().filter_map(|u| {
                Some(MultipartUploadInfo {
                    key: u.key()?.to_string(),
                    upload_id: u.upload_id()?.to_string(),
                })
            }));

            if !response.is_truncated().unwrap_or(false) {
                break;
            }
            key_marker = response.next_key_marker().map(str::to_string);
            upload_id_marker = response.next_upload_id_marker().map(str::to_string);
            if key_marker.is_none() && upload_id_marker.is_none() {
                break;
            }
        }
        Ok(uploads)
    }

    async fn put_object(
        &self,
        key: &str,
        path: &Path,
        size: u64,
        metadata: &HashMap<String, String>,
    ) -> BucketResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| BucketError::retryable(format!("failed to open {}: {}", path.display(), e)))?;
        let content_length = i64::try_from(size)
            .map_err(|_| BucketError::permanent(format!("object too large: {} bytes", size)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_length(content_length)
            .set_metadata(Some(metadata.clone()))
            .set_acl(self.acl.clone())
            .send()
            .await
            .map_err(|e| sdk_error("put object", e))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> BucketResult<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("get object", e))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| BucketError::retryable(format!("failed to collect object body: {}", e)))?;
        Ok(body.into_bytes())
    }

    async fn list_objects(&self) -> BucketResult<Vec<ObjectInfo>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| sdk_error("list objects", e))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );

            continuation_token = response.next_continuation_token().map(str::to_string);
            if !response.is_truncated().unwrap_or(false) || continuation_token.is_none() {
                break;
            }
        }

        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            let head = self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| sdk_error("head object", e))?;
            objects.push(ObjectInfo {
                metadata: head.metadata().cloned().unwrap_or_default(),
                key,
            });
        }
        Ok(objects)
    }
}
