//! S3-compatible object store backed by `aws-sdk-s3`.

use std::sync::Arc;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use tracing::{debug, info};

use uposs_core::defaults::STORAGE_REGION;
use uposs_core::{Config, Error, Result};

use crate::object_store::{ObjectStore, ObjectStoreProvider};

/// Object store talking to an S3-compatible service with static
/// credentials and path-style addressing.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    region: String,
}

impl S3ObjectStore {
    /// Build a client for the storage fields of `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(Error::Config("storage endpoint is not configured".into()));
        }
        if config.access_key_id.is_empty() || config.secret_access_key.is_empty() {
            return Err(Error::Config("storage credentials are not configured".into()));
        }

        let region = if config.region.trim().is_empty() {
            STORAGE_REGION.to_string()
        } else {
            config.region.trim().to_string()
        };
        let credentials = Credentials::from_keys(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
        );
        let endpoint_url = config.endpoint_url();

        let s3_config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .endpoint_url(&endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        info!(
            subsystem = "remote",
            component = "s3",
            endpoint = %endpoint_url,
            region = %region,
            "Initializing object store client"
        );

        Ok(Self {
            client: Client::from_conf(s3_config),
            region,
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| Error::Storage(format!("list buckets: {}", DisplayErrorContext(&e))))?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                    || err
                        .raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);
                if not_found {
                    Ok(false)
                } else {
                    Err(Error::Storage(format!(
                        "head bucket {bucket}: {}",
                        DisplayErrorContext(&err)
                    )))
                }
            }
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != STORAGE_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request.send().await.map_err(|e| {
            Error::Storage(format!("create bucket {bucket}: {}", DisplayErrorContext(&e)))
        })?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let len = body.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| Error::Storage(format!("put {bucket}/{key}: {}", DisplayErrorContext(&e))))?;
        debug!(
            subsystem = "remote",
            component = "s3",
            op = "put_object",
            bucket,
            key,
            bytes = len,
            "Object stored"
        );
        Ok(())
    }
}

/// Provider building an [`S3ObjectStore`] from each cycle's configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct S3Provider;

impl ObjectStoreProvider for S3Provider {
    fn connect(&self, config: &Config) -> Result<Arc<dyn ObjectStore>> {
        Ok(Arc::new(S3ObjectStore::from_config(config)?))
    }
}
