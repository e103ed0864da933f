use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use std::time::Duration;

use crate::config::StorageConfig;

/// External object store holding shipment images and verification documents.
/// Clients upload and download directly through presigned URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String>;
    async fn presign_put(&self, key: &str, content_type: &str, seconds: u64) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(Duration::from_secs(seconds))?)
            .await
            .context("s3 presign_get")?;
        Ok(presigned.uri().to_string())
    }

    async fn presign_put(&self, key: &str, content_type: &str, seconds: u64) -> anyhow::Result<String> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(PresigningConfig::expires_in(Duration::from_secs(seconds))?)
            .await
            .context("s3 presign_put")?;
        Ok(presigned.uri().to_string())
    }
}
