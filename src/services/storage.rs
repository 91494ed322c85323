use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

use crate::error::PipelineError;
use crate::services::pipeline::ArtifactStore;

/// Client for Cloudflare R2 object storage (S3-compatible).
pub struct R2Client {
    bucket: Box<Bucket>,
    public_base_url: String,
}

impl R2Client {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        public_base_url: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Public URL an uploaded object is served from.
    pub fn locator(&self, key: &str) -> String {
        public_locator(&self.public_base_url, key)
    }
}

pub(crate) fn public_locator(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

#[async_trait]
impl ArtifactStore for R2Client {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, PipelineError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, &bytes, content_type)
            .await
            .map_err(|e| PipelineError::Transient(format!("upload of {key} failed: {e}")))?;

        match response.status_code() {
            200..=299 => Ok(self.locator(key)),
            code if code == 429 || code >= 500 => Err(PipelineError::Transient(format!(
                "upload of {key} returned {code}"
            ))),
            code => Err(PipelineError::Permanent(format!(
                "upload of {key} rejected with {code}"
            ))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage configuration error: {0}")]
    Config(String),
}
