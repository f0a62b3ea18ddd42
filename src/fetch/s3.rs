use crate::config::S3Settings;
use crate::fetch::{FetchError, FetchRequest, Fetcher};
use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::path::PathBuf;
use tracing::info;

/// Downloads source files from S3 (or an S3-compatible endpoint) into the
/// configured download directory. No retries: any failure ends the run.
#[derive(Clone, Debug)]
pub struct S3Fetcher {
    settings: S3Settings,
}

impl S3Fetcher {
    pub fn new(settings: S3Settings) -> Self {
        Self { settings }
    }

    fn build_store(&self, bucket: &str) -> Result<impl ObjectStore, FetchError> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(self.settings.region());

        if let Some(endpoint) = &self.settings.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(key) = &self.settings.access_key {
            builder = builder.with_access_key_id(key);
        }
        if let Some(secret) = &self.settings.secret_key {
            builder = builder.with_secret_access_key(secret);
        }

        builder
            .build()
            .map_err(|e| FetchError::Config(format!("S3: {}", e)))
    }

    /// Write a downloaded object under the download directory. A filename
    /// with directory components gets those directories created.
    async fn save_local(&self, request: &FetchRequest, bytes: &[u8]) -> Result<PathBuf, FetchError> {
        let local_error = |e: std::io::Error| FetchError::Transient {
            location: request.location(),
            message: format!("writing local copy: {}", e),
        };
        let destination = self.settings.download_dir.join(&request.filename);
        let parent = destination.parent().unwrap_or(self.settings.download_dir.as_path());
        tokio::fs::create_dir_all(parent).await.map_err(local_error)?;
        tokio::fs::write(&destination, bytes).await.map_err(local_error)?;
        Ok(destination)
    }
}

#[async_trait]
impl Fetcher for S3Fetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<PathBuf, FetchError> {
        let bucket = request
            .bucket
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| FetchError::Config("no bucket given for remote read".to_string()))?;
        let location = request.location();
        let store = self.build_store(bucket)?;

        info!("Downloading {}", location);
        let result = store
            .get(&ObjectPath::from(request.key()))
            .await
            .map_err(|e| match e {
                object_store::Error::NotFound { .. } => FetchError::NotFound {
                    location: location.clone(),
                },
                other => FetchError::Transient {
                    location: location.clone(),
                    message: other.to_string(),
                },
            })?;
        let bytes = result.bytes().await.map_err(|e| FetchError::Transient {
            location: location.clone(),
            message: e.to_string(),
        })?;

        let destination = self.save_local(request, &bytes).await?;
        info!("Downloaded {} to {}", location, destination.display());
        Ok(destination)
    }

    fn kind(&self) -> &str {
        "s3"
    }
}
