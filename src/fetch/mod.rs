//! Fetch Module - Resolves (bucket, folder, filename) to a local file
//!
//! - `S3Fetcher`: downloads from S3-compatible object storage
//! - `LocalFetcher`: reads files already on disk (local-read mode)

pub mod local;
pub mod s3;

pub use local::LocalFetcher;
pub use s3::S3Fetcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("object not found: {location}")]
    NotFound { location: String },

    #[error("transient failure fetching {location}: {message}")]
    Transient { location: String, message: String },

    #[error("fetch configuration error: {0}")]
    Config(String),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Where the source files of a run live.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(default)]
    pub bucket: Option<String>,
    /// Key prefix without trailing slash, e.g. `exports/2024`
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub bucket: Option<String>,
    pub folder: Option<String>,
    pub filename: String,
}

impl FetchRequest {
    pub fn new(location: &SourceLocation, filename: impl Into<String>) -> Self {
        Self {
            bucket: location.bucket.clone(),
            folder: location.folder.clone(),
            filename: filename.into(),
        }
    }

    /// Object key: `folder/filename`, or just `filename` without a folder.
    pub fn key(&self) -> String {
        match self.folder.as_deref().map(|f| f.trim_matches('/')) {
            Some(folder) if !folder.is_empty() => format!("{}/{}", folder, self.filename),
            _ => self.filename.clone(),
        }
    }

    pub fn location(&self) -> String {
        match &self.bucket {
            Some(bucket) => format!("s3://{}/{}", bucket, self.key()),
            None => self.key(),
        }
    }
}

/// Source of CSV files for a run.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Make the requested file available locally and return its path.
    async fn fetch(&self, request: &FetchRequest) -> Result<PathBuf, FetchError>;

    /// Short name used in logs
    fn kind(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_key() {
        let location = SourceLocation {
            bucket: Some("b".into()),
            folder: Some("/exports/2024/".into()),
        };
        let request = FetchRequest::new(&location, "a.csv");
        assert_eq!(request.key(), "exports/2024/a.csv");
        assert_eq!(request.location(), "s3://b/exports/2024/a.csv");

        let request = FetchRequest::new(&SourceLocation::default(), "a.csv");
        assert_eq!(request.key(), "a.csv");
        assert_eq!(request.location(), "a.csv");
    }
}
