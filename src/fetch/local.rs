use crate::fetch::{FetchError, FetchRequest, Fetcher};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Reads source files from a local directory instead of downloading them.
/// The folder of the request is applied below the root, as it would be in a
/// bucket.
#[derive(Clone, Debug)]
pub struct LocalFetcher {
    root: PathBuf,
}

impl LocalFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Fetcher for LocalFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<PathBuf, FetchError> {
        let path = self.root.join(request.key());
        debug!("Local read of {}", path.display());
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(FetchError::NotFound {
                location: path.display().to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FetchError::NotFound {
                location: path.display().to_string(),
            }),
            Err(e) => Err(FetchError::Transient {
                location: path.display().to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn kind(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::SourceLocation;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_fetch_resolves_folder() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("in")).unwrap();
        std::fs::write(dir.path().join("in/a.csv"), "1,x\n").unwrap();

        let fetcher = LocalFetcher::new(dir.path());
        let location = SourceLocation {
            bucket: None,
            folder: Some("in".into()),
        };
        let path = fetcher.fetch(&FetchRequest::new(&location, "a.csv")).await.unwrap();
        assert_eq!(path, dir.path().join("in/a.csv"));
    }

    #[tokio::test]
    async fn test_local_fetch_missing_file() {
        let dir = TempDir::new().unwrap();
        let fetcher = LocalFetcher::new(dir.path());
        let err = fetcher
            .fetch(&FetchRequest::new(&SourceLocation::default(), "missing.csv"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
