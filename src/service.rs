//! Service entry point - one event in, one response out
//!
//! The event names a single CSV file and embeds the schema document. On
//! success the response body is the finished extract, base64 encoded.

use crate::config::{LoadOptions, S3Settings, Strategy};
use crate::error::{LoaderError, Result};
use crate::fetch::{Fetcher, LocalFetcher, S3Fetcher, SourceLocation};
use crate::ingestion::ExtractPipeline;
use crate::schema::SchemaDocument;
use crate::store::{CreateMode, SqliteStore};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExtractEvent {
    #[serde(default)]
    pub accesskey: Option<String>,
    #[serde(default)]
    pub secretkey: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
    pub csvfilename: String,
    /// Schema document, embedded as JSON
    pub schema: serde_json::Value,
    /// Data records to discard; a non-zero count selects row-wise ingestion
    #[serde(default)]
    pub skip: u64,
    #[serde(default)]
    pub options: LoadOptions,
    /// Read the file from this directory instead of object storage
    #[serde(default)]
    pub localread: bool,
    #[serde(default)]
    pub local_root: Option<PathBuf>,
    /// Where the extract is written; the system temp dir by default
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl ExtractEvent {
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    fn load_options(&self) -> LoadOptions {
        let mut options = self.options.clone();
        if self.skip > 0 {
            options.skip = self.skip;
            options.strategy = Strategy::RowWise;
        }
        options
    }

    /// `<output_dir>/<csv file name>.hyper`
    pub fn artifact_path(&self) -> PathBuf {
        let stem = Path::new(&self.csvfilename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.csvfilename.clone());
        self.output_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(format!("{}.hyper", stem))
    }

    fn fetcher(&self) -> Box<dyn Fetcher> {
        if self.localread {
            let root = self.local_root.clone().unwrap_or_else(|| PathBuf::from("."));
            Box::new(LocalFetcher::new(root))
        } else {
            let settings = S3Settings::from_env().with_overrides(
                self.accesskey.clone(),
                self.secretkey.clone(),
                self.region.clone(),
                self.endpoint.clone(),
                None,
            );
            Box::new(S3Fetcher::new(settings))
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl ExtractResponse {
    fn artifact(bytes: &[u8]) -> Self {
        Self {
            status_code: 200,
            headers: content_type("application/octet-stream"),
            body: base64::engine::general_purpose::STANDARD.encode(bytes),
            is_base64_encoded: true,
        }
    }

    fn failure(err: &LoaderError) -> Self {
        let body = serde_json::json!({ "error": err.to_string() });
        Self {
            status_code: status_for(err),
            headers: content_type("application/json"),
            body: body.to_string(),
            is_base64_encoded: false,
        }
    }
}

fn content_type(value: &str) -> HashMap<String, String> {
    HashMap::from([("Content-Type".to_string(), value.to_string())])
}

/// 404 for a missing source, 400 for bad input, 500 for everything else.
pub fn status_for(err: &LoaderError) -> u16 {
    match err {
        LoaderError::Fetch(e) if e.is_not_found() => 404,
        LoaderError::Fetch(crate::fetch::FetchError::Config(_)) => 400,
        e if e.is_validation() => 400,
        _ => 500,
    }
}

/// Process one event. Never fails: errors become error responses.
pub async fn handle_event(event: &ExtractEvent) -> ExtractResponse {
    match process_event(event).await {
        Ok(bytes) => ExtractResponse::artifact(&bytes),
        Err(e) => {
            error!("Extract for {} failed: {}", event.csvfilename, e);
            ExtractResponse::failure(&e)
        }
    }
}

async fn process_event(event: &ExtractEvent) -> Result<Vec<u8>> {
    let doc = SchemaDocument::from_value(event.schema.clone())?;
    let pipeline = ExtractPipeline::new(event.load_options())?;
    let location = SourceLocation {
        bucket: event.bucket.clone(),
        folder: event.folder.clone(),
    };
    let fetcher = event.fetcher();
    let artifact = event.artifact_path();

    let summary = pipeline
        .run(
            &doc,
            std::slice::from_ref(&event.csvfilename),
            &location,
            fetcher.as_ref(),
            || SqliteStore::open(&artifact, CreateMode::CreateAndReplace),
        )
        .await?;
    info!(
        "Extract {} ready: {} rows in {}",
        artifact.display(),
        summary.rows_ingested(),
        summary.table
    );

    Ok(tokio::fs::read(&artifact).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TableStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn local_event(dir: &TempDir, schema: serde_json::Value) -> ExtractEvent {
        ExtractEvent {
            csvfilename: "in.csv".into(),
            folder: Some("inbox".into()),
            schema,
            localread: true,
            local_root: Some(dir.path().to_path_buf()),
            output_dir: Some(dir.path().join("out")),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_event_produces_base64_extract() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("inbox")).unwrap();
        std::fs::write(dir.path().join("inbox/in.csv"), "id,label\n1,x\n2,y\n3,z\n").unwrap();

        let mut event = local_event(
            &dir,
            json!({"name": "t", "columns": [{"name": "id", "type": "INT"}, {"name": "label"}]}),
        );
        event.skip = 1;
        event.options.has_header = true;

        let response = handle_event(&event).await;
        assert_eq!(response.status_code, 200);
        assert!(response.is_base64_encoded);
        assert_eq!(response.headers["Content-Type"], "application/octet-stream");

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&response.body)
            .unwrap();
        let copy = dir.path().join("copy.hyper");
        std::fs::write(&copy, bytes).unwrap();
        let store = SqliteStore::open(&copy, CreateMode::Create).unwrap();
        assert!(store.table_exists("t").unwrap());
        assert_eq!(store.row_count("t").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_invalid_schema_is_a_client_error() {
        let dir = TempDir::new().unwrap();
        let event = local_event(&dir, json!({"columns": [{"name": "a"}]}));

        let response = handle_event(&event).await;
        assert_eq!(response.status_code, 400);
        assert!(!response.is_base64_encoded);
        assert!(response.body.contains("name"));
        assert!(!event.artifact_path().exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_not_found() {
        let dir = TempDir::new().unwrap();
        let event = local_event(&dir, json!({"name": "t", "columns": [{"name": "a"}]}));

        let response = handle_event(&event).await;
        assert_eq!(response.status_code, 404);
        assert!(!event.artifact_path().exists());
    }

    #[test]
    fn test_event_json_and_response_shape() {
        let event = ExtractEvent::from_json_str(
            r#"{"bucket": "b", "csvfilename": "exports/a.csv", "schema": {"name": "t"}}"#,
        )
        .unwrap();
        assert_eq!(event.skip, 0);
        assert!(!event.localread);
        assert!(event.artifact_path().ends_with("a.csv.hyper"));

        let response = ExtractResponse::failure(&LoaderError::Store("disk full".into()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["statusCode"], 500);
        assert_eq!(json["isBase64Encoded"], false);
        assert_eq!(json["headers"]["Content-Type"], "application/json");
    }
}
