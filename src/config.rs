//! Run configuration shared by the CLI and the service entry point

use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a file's rows reach the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Store-native COPY of the whole file, atomic per file
    Bulk,
    /// Record-by-record coercion and insertion
    RowWise,
}

/// chrono format strings for temporal columns. Row-wise ingestion refuses to
/// start when the table has a temporal column whose format is missing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalFormats {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub timestamp_tz: Option<String>,
}

impl TemporalFormats {
    /// ISO forms the store accepts natively in bulk loads.
    pub fn iso() -> Self {
        Self {
            date: Some("%Y-%m-%d".to_string()),
            time: Some("%H:%M:%S%.f".to_string()),
            timestamp: Some("%Y-%m-%d %H:%M:%S%.f".to_string()),
            timestamp_tz: Some("%Y-%m-%d %H:%M:%S%.f%#z".to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// First record of every file is a header
    #[serde(default)]
    pub has_header: bool,

    /// Data records to discard after the header (row-wise only)
    #[serde(default)]
    pub skip: u64,

    #[serde(default = "default_strategy")]
    pub strategy: Strategy,

    /// Land each file in an all-text staging table first
    #[serde(default)]
    pub staging: bool,

    #[serde(default)]
    pub formats: TemporalFormats,
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_strategy() -> Strategy {
    Strategy::Bulk
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            has_header: false,
            skip: 0,
            strategy: default_strategy(),
            staging: false,
            formats: TemporalFormats::default(),
        }
    }
}

impl LoadOptions {
    /// Delimiter as a single byte. The two-character escape `\t` selects tab.
    pub fn delimiter_byte(&self) -> Result<u8> {
        parse_delimiter(&self.delimiter)
    }

    /// Reject option combinations that cannot run.
    pub fn validate(&self) -> Result<()> {
        self.delimiter_byte()?;
        if self.strategy == Strategy::Bulk && self.skip > 0 {
            return Err(LoaderError::Config(
                "a row skip count requires the row-wise strategy".to_string(),
            ));
        }
        if self.staging && self.strategy == Strategy::RowWise {
            return Err(LoaderError::Config(
                "the staging table is only used by the bulk strategy".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn parse_delimiter(raw: &str) -> Result<u8> {
    match raw {
        "\\t" | "\t" => Ok(b'\t'),
        s if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        s => Err(LoaderError::Config(format!(
            "delimiter must be a single ASCII character or \\t, got {:?}",
            s
        ))),
    }
}

/// Object storage settings. Flags win over environment variables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct S3Settings {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub download_dir: PathBuf,
}

impl S3Settings {
    pub const DEFAULT_DOWNLOAD_DIR: &'static str = "./tmp";
    pub const DEFAULT_REGION: &'static str = "us-east-1";

    pub fn from_env() -> Self {
        Self {
            access_key: std::env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
            region: std::env::var("AWS_REGION").ok(),
            endpoint: std::env::var("EXTRACT_S3_ENDPOINT").ok(),
            download_dir: std::env::var("EXTRACT_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(Self::DEFAULT_DOWNLOAD_DIR)),
        }
    }

    pub fn with_overrides(
        mut self,
        access_key: Option<String>,
        secret_key: Option<String>,
        region: Option<String>,
        endpoint: Option<String>,
        download_dir: Option<PathBuf>,
    ) -> Self {
        self.access_key = access_key.or(self.access_key);
        self.secret_key = secret_key.or(self.secret_key);
        self.region = region.or(self.region);
        self.endpoint = endpoint.or(self.endpoint);
        if let Some(dir) = download_dir {
            self.download_dir = dir;
        }
        self
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(Self::DEFAULT_REGION)
    }
}
