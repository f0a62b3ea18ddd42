//! Schema Module - JSON schema documents and their compiled table definitions
//!
//! A schema document is the loosely-typed JSON a user writes:
//!
//! ```json
//! { "name": "sales", "collation": "EN_US",
//!   "columns": [ {"name": "id", "type": "INT"},
//!                {"name": "amount", "type": "NUMERIC", "precision": 18, "scale": 2} ],
//!   "files": ["sales_2024.csv"] }
//! ```
//!
//! [`SchemaCompiler`] validates it once and produces a [`TableDefinition`];
//! nothing downstream reads the raw document.

pub mod collation;
pub mod compiler;
pub mod types;

pub use collation::{resolve_collation, Collation};
pub use compiler::{ColumnDescriptor, SchemaCompiler, TableDefinition};
pub use types::{resolve_type, SqlType, TypeTag};

use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Schema document as parsed from JSON. Required keys are optional here so
/// that their absence is reported by the compiler rather than by serde.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub name: Option<String>,

    #[serde(default)]
    pub collation: Option<String>,

    pub columns: Option<Vec<ColumnSpec>>,

    /// Source files, batch mode only
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: Option<String>,

    #[serde(rename = "type", default)]
    pub type_code: Option<String>,

    #[serde(default)]
    pub length: Option<u32>,

    #[serde(default)]
    pub precision: Option<u32>,

    #[serde(default)]
    pub scale: Option<u32>,

    #[serde(default)]
    pub collation: Option<String>,
}

impl SchemaDocument {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading schema document {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Source files listed for batch mode.
    pub fn source_files(&self) -> Result<&[String]> {
        self.files
            .as_deref()
            .ok_or_else(|| LoaderError::MissingField {
                field: "files",
                context: "schema document".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schema_document() {
        let doc = SchemaDocument::from_json_str(
            r#"{"name": "t", "collation": "DE",
                "columns": [{"name": "a", "type": "VARCHAR", "length": 12, "collation": "DE"}],
                "files": ["a.csv", "b.csv"]}"#,
        )
        .unwrap();

        assert_eq!(doc.name.as_deref(), Some("t"));
        let columns = doc.columns.as_ref().unwrap();
        assert_eq!(columns[0].type_code.as_deref(), Some("VARCHAR"));
        assert_eq!(columns[0].length, Some(12));
        assert_eq!(doc.source_files().unwrap(), ["a.csv", "b.csv"]);
    }

    #[test]
    fn test_missing_files_is_reported() {
        let doc = SchemaDocument::from_json_str(r#"{"name": "t", "columns": []}"#).unwrap();
        let err = doc.source_files().unwrap_err();
        assert!(matches!(err, LoaderError::MissingField { field: "files", .. }));
    }

    #[test]
    fn test_wrongly_typed_parameter_is_a_json_error() {
        let err = SchemaDocument::from_json_str(
            r#"{"name": "t", "columns": [{"name": "a", "length": "ten"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, LoaderError::Json(_)));
    }
}
