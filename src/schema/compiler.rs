//! Schema Compiler - Turns a schema document into a typed table definition

use crate::error::{LoaderError, Result};
use crate::schema::collation::{resolve_collation, Collation};
use crate::schema::types::{resolve_type, SqlType, TypeTag, MAX_NUMERIC_PRECISION};
use crate::schema::{ColumnSpec, SchemaDocument};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Suffix of the all-text landing table used by the staging flow.
pub const STAGING_SUFFIX: &str = "__staging";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub sql_type: SqlType,
    /// Column collation; `None` means the table default applies.
    pub collation: Option<Collation>,
}

/// Compiled table. Column order is declaration order and decides which CSV
/// cell lands in which column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub default_collation: Collation,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, default_collation: Collation) -> Self {
        Self {
            name: name.into(),
            default_collation,
            columns: Vec::new(),
        }
    }

    pub fn add_column(&mut self, name: impl Into<String>, sql_type: SqlType, collation: Option<Collation>) {
        self.columns.push(ColumnDescriptor {
            name: name.into(),
            sql_type,
            collation,
        });
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Collation in effect for a column.
    pub fn effective_collation(&self, column: &ColumnDescriptor) -> Collation {
        column.collation.unwrap_or(self.default_collation)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SchemaCompiler;

impl SchemaCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Validate a schema document and build its table definition.
    ///
    /// Pure: the store is never touched, so a failure here leaves no trace in
    /// the output artifact.
    pub fn compile(&self, doc: &SchemaDocument) -> Result<TableDefinition> {
        let name = doc
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| LoaderError::MissingField {
                field: "name",
                context: "schema document".to_string(),
            })?;

        let columns = doc
            .columns
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| LoaderError::MissingField {
                field: "columns",
                context: format!("schema for table '{}'", name),
            })?;

        let default_collation = resolve_collation(doc.collation.as_deref()).unwrap_or_default();
        let mut table = TableDefinition::new(name, default_collation);
        // lowercased name -> name as declared
        let mut seen: HashMap<String, String> = HashMap::new();

        for (idx, spec) in columns.iter().enumerate() {
            let column = self.compile_column(name, idx, spec)?;
            if let Some(previous) = seen.get(&column.name.to_lowercase()) {
                if *previous == column.name {
                    return Err(LoaderError::DuplicateColumn(column.name));
                }
                return Err(LoaderError::Config(format!(
                    "columns '{}' and '{}' of table '{}' differ only by letter case, which the extract store cannot hold apart",
                    previous, column.name, name
                )));
            }
            seen.insert(column.name.to_lowercase(), column.name.clone());
            debug!("Column {} -> {}", column.name, column.sql_type);
            table.columns.push(column);
        }

        info!(
            "Compiled schema for table '{}' ({} columns, collation {})",
            table.name,
            table.column_count(),
            table.default_collation.code()
        );
        Ok(table)
    }

    fn compile_column(&self, table: &str, idx: usize, spec: &ColumnSpec) -> Result<ColumnDescriptor> {
        let name = spec
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| LoaderError::MissingField {
                field: "name",
                context: format!("column #{} of table '{}'", idx + 1, table),
            })?;

        let tag = resolve_type(spec.type_code.as_deref());
        let sql_type = match tag {
            TypeTag::Char => SqlType::Char {
                length: require(spec.length, &name, "CHAR", "length")?,
            },
            TypeTag::Varchar => SqlType::Varchar {
                length: require(spec.length, &name, "VARCHAR", "length")?,
            },
            TypeTag::Numeric => {
                let precision = require(spec.precision, &name, "NUMERIC", "precision")?;
                let scale = require(spec.scale, &name, "NUMERIC", "scale")?;
                if precision == 0 || precision > MAX_NUMERIC_PRECISION || scale > precision {
                    return Err(LoaderError::Config(format!(
                        "NUMERIC column '{}' has invalid precision/scale ({}, {})",
                        name, precision, scale
                    )));
                }
                SqlType::Numeric { precision, scale }
            }
            other => SqlType::from_plain_tag(other).unwrap_or(SqlType::Text),
        };

        Ok(ColumnDescriptor {
            name,
            sql_type,
            collation: resolve_collation(spec.collation.as_deref()),
        })
    }

    /// All-text landing table with the same column names, used to let the
    /// bulk loader accept raw text before the typed copy.
    pub fn staging_definition(&self, table: &TableDefinition) -> TableDefinition {
        let mut staging = TableDefinition::new(
            format!("{}{}", table.name, STAGING_SUFFIX),
            table.default_collation,
        );
        for column in &table.columns {
            staging.add_column(column.name.clone(), SqlType::Text, column.collation);
        }
        staging
    }
}

fn require(value: Option<u32>, column: &str, type_name: &'static str, parameter: &'static str) -> Result<u32> {
    value.ok_or_else(|| LoaderError::MissingParameter {
        column: column.to_string(),
        type_name,
        parameter,
    })
}
