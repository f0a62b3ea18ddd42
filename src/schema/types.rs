//! Column type codes and their resolved SQL types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type code as written in a schema document.
///
/// Several codes are aliases kept for schemas written against older extract
/// formats (`CHAR_STRING`, `UNICODE_STRING`, `INTEGER`, `DATETIME`,
/// `DURATION`, `SPATIAL`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Boolean,
    CharString,
    UnicodeString,
    Text,
    Int,
    Integer,
    BigInt,
    SmallInt,
    Double,
    Numeric,
    Date,
    DateTime,
    Timestamp,
    TimestampTz,
    Time,
    Duration,
    Interval,
    Bytes,
    Json,
    Geography,
    Spatial,
    Oid,
    Char,
    Varchar,
}

impl TypeTag {
    pub const ALL: [TypeTag; 24] = [
        TypeTag::Boolean,
        TypeTag::CharString,
        TypeTag::UnicodeString,
        TypeTag::Text,
        TypeTag::Int,
        TypeTag::Integer,
        TypeTag::BigInt,
        TypeTag::SmallInt,
        TypeTag::Double,
        TypeTag::Numeric,
        TypeTag::Date,
        TypeTag::DateTime,
        TypeTag::Timestamp,
        TypeTag::TimestampTz,
        TypeTag::Time,
        TypeTag::Duration,
        TypeTag::Interval,
        TypeTag::Bytes,
        TypeTag::Json,
        TypeTag::Geography,
        TypeTag::Spatial,
        TypeTag::Oid,
        TypeTag::Char,
        TypeTag::Varchar,
    ];

    pub fn code(self) -> &'static str {
        match self {
            TypeTag::Boolean => "BOOLEAN",
            TypeTag::CharString => "CHAR_STRING",
            TypeTag::UnicodeString => "UNICODE_STRING",
            TypeTag::Text => "TEXT",
            TypeTag::Int => "INT",
            TypeTag::Integer => "INTEGER",
            TypeTag::BigInt => "BIG_INT",
            TypeTag::SmallInt => "SMALL_INT",
            TypeTag::Double => "DOUBLE",
            TypeTag::Numeric => "NUMERIC",
            TypeTag::Date => "DATE",
            TypeTag::DateTime => "DATETIME",
            TypeTag::Timestamp => "TIMESTAMP",
            TypeTag::TimestampTz => "TIMESTAMP_TZ",
            TypeTag::Time => "TIME",
            TypeTag::Duration => "DURATION",
            TypeTag::Interval => "INTERVAL",
            TypeTag::Bytes => "BYTES",
            TypeTag::Json => "JSON",
            TypeTag::Geography => "GEOGRAPHY",
            TypeTag::Spatial => "SPATIAL",
            TypeTag::Oid => "OID",
            TypeTag::Char => "CHAR",
            TypeTag::Varchar => "VARCHAR",
        }
    }

    /// Look up a type code, ignoring ASCII case.
    pub fn from_code(code: &str) -> Option<TypeTag> {
        let code = code.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|tag| tag.code().eq_ignore_ascii_case(code))
    }
}

/// Resolve an optional type code. Absent or unknown codes fall back to text.
pub fn resolve_type(code: Option<&str>) -> TypeTag {
    code.and_then(TypeTag::from_code).unwrap_or(TypeTag::Text)
}

/// Fully resolved column type, including type parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Bool,
    SmallInt,
    Int,
    BigInt,
    Oid,
    Double,
    Numeric { precision: u32, scale: u32 },
    Char { length: u32 },
    Varchar { length: u32 },
    Text,
    Json,
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Geography,
}

/// Widest NUMERIC the extract format accepts.
pub const MAX_NUMERIC_PRECISION: u32 = 38;

impl SqlType {
    /// Type for tags that carry no parameters. `CHAR`, `VARCHAR` and
    /// `NUMERIC` return `None` because they need a length or precision.
    pub fn from_plain_tag(tag: TypeTag) -> Option<SqlType> {
        let ty = match tag {
            TypeTag::Boolean => SqlType::Bool,
            TypeTag::CharString | TypeTag::UnicodeString | TypeTag::Text => SqlType::Text,
            TypeTag::Int => SqlType::Int,
            TypeTag::Integer | TypeTag::BigInt => SqlType::BigInt,
            TypeTag::SmallInt => SqlType::SmallInt,
            TypeTag::Double => SqlType::Double,
            TypeTag::Date => SqlType::Date,
            TypeTag::DateTime | TypeTag::Timestamp => SqlType::Timestamp,
            TypeTag::TimestampTz => SqlType::TimestampTz,
            TypeTag::Time => SqlType::Time,
            TypeTag::Duration | TypeTag::Interval => SqlType::Interval,
            TypeTag::Bytes => SqlType::Bytes,
            TypeTag::Json => SqlType::Json,
            TypeTag::Geography | TypeTag::Spatial => SqlType::Geography,
            TypeTag::Oid => SqlType::Oid,
            TypeTag::Char | TypeTag::Varchar | TypeTag::Numeric => return None,
        };
        Some(ty)
    }

    /// Name used in DDL and in the store catalog.
    pub fn sql_name(&self) -> String {
        match self {
            SqlType::Bool => "BOOLEAN".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Int => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Oid => "OID".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Numeric { precision, scale } => format!("NUMERIC({},{})", precision, scale),
            SqlType::Char { length } => format!("CHAR({})", length),
            SqlType::Varchar { length } => format!("VARCHAR({})", length),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Json => "JSON".to_string(),
            SqlType::Bytes => "BYTEA".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::TimestampTz => "TIMESTAMPTZ".to_string(),
            SqlType::Interval => "INTERVAL".to_string(),
            SqlType::Geography => "GEOGRAPHY".to_string(),
        }
    }

    /// Inverse of [`SqlType::sql_name`].
    pub fn parse_sql_name(name: &str) -> Option<SqlType> {
        let name = name.trim().to_ascii_uppercase();
        let (base, params) = match name.find('(') {
            Some(open) => {
                let close = name.rfind(')')?;
                (name[..open].trim(), Some(&name[open + 1..close]))
            }
            None => (name.as_str(), None),
        };
        let numbers: Vec<u32> = match params {
            Some(p) => p
                .split(',')
                .map(|n| n.trim().parse::<u32>().ok())
                .collect::<Option<Vec<_>>>()?,
            None => Vec::new(),
        };

        let ty = match (base, numbers.as_slice()) {
            ("BOOLEAN", []) => SqlType::Bool,
            ("SMALLINT", []) => SqlType::SmallInt,
            ("INTEGER", []) => SqlType::Int,
            ("BIGINT", []) => SqlType::BigInt,
            ("OID", []) => SqlType::Oid,
            ("DOUBLE PRECISION", []) => SqlType::Double,
            ("NUMERIC", [precision, scale]) => SqlType::Numeric {
                precision: *precision,
                scale: *scale,
            },
            ("CHAR", [length]) => SqlType::Char { length: *length },
            ("VARCHAR", [length]) => SqlType::Varchar { length: *length },
            ("TEXT", []) => SqlType::Text,
            ("JSON", []) => SqlType::Json,
            ("BYTEA", []) => SqlType::Bytes,
            ("DATE", []) => SqlType::Date,
            ("TIME", []) => SqlType::Time,
            ("TIMESTAMP", []) => SqlType::Timestamp,
            ("TIMESTAMPTZ", []) => SqlType::TimestampTz,
            ("INTERVAL", []) => SqlType::Interval,
            ("GEOGRAPHY", []) => SqlType::Geography,
            _ => return None,
        };
        Some(ty)
    }

    /// Character types accept cell text verbatim.
    pub fn is_character(&self) -> bool {
        matches!(
            self,
            SqlType::Char { .. } | SqlType::Varchar { .. } | SqlType::Text | SqlType::Json
        )
    }

    /// Affinity used when a staged text column is cast into this type.
    pub fn cast_target(&self) -> &'static str {
        match self {
            SqlType::Bool | SqlType::SmallInt | SqlType::Int | SqlType::BigInt | SqlType::Oid => {
                "INTEGER"
            }
            SqlType::Double => "REAL",
            SqlType::Numeric { .. } => "NUMERIC",
            SqlType::Bytes => "BLOB",
            _ => "TEXT",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql_name())
    }
}
