//! Cell coercion - converts raw CSV text into typed cell values

use crate::config::TemporalFormats;
use crate::error::{LoaderError, Result};
use crate::schema::{SqlType, TableDefinition};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref DECIMAL: Regex = Regex::new(r"^([+-]?)(\d+)(?:\.(\d*))?$").unwrap();
}

const TRUTHY: [&str; 5] = ["true", "t", "yes", "y", "1"];
const FALSY: [&str; 5] = ["false", "f", "no", "n", "0"];

/// A coerced cell, ready to be written to the store.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    /// Normalized decimal text with exactly `scale` fractional digits
    Numeric(String),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
}

/// Outcome of coercing one cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Coerced {
    Value(CellValue),
    /// The column type has no row-wise conversion; the cell stays NULL.
    Unsupported,
}

pub struct CellCoercer<'a> {
    formats: &'a TemporalFormats,
}

impl<'a> CellCoercer<'a> {
    pub fn new(formats: &'a TemporalFormats) -> Self {
        Self { formats }
    }

    /// Fail early when a temporal column has no configured format.
    pub fn check_formats(&self, table: &TableDefinition) -> Result<()> {
        for column in &table.columns {
            if let Some(option) = self.missing_format(&column.sql_type) {
                return Err(LoaderError::Config(format!(
                    "column '{}' of table '{}' is {} but no {} format was given",
                    column.name, table.name, column.sql_type, option
                )));
            }
        }
        Ok(())
    }

    fn missing_format(&self, sql_type: &SqlType) -> Option<&'static str> {
        match sql_type {
            SqlType::Date if self.formats.date.is_none() => Some("date"),
            SqlType::Time if self.formats.time.is_none() => Some("time"),
            SqlType::Timestamp if self.formats.timestamp.is_none() => Some("timestamp"),
            SqlType::TimestampTz if self.formats.timestamp_tz.is_none() => Some("timestamp-tz"),
            _ => None,
        }
    }

    /// Convert one raw cell. `Err` carries the human-readable reason.
    pub fn coerce(&self, sql_type: &SqlType, raw: &str) -> std::result::Result<Coerced, String> {
        let cell = raw.trim();
        let value = match sql_type {
            SqlType::Char { .. } | SqlType::Varchar { .. } | SqlType::Text | SqlType::Json => {
                CellValue::Text(raw.to_string())
            }
            SqlType::Bytes | SqlType::Interval | SqlType::Geography => return Ok(Coerced::Unsupported),
            _ if cell.is_empty() => CellValue::Null,
            SqlType::Bool => CellValue::Bool(parse_bool(cell)?),
            SqlType::SmallInt => CellValue::Int(parse_int::<i16>(cell, sql_type)?.into()),
            SqlType::Int => CellValue::Int(parse_int::<i32>(cell, sql_type)?.into()),
            SqlType::BigInt => CellValue::Int(parse_int::<i64>(cell, sql_type)?),
            SqlType::Oid => CellValue::Int(parse_int::<u32>(cell, sql_type)?.into()),
            SqlType::Double => CellValue::Double(
                cell.parse::<f64>()
                    .map_err(|e| format!("expected {}: {}", sql_type, e))?,
            ),
            SqlType::Numeric { precision, scale } => {
                CellValue::Numeric(normalize_decimal(cell, *precision, *scale)?)
            }
            SqlType::Date => {
                let fmt = self.format(&self.formats.date, "date")?;
                CellValue::Date(
                    NaiveDate::parse_from_str(cell, fmt)
                        .map_err(|e| format!("expected date in format {:?}: {}", fmt, e))?,
                )
            }
            SqlType::Time => {
                let fmt = self.format(&self.formats.time, "time")?;
                CellValue::Time(
                    NaiveTime::parse_from_str(cell, fmt)
                        .map_err(|e| format!("expected time in format {:?}: {}", fmt, e))?,
                )
            }
            SqlType::Timestamp => {
                let fmt = self.format(&self.formats.timestamp, "timestamp")?;
                CellValue::Timestamp(
                    NaiveDateTime::parse_from_str(cell, fmt)
                        .map_err(|e| format!("expected timestamp in format {:?}: {}", fmt, e))?,
                )
            }
            SqlType::TimestampTz => {
                let fmt = self.format(&self.formats.timestamp_tz, "timestamp-tz")?;
                CellValue::TimestampTz(
                    DateTime::parse_from_str(cell, fmt)
                        .map_err(|e| format!("expected timestamp with zone in format {:?}: {}", fmt, e))?,
                )
            }
        };
        Ok(Coerced::Value(value))
    }

    fn format<'f>(&self, format: &'f Option<String>, kind: &str) -> std::result::Result<&'f str, String> {
        format
            .as_deref()
            .ok_or_else(|| format!("no {} format configured", kind))
    }
}

fn parse_bool(cell: &str) -> std::result::Result<bool, String> {
    let lower = cell.to_ascii_lowercase();
    if TRUTHY.contains(&lower.as_str()) {
        Ok(true)
    } else if FALSY.contains(&lower.as_str()) {
        Ok(false)
    } else {
        Err("expected a boolean (true/false, t/f, yes/no, y/n, 1/0)".to_string())
    }
}

fn parse_int<T>(cell: &str, sql_type: &SqlType) -> std::result::Result<T, String>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    cell.parse::<T>()
        .map_err(|e| format!("expected base-10 {}: {}", sql_type, e))
}

/// Validate a decimal against NUMERIC(precision, scale) and pad it to `scale`
/// fractional digits. Extra fractional digits are rejected rather than rounded.
fn normalize_decimal(cell: &str, precision: u32, scale: u32) -> std::result::Result<String, String> {
    let caps = DECIMAL
        .captures(cell)
        .ok_or_else(|| format!("expected a decimal number for NUMERIC({},{})", precision, scale))?;
    let sign = if &caps[1] == "-" { "-" } else { "" };
    let integer = caps[2].trim_start_matches('0');
    let fraction = caps.get(3).map(|m| m.as_str()).unwrap_or("");

    if fraction.len() > scale as usize {
        return Err(format!(
            "{} has more than {} fractional digits",
            cell, scale
        ));
    }
    let max_integer_digits = (precision - scale) as usize;
    if integer.len() > max_integer_digits {
        return Err(format!(
            "{} does not fit NUMERIC({},{})",
            cell, precision, scale
        ));
    }

    let integer = if integer.is_empty() { "0" } else { integer };
    if scale == 0 {
        return Ok(format!("{}{}", sign, integer));
    }
    Ok(format!(
        "{}{}.{:0<width$}",
        sign,
        integer,
        fraction,
        width = scale as usize
    ))
}
