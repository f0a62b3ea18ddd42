use thiserror::Error;

use crate::fetch::FetchError;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Missing field '{field}' in {context}")]
    MissingField { field: &'static str, context: String },

    #[error("Missing parameter '{parameter}' for {type_name} column '{column}'")]
    MissingParameter {
        column: String,
        type_name: &'static str,
        parameter: &'static str,
    },

    #[error("Duplicate column '{0}' in schema")]
    DuplicateColumn(String),

    #[error("Cannot convert {value:?} in {file} row {row} column '{column}': {reason}")]
    Coercion {
        file: String,
        row: u64,
        column: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl LoaderError {
    /// True for errors caused by the schema or the run configuration rather
    /// than by the data, the store or the network.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LoaderError::MissingField { .. }
                | LoaderError::MissingParameter { .. }
                | LoaderError::DuplicateColumn(_)
                | LoaderError::Coercion { .. }
                | LoaderError::Config(_)
                | LoaderError::Json(_)
        )
    }
}

impl From<rusqlite::Error> for LoaderError {
    fn from(err: rusqlite::Error) -> Self {
        LoaderError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;
