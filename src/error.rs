use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Unsupported file format '{extension}', expected one of csv, xlsx, xls, parquet, json")]
    UnsupportedFormat { extension: String },

    #[error("File is empty or unreadable: {message}")]
    EmptyOrUnreadable { message: String },
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("SQL generation failed: {message}")]
    GenerationFailed { message: String },

    #[error("SQL generation returned an empty response")]
    EmptyGeneration,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SqlSafetyError {
    #[error("Generated SQL contains forbidden keyword {keyword}")]
    MutatingKeyword { keyword: String },

    #[error("Generated SQL is empty after cleanup")]
    EmptyStatement,
}

#[derive(Error, Debug)]
#[error("Query execution failed: {message}")]
pub struct ExecutionError {
    pub message: String,
}

impl From<datafusion::error::DataFusionError> for ExecutionError {
    fn from(err: datafusion::error::DataFusionError) -> Self {
        ExecutionError {
            message: err.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    SqlSafety(#[from] SqlSafetyError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Dataset not found: {dataset_id}")]
    DatasetNotFound { dataset_id: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Internal server error: {message}")]
    InternalError { message: String },
}

/// Coarse classification handed back to the inbound collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Input,
    Format,
    Generation,
    SqlSafety,
    Execution,
    NotFound,
    Storage,
    Config,
    Internal,
}

impl AnalysisError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AnalysisError::InvalidInput { .. } => ErrorCategory::Input,
            AnalysisError::Format(_) => ErrorCategory::Format,
            AnalysisError::Generation(_) => ErrorCategory::Generation,
            AnalysisError::SqlSafety(_) => ErrorCategory::SqlSafety,
            AnalysisError::Execution(_) => ErrorCategory::Execution,
            AnalysisError::SessionNotFound { .. } | AnalysisError::DatasetNotFound { .. } => {
                ErrorCategory::NotFound
            }
            AnalysisError::StorageError { .. } | AnalysisError::JsonError(_) => {
                ErrorCategory::Storage
            }
            AnalysisError::ConfigError { .. } => ErrorCategory::Config,
            AnalysisError::InternalError { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<diesel::result::Error> for AnalysisError {
    fn from(err: diesel::result::Error) -> Self {
        AnalysisError::StorageError {
            message: format!("Database error: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_component_errors() {
        let format: AnalysisError = FormatError::EmptyOrUnreadable {
            message: "no rows".to_string(),
        }
        .into();
        assert_eq!(format.category(), ErrorCategory::Format);

        let generation: AnalysisError = GenerationError::EmptyGeneration.into();
        assert_eq!(generation.category(), ErrorCategory::Generation);

        let safety: AnalysisError = SqlSafetyError::MutatingKeyword {
            keyword: "DROP".to_string(),
        }
        .into();
        assert_eq!(safety.category(), ErrorCategory::SqlSafety);
        assert_eq!(
            safety.to_string(),
            "Generated SQL contains forbidden keyword DROP"
        );
    }
}
