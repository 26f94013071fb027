use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// Fixed relation name every generated statement must target.
pub const RELATION_NAME: &str = "data_table";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DataFormat {
    #[serde(rename = "csv")]
    Csv,
    #[serde(rename = "excel")]
    Excel,
    #[serde(rename = "parquet")]
    Parquet,
    #[serde(rename = "json")]
    Json,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Csv => "csv",
            DataFormat::Excel => "excel",
            DataFormat::Parquet => "parquet",
            DataFormat::Json => "json",
        }
    }

    pub fn from_extension(extension: &str) -> Result<Self, FormatError> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" => Ok(DataFormat::Csv),
            "xlsx" | "xls" => Ok(DataFormat::Excel),
            "parquet" => Ok(DataFormat::Parquet),
            "json" => Ok(DataFormat::Json),
            other => Err(FormatError::UnsupportedFormat {
                extension: other.to_string(),
            }),
        }
    }

    /// Resolves the format from the extension of an uploaded file name.
    pub fn from_filename(filename: &str) -> Result<Self, FormatError> {
        match filename.rsplit_once('.') {
            Some((_, extension)) => Self::from_extension(extension),
            None => Err(FormatError::UnsupportedFormat {
                extension: String::new(),
            }),
        }
    }

    /// Inverse of `as_str`, used when reading persisted datasets.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "csv" => Some(DataFormat::Csv),
            "excel" => Some(DataFormat::Excel),
            "parquet" => Some(DataFormat::Parquet),
            "json" => Some(DataFormat::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_supported_extensions_case_insensitively() {
        assert_eq!(DataFormat::from_filename("sales.CSV").unwrap(), DataFormat::Csv);
        assert_eq!(DataFormat::from_filename("book.xlsx").unwrap(), DataFormat::Excel);
        assert_eq!(DataFormat::from_filename("old.xls").unwrap(), DataFormat::Excel);
        assert_eq!(
            DataFormat::from_filename("part.0.parquet").unwrap(),
            DataFormat::Parquet
        );
        assert_eq!(DataFormat::from_filename("dump.json").unwrap(), DataFormat::Json);
    }

    #[test]
    fn rejects_unknown_or_missing_extension() {
        assert!(matches!(
            DataFormat::from_filename("notes.txt"),
            Err(FormatError::UnsupportedFormat { extension }) if extension == "txt"
        ));
        assert!(matches!(
            DataFormat::from_filename("README"),
            Err(FormatError::UnsupportedFormat { .. })
        ));
    }
}
