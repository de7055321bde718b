//! Error types for EAR tools
//!
//! This module defines all error types used throughout the crate,
//! providing detailed error information for debugging and user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for EAR tools operations
#[derive(Error, Debug)]
pub enum EarToolsError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File or directory not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Malformed delimited file
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A required column is missing from a telemetry file
    #[error("Column '{column}' missing from '{path}'")]
    MissingColumn { path: PathBuf, column: String },

    /// A cell that must be numeric could not be parsed
    #[error("Invalid value '{value}' in column '{column}' of '{path}' (row {row})")]
    InvalidValue {
        path: PathBuf,
        column: String,
        row: usize,
        value: String,
    },

    /// Input ended before the wizard got an answer
    #[error("Input ended while waiting for: {0}")]
    PromptAborted(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Shared library could not be loaded
    #[error("Failed to load library '{path}': {message}")]
    LibraryLoad { path: PathBuf, message: String },

    /// Exported function missing from a loaded library
    #[error("Symbol '{symbol}' not found in '{path}': {message}")]
    SymbolNotFound {
        path: PathBuf,
        symbol: String,
        message: String,
    },

    /// Job description could not be built from the environment
    #[error("Job environment error: {0}")]
    JobEnvironment(String),

    /// Native side modified a record it received by reference
    #[error("Field '{field}' of the job record changed across the native call")]
    RecordCorrupted { field: String },

    /// Unsupported operation on this platform
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<EarToolsError>,
    },
}

impl EarToolsError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a CSV error with path context
    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    /// Create a missing column error
    pub fn missing_column(path: impl Into<PathBuf>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            path: path.into(),
            column: column.into(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Check if this error came from the interactive input running dry
    pub fn is_aborted(&self) -> bool {
        match self {
            Self::PromptAborted(_) => true,
            Self::WithContext { source, .. } => source.is_aborted(),
            _ => false,
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. }
            | Self::NotFound(path)
            | Self::Csv { path, .. }
            | Self::MissingColumn { path, .. }
            | Self::InvalidValue { path, .. }
            | Self::LibraryLoad { path, .. }
            | Self::SymbolNotFound { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type alias for EAR tools operations
pub type Result<T> = std::result::Result<T, EarToolsError>;

impl From<std::io::Error> for EarToolsError {
    fn from(err: std::io::Error) -> Self {
        EarToolsError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for EarToolsError {
    fn from(err: serde_json::Error) -> Self {
        EarToolsError::Serialization(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| EarToolsError::io(path, e))
    }
}

/// Extension trait for adding path context to csv::Result
pub trait CsvResultExt<T> {
    /// Add path context to a CSV error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> CsvResultExt<T> for csv::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| EarToolsError::csv(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = EarToolsError::io("/test/loops.csv", io_err);
        assert!(err.path().is_some());
        assert_eq!(err.path().unwrap(), &PathBuf::from("/test/loops.csv"));
    }

    #[test]
    fn test_aborted_through_context() {
        let err = EarToolsError::PromptAborted("cluster size".into()).with_context("cluster section");
        assert!(err.is_aborted());
        assert!(!EarToolsError::config("bad").is_aborted());
    }

    #[test]
    fn test_missing_column_message() {
        let err = EarToolsError::missing_column("/tmp/l.csv", "JOBID");
        assert_eq!(err.to_string(), "Column 'JOBID' missing from '/tmp/l.csv'");
    }
}
