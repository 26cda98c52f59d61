//! Error types for promflat

use std::fmt;

/// Result type alias for promflat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for promflat
#[derive(Debug)]
pub enum Error {
    /// Arrow-related errors
    Arrow(arrow::error::ArrowError),
    /// Parquet-related errors
    Parquet(parquet::errors::ParquetError),
    /// IO errors
    Io(std::io::Error),
    /// HTTP transport errors
    Http(reqwest::Error),
    /// Serialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// Declaration missing a required field
    InvalidDeclaration(String),
    /// Declared type does not map to a known shape
    UnsupportedShape(String),
    /// Output format not supported by the sink
    UnsupportedFormat(String),
    /// Backend returned an error or an unexpected payload
    Query(String),
    /// Range window could not be resolved
    TimeRange(String),
    /// Timeout
    Timeout,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Arrow(e) => Some(e),
            Error::Parquet(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Arrow(e) => write!(f, "Arrow error: {}", e),
            Error::Parquet(e) => write!(f, "Parquet error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Http(e) => write!(f, "HTTP error: {}", e),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::InvalidDeclaration(msg) => write!(f, "Invalid declaration: {}", msg),
            Error::UnsupportedShape(kind) => write!(f, "Unsupported metric type: {}", kind),
            Error::UnsupportedFormat(format) => write!(f, "Unsupported output format: {}", format),
            Error::Query(msg) => write!(f, "Query error: {}", msg),
            Error::TimeRange(msg) => write!(f, "Time range error: {}", msg),
            Error::Timeout => write!(f, "Operation timed out"),
        }
    }
}

impl From<arrow::error::ArrowError> for Error {
    fn from(e: arrow::error::ArrowError) -> Self {
        Error::Arrow(e)
    }
}

impl From<parquet::errors::ParquetError> for Error {
    fn from(e: parquet::errors::ParquetError) -> Self {
        Error::Parquet(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else {
            Error::Http(e)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
