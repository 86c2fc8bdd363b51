use thiserror::Error;

#[derive(Error, Debug)]
pub enum XdfError {
    #[error("Input file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse XDF file: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Stream '{name}' not found in file (available: {available:?})")]
    StreamNotFound { name: String, available: Vec<String> },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, XdfError>;
