//! Error types for Health Lens

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while ingesting or analyzing an export
#[derive(Debug, Error)]
pub enum LensError {
    #[error("No ingestible export found under {0}")]
    SourceNotFound(PathBuf),

    #[error("Multiple export files found: {0:?}")]
    AmbiguousSource(Vec<PathBuf>),

    #[error("Failed to parse export: {0}")]
    ParseFailure(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Degenerate statistic: {0}")]
    DegenerateStatistic(String),

    #[error("No candidate encoding could decode {0}")]
    EncodingFailure(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LensError {
    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            LensError::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            LensError::AmbiguousSource(_) => "AMBIGUOUS_SOURCE",
            LensError::ParseFailure(_) => "PARSE_FAILURE",
            LensError::InsufficientData(_) => "INSUFFICIENT_DATA",
            LensError::DegenerateStatistic(_) => "DEGENERATE_STATISTIC",
            LensError::EncodingFailure(_) => "ENCODING_FAILURE",
            LensError::Config(_) => "CONFIG_ERROR",
            LensError::Io(_) => "IO_ERROR",
        }
    }
}

impl From<zip::result::ZipError> for LensError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => LensError::Io(io),
            other => LensError::ParseFailure(format!("archive: {}", other)),
        }
    }
}

impl From<toml::de::Error> for LensError {
    fn from(e: toml::de::Error) -> Self {
        LensError::Config(e.to_string())
    }
}
