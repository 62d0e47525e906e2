//! Closed error taxonomy for the compiler and scan pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported extension: {0}")]
    UnsupportedExtension(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("tree-sitter language error")]
    TreeSitterLanguage,

    #[error("compile truncation: {0}")]
    CompileTruncation(String),

    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A recoverable issue recorded on a `CodeObject` or file rather than
/// bubbled up as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WarningKind {
    ParseError,
    CompileTruncation,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ParseError,
            message: message.into(),
        }
    }

    pub fn truncation(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::CompileTruncation,
            message: message.into(),
        }
    }
}
