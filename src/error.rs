use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("failed to parse {}: {source}", path.display())]
    ParseFile {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("invalid UTF-8 input: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no env file found in {}; tried: {}", dir.display(), tried.join(", "))]
    NoEnvFile { dir: PathBuf, tried: Vec<String> },
    #[error("invalid JSON in {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("expected a JSON object in {}", path.display())]
    MetadataNotObject { path: PathBuf },
    #[error("cannot set '{key}' in the process environment: {reason}")]
    UnsupportedEntry { key: String, reason: &'static str },
}

impl Error {
    /// The parse failure behind this error, with or without file context.
    pub fn as_parse_error(&self) -> Option<&ParseError> {
        match self {
            Self::Parse(err) | Self::ParseFile { source: err, .. } => Some(err),
            _ => None,
        }
    }
}

/// A fatal problem in `.env` text. Every variant records the 1-based line
/// it was raised for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Line expected to have key-value pair separated by '='")]
    MissingSeparator { line: u32 },
    #[error("Environment variable key is missing at line: {line}")]
    MissingKey { line: u32 },
    #[error("Environment variable '{key}' value is missing at line: {line}")]
    MissingValue { key: String, line: u32 },
    #[error("At Line '{line}' invalid reference key found \"{reference}\".")]
    InvalidReference { reference: String, line: u32 },
    #[error("Circular reference is not allowed on line '{line}'.")]
    CircularReference { line: u32 },
}

impl ParseError {
    pub fn line(&self) -> u32 {
        match self {
            Self::MissingSeparator { line }
            | Self::MissingKey { line }
            | Self::MissingValue { line, .. }
            | Self::InvalidReference { line, .. }
            | Self::CircularReference { line } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A schema validator rejected the mapping as a whole.
    #[error("{0}")]
    Rejected(String),
    #[error("For key '{key}': {message}")]
    Key { key: String, message: String },
    #[error("Invalid validator object was passed: {0}")]
    InvalidValidator(String),
}
