use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable error category carried by every [`FractalityError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvariantViolation,
    SourceInvalid,
    ParseFailure,
    NetworkFailure,
    ConfigurationError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvariantViolation => "invariant_violation",
            Self::SourceInvalid => "source_invalid",
            Self::ParseFailure => "parse_failure",
            Self::NetworkFailure => "network_failure",
            Self::ConfigurationError => "configuration_error",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FractalityError {
    /// A graph mutation would break parent/child, depth or acyclicity rules.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    /// The source resolved but does not look like a serialized graph.
    #[error("Invalid source: {0}")]
    SourceInvalid(String),
    #[error("Parse failure: {0}")]
    ParseFailure(String),
    #[error("Network failure: {0}")]
    NetworkFailure(String),
    /// Unknown layout name, unknown feature flag, out-of-range option.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl FractalityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::SourceInvalid(_) => ErrorKind::SourceInvalid,
            Self::ParseFailure(_) => ErrorKind::ParseFailure,
            Self::NetworkFailure(_) => ErrorKind::NetworkFailure,
            Self::Configuration(_) => ErrorKind::ConfigurationError,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvariantViolation(m)
            | Self::SourceInvalid(m)
            | Self::ParseFailure(m)
            | Self::NetworkFailure(m)
            | Self::Configuration(m) => m,
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

impl From<serde_json::Error> for FractalityError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseFailure(err.to_string())
    }
}

pub type Result<T, E = FractalityError> = std::result::Result<T, E>;
