//! Error types for the override engine and the logger registry

use crate::level::Severity;
use thiserror::Error;

/// How an error should be surfaced to an admin caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Internal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("logger '{0}' does not exist")]
    UnknownLogger(String),

    #[error("the root logger cannot inherit a level")]
    RootCannotInherit,

    #[error("failed to reload log filter: {0}")]
    Reload(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverrideError {
    #[error("duration must be between {min} and {max} seconds, got {seconds}")]
    InvalidDuration { seconds: i64, min: u64, max: u64 },

    #[error("unknown level '{0}', expected one of TRACE, DEBUG, INFO, WARN, ERROR")]
    UnknownLevel(String),

    #[error(
        "logger '{logger}' already runs at {level} without an override; overriding to the baseline is a no-op, use reset instead"
    )]
    BaselineNoOp { logger: String, level: Severity },

    #[error("logger '{0}' does not exist")]
    LoggerNotFound(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl OverrideError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OverrideError::InvalidDuration { .. }
            | OverrideError::UnknownLevel(_)
            | OverrideError::BaselineNoOp { .. } => ErrorKind::Validation,
            OverrideError::LoggerNotFound(_) | OverrideError::Registry(RegistryError::UnknownLogger(_)) => {
                ErrorKind::NotFound
            }
            OverrideError::Registry(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, OverrideError>;
