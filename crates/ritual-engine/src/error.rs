use ritual_core::{ConflictError, RuleError, ValidationError};
use thiserror::Error;

use crate::remote::Channel;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("no identity is signed in")]
    NoSession,
    #[error("progress is still loading")]
    NotHydrated,
    #[error(transparent)]
    Rule(#[from] RuleError),
    /// The action needs the remote service and it is unreachable right now.
    /// Nothing local was changed; the caller may try again later.
    #[error("{channel} service unavailable: {message}")]
    Deferred { channel: Channel, message: String },
}

impl EngineError {
    pub fn reason_code(&self) -> &str {
        match self {
            EngineError::NoSession => "session_missing",
            EngineError::NotHydrated => "session_loading",
            EngineError::Rule(err) => err.reason_code(),
            EngineError::Deferred { .. } => "remote_unavailable",
        }
    }

    pub fn rule(&self) -> Option<&RuleError> {
        match self {
            EngineError::Rule(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Rule(err.into())
    }
}

impl From<ConflictError> for EngineError {
    fn from(err: ConflictError) -> Self {
        EngineError::Rule(err.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
