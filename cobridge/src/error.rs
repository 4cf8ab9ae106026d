//! Service-level error kinds and their status codes.

use crate::batch::BatchError;
use crate::compiler::CompileError;
use crate::registry::RegistryError;
use cobridge_common::xchg::BackendError;
use thiserror::Error;

/// Error reported at the verb boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Malformed or incomplete description, or missing "add" fields.
    #[error("invalid description: {0}")]
    InvalidDescription(String),

    /// "add" with a name that is already in use.
    #[error("subscription name already in use: {0}")]
    DuplicateName(String),

    /// "rem" or "subscribe" with an unknown name.
    #[error("no such subscription: {0}")]
    NotFound(String),

    /// A batch or result buffer could not be allocated.
    #[error("resource exhausted")]
    ResourceExhausted,

    /// The backend failed or replied with the wrong shape.
    #[error("backend failure: {0}")]
    BackendFailure(String),

    /// Invariant violation.
    #[error("internal error: {0}")]
    Internal(String),

    /// Verb not served.
    #[error("unknown verb: {0}")]
    UnknownVerb(String),
}

impl ServiceError {
    /// Negative status code of the error kind.
    pub fn status(&self) -> i32 {
        match self {
            ServiceError::InvalidDescription(_) => -22,
            ServiceError::DuplicateName(_) => -17,
            ServiceError::NotFound(_) => -2,
            ServiceError::ResourceExhausted => -12,
            ServiceError::BackendFailure(_) => -5,
            ServiceError::Internal(_) => -14,
            ServiceError::UnknownVerb(_) => -38,
        }
    }
}

impl From<CompileError> for ServiceError {
    fn from(e: CompileError) -> Self {
        match e {
            CompileError::Invalid(msg) => ServiceError::InvalidDescription(msg),
            CompileError::ResourceExhausted => ServiceError::ResourceExhausted,
        }
    }
}

impl From<BatchError> for ServiceError {
    fn from(e: BatchError) -> Self {
        match e {
            BatchError::ResourceExhausted => ServiceError::ResourceExhausted,
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<RegistryError> for ServiceError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::DuplicateName(name) => ServiceError::DuplicateName(name),
            RegistryError::NotFound(name) => ServiceError::NotFound(name),
        }
    }
}

impl From<BackendError> for ServiceError {
    fn from(e: BackendError) -> Self {
        ServiceError::BackendFailure(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_negative_and_distinct() {
        let all = [
            ServiceError::InvalidDescription(String::new()),
            ServiceError::DuplicateName(String::new()),
            ServiceError::NotFound(String::new()),
            ServiceError::ResourceExhausted,
            ServiceError::BackendFailure(String::new()),
            ServiceError::Internal(String::new()),
            ServiceError::UnknownVerb(String::new()),
        ];
        let mut codes: Vec<i32> = all.iter().map(ServiceError::status).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn layer_errors_map_to_kinds() {
        assert_eq!(
            ServiceError::from(CompileError::Invalid("x".into())).status(),
            -22
        );
        assert_eq!(
            ServiceError::from(BatchError::LengthMismatch {
                requests: 1,
                values: 2
            })
            .status(),
            -14
        );
        assert_eq!(ServiceError::from(BatchError::ResourceExhausted).status(), -12);
        assert_eq!(
            ServiceError::from(RegistryError::NotFound("a".into())),
            ServiceError::NotFound("a".into())
        );
        assert_eq!(
            ServiceError::from(BackendError::CommunicationError("bus".into())).status(),
            -5
        );
    }
}
