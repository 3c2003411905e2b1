use thiserror::Error;

pub type EditResult<T> = Result<T, EditError>;

/// Failures raised by the editing protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// The model lacks the capability the requested mutation needs.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    /// Out-of-range or malformed point index.
    #[error("invalid index: {0}")]
    InvalidIndex(String),
    /// The mutation would break the model's own structural invariant,
    /// e.g. dropping below its minimum point count.
    #[error("validation violation: {0}")]
    ValidationViolation(String),
    /// An installed model lacks a capability the controller always requires.
    #[error("contract violation: {0}")]
    ContractViolation(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl EditError {
    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        Self::UnsupportedOperation(what.into())
    }
}
