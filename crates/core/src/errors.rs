use thiserror::Error;

use crate::{flows::FlowTransitionError, stages::StageId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("flow type must not be empty")]
    EmptyFlowType,
    #[error("flow `{flow_type}` declares stage `{stage}` more than once")]
    DuplicateStage { flow_type: String, stage: StageId },
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration issue: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ApplicationError {
    /// Stable machine-readable class used in CLI JSON output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::FlowTransition(_)) => "flow_transition",
            Self::Domain(_) => "domain",
            Self::Persistence(_) => "persistence",
            Self::Configuration(_) => "config_validation",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

impl From<FlowTransitionError> for ApplicationError {
    fn from(value: FlowTransitionError) -> Self {
        Self::Domain(DomainError::FlowTransition(value))
    }
}
