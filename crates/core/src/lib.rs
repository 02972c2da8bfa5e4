pub mod config;
pub mod errors;
pub mod flows;
pub mod stages;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use errors::{ApplicationError, DomainError};
pub use flows::{
    FlowDefinition, FlowEngine, FlowProgress, FlowSnapshot, FlowState, FlowTransitionError,
    LinearFlow, StageDataMap, TransitionKind, TransitionOutcome,
};
pub use stages::{
    CountRange, MediaItem, MediaKind, MediaRequirements, StageData, StageDefinition, StageId,
    StageKind, StageValidation, ValidationIssue,
};
