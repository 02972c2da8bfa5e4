pub mod definition;
pub mod engine;
pub mod states;

pub use definition::{FlowDefinition, LinearFlow};
pub use engine::{FlowEngine, FlowTransitionError};
pub use states::{
    FlowProgress, FlowSnapshot, FlowState, StageDataMap, TransitionKind, TransitionOutcome,
};
