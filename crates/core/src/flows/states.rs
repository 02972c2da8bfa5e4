use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::stages::{StageData, StageId};

pub type StageDataMap = BTreeMap<StageId, StageData>;

/// Live state of one flow instance.
///
/// `current_stage` is `None` before `start` and for flows without stages.
/// `completed_stages` only grows until the flow is restarted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowState {
    pub current_stage: Option<StageId>,
    pub stage_data: StageDataMap,
    pub completed_stages: BTreeSet<StageId>,
    pub history: Vec<StageId>,
    pub is_processing: bool,
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Advanced,
    Skipped,
    WentBack,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: StageId,
    pub to: StageId,
    pub kind: TransitionKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowProgress {
    pub completed: usize,
    pub total: usize,
}

impl FlowProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64
    }
}

/// Serializable copy of a flow's state, used as (part of) a checkpoint payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub current_stage: Option<StageId>,
    pub stage_data: StageDataMap,
    pub completed_stages: BTreeSet<StageId>,
    pub history: Vec<StageId>,
}

impl From<&FlowState> for FlowSnapshot {
    fn from(state: &FlowState) -> Self {
        Self {
            current_stage: state.current_stage.clone(),
            stage_data: state.stage_data.clone(),
            completed_stages: state.completed_stages.clone(),
            history: state.history.clone(),
        }
    }
}

impl From<FlowSnapshot> for FlowState {
    fn from(snapshot: FlowSnapshot) -> Self {
        Self {
            current_stage: snapshot.current_stage,
            stage_data: snapshot.stage_data,
            completed_stages: snapshot.completed_stages,
            history: snapshot.history,
            is_processing: false,
            error: None,
        }
    }
}
