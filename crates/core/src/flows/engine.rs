use thiserror::Error;
use tracing::{debug, info, warn};

use crate::flows::definition::FlowDefinition;
use crate::flows::states::{
    FlowProgress, FlowSnapshot, FlowState, TransitionKind, TransitionOutcome,
};
use crate::stages::{StageData, StageDefinition, StageId, StageValidation, ValidationIssue};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("flow has not been started or has no stages")]
    NotStarted,
    #[error("flow was already started; use restart to begin again")]
    AlreadyStarted,
    #[error("stage `{stage}` rejected its data: {reasons:?}")]
    ValidationFailed { stage: StageId, reasons: Vec<ValidationIssue> },
    #[error("stage `{stage}` cannot be skipped")]
    SkipNotAllowed { stage: StageId },
    #[error("back navigation is not allowed from stage `{stage}`")]
    BackNavigationNotAllowed { stage: StageId },
    #[error("stage `{stage}` has no previous stage")]
    NoPreviousStage { stage: StageId },
    #[error("stage `{stage}` is not part of flow `{flow_type}`")]
    UnknownStage { flow_type: String, stage: StageId },
}

/// Drives one flow instance. All operations are synchronous and never block.
///
/// Transition methods return `Err` without touching state when the move is
/// not permitted, so callers can surface the reason and keep rendering.
pub struct FlowEngine<F> {
    flow: F,
    state: FlowState,
    started: bool,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow, state: FlowState::default(), started: false }
    }

    /// Rebuilds an engine from a checkpointed snapshot.
    pub fn resume(flow: F, snapshot: FlowSnapshot) -> Result<Self, FlowTransitionError> {
        let referenced = snapshot
            .current_stage
            .iter()
            .chain(snapshot.stage_data.keys())
            .chain(snapshot.completed_stages.iter())
            .chain(snapshot.history.iter());
        for stage in referenced {
            if flow.stage(stage).is_none() {
                return Err(FlowTransitionError::UnknownStage {
                    flow_type: flow.flow_type().to_owned(),
                    stage: stage.clone(),
                });
            }
        }

        debug!(
            event_name = "flow.resumed",
            flow_type = flow.flow_type(),
            current_stage = ?snapshot.current_stage,
            "flow resumed from snapshot"
        );
        Ok(Self { flow, state: snapshot.into(), started: true })
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot::from(&self.state)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn start(&mut self) -> Result<Option<&StageDefinition>, FlowTransitionError> {
        if self.started {
            return Err(FlowTransitionError::AlreadyStarted);
        }
        self.reset();
        Ok(self.current_stage())
    }

    pub fn restart(&mut self) -> Option<&StageDefinition> {
        self.reset();
        info!(
            event_name = "flow.restarted",
            flow_type = self.flow.flow_type(),
            "flow restarted"
        );
        self.current_stage()
    }

    fn reset(&mut self) {
        self.state = FlowState {
            current_stage: self.flow.stages().first().map(|stage| stage.id.clone()),
            ..FlowState::default()
        };
        self.started = true;
    }

    pub fn current_stage(&self) -> Option<&StageDefinition> {
        self.state.current_stage.as_ref().and_then(|id| self.flow.stage(id))
    }

    pub fn set_data(&mut self, stage: impl Into<StageId>, data: StageData) {
        self.state.stage_data.insert(stage.into(), data);
    }

    pub fn get_data(&self, stage: &StageId) -> Option<&StageData> {
        self.state.stage_data.get(stage)
    }

    pub fn clear_data(&mut self, stage: &StageId) -> Option<StageData> {
        self.state.stage_data.remove(stage)
    }

    pub fn validate_current(&self) -> Option<StageValidation> {
        let stage = self.current_stage()?;
        Some(stage.validate(self.get_data(&stage.id)))
    }

    pub fn can_proceed(&self) -> bool {
        let Some(stage) = self.current_stage() else {
            return false;
        };
        let valid = stage.validate(self.get_data(&stage.id)).is_valid();
        valid || (!stage.is_required && stage.can_skip)
    }

    pub fn proceed(&mut self) -> Result<TransitionOutcome, FlowTransitionError> {
        let stage = self.require_current("proceed")?;

        if !self.can_proceed() {
            let reasons = stage.validate(self.get_data(&stage.id)).into_reasons();
            let error = FlowTransitionError::ValidationFailed { stage: stage.id.clone(), reasons };
            return self.reject(error);
        }

        let from = stage.id.clone();
        Ok(self.advance(from, TransitionKind::Advanced))
    }

    /// Moves past the current stage without validating its data. The stage is still
    /// recorded as completed.
    pub fn skip(&mut self) -> Result<TransitionOutcome, FlowTransitionError> {
        let stage = self.require_current("skip")?;

        if !stage.can_skip {
            return self.reject(FlowTransitionError::SkipNotAllowed { stage: stage.id.clone() });
        }

        let from = stage.id.clone();
        Ok(self.advance(from, TransitionKind::Skipped))
    }

    pub fn go_back(&mut self) -> Result<TransitionOutcome, FlowTransitionError> {
        let stage = self.require_current("go_back")?;

        if !self.flow.allows_back_navigation() || !stage.can_go_back {
            return self
                .reject(FlowTransitionError::BackNavigationNotAllowed { stage: stage.id.clone() });
        }

        let Some(previous) = self.flow.previous_stage(&stage.id) else {
            return self.reject(FlowTransitionError::NoPreviousStage { stage: stage.id.clone() });
        };

        let outcome = TransitionOutcome {
            from: stage.id.clone(),
            to: previous.id.clone(),
            kind: TransitionKind::WentBack,
        };
        if self.state.history.last() == Some(&outcome.to) {
            self.state.history.pop();
        }
        self.state.current_stage = Some(outcome.to.clone());
        self.log_applied(&outcome);
        Ok(outcome)
    }

    /// True once the last stage of the flow has itself been advanced past.
    pub fn is_complete(&self) -> bool {
        self.state
            .current_stage
            .as_ref()
            .map(|id| self.flow.is_last_stage(id) && self.state.completed_stages.contains(id))
            .unwrap_or(false)
    }

    pub fn progress(&self) -> FlowProgress {
        let completed = self
            .flow
            .stages()
            .iter()
            .filter(|stage| self.state.completed_stages.contains(&stage.id))
            .count();
        FlowProgress { completed, total: self.flow.stages().len() }
    }

    pub fn set_processing(&mut self, processing: bool) {
        self.state.is_processing = processing;
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(
            event_name = "flow.failed",
            flow_type = self.flow.flow_type(),
            error = %message,
            "flow recorded an error"
        );
        self.state.is_processing = false;
        self.state.error = Some(message);
    }

    pub fn clear_error(&mut self) {
        self.state.error = None;
    }

    fn require_current(&self, operation: &str) -> Result<StageDefinition, FlowTransitionError> {
        match self.current_stage() {
            Some(stage) => Ok(stage.clone()),
            None => {
                warn!(
                    event_name = "flow.transition_without_stage",
                    flow_type = self.flow.flow_type(),
                    operation,
                    "transition requested with no current stage"
                );
                Err(FlowTransitionError::NotStarted)
            }
        }
    }

    fn advance(&mut self, from: StageId, kind: TransitionKind) -> TransitionOutcome {
        self.state.completed_stages.insert(from.clone());

        let next =
            self.flow.next_stage(&from, &self.state.stage_data).map(|stage| stage.id.clone());
        let outcome = match next {
            Some(to) => {
                self.state.history.push(from.clone());
                self.state.current_stage = Some(to.clone());
                TransitionOutcome { from, to, kind }
            }
            None => {
                TransitionOutcome { from: from.clone(), to: from, kind: TransitionKind::Completed }
            }
        };

        self.log_applied(&outcome);
        outcome
    }

    fn reject<T>(&self, error: FlowTransitionError) -> Result<T, FlowTransitionError> {
        debug!(
            event_name = "flow.transition_rejected",
            flow_type = self.flow.flow_type(),
            error = %error,
            "flow transition rejected"
        );
        Err(error)
    }

    fn log_applied(&self, outcome: &TransitionOutcome) {
        info!(
            event_name = "flow.transition_applied",
            flow_type = self.flow.flow_type(),
            from = %outcome.from,
            to = %outcome.to,
            kind = ?outcome.kind,
            "flow transition applied"
        );
    }
}
