use std::collections::HashSet;

use crate::errors::DomainError;
use crate::flows::states::StageDataMap;
use crate::stages::{StageDefinition, StageId};

/// An ordered set of stages plus the policy for moving between them.
///
/// The provided `next_stage` / `previous_stage` resolve by array position.
/// Implementations may override `next_stage` to branch on collected data.
pub trait FlowDefinition {
    fn flow_type(&self) -> &str;

    fn stages(&self) -> &[StageDefinition];

    fn allows_back_navigation(&self) -> bool {
        true
    }

    fn shows_progress(&self) -> bool {
        true
    }

    fn next_stage(&self, current: &StageId, data: &StageDataMap) -> Option<&StageDefinition> {
        let _ = data;
        let index = self.position(current)?;
        self.stages().get(index + 1)
    }

    fn previous_stage(&self, current: &StageId) -> Option<&StageDefinition> {
        let index = self.position(current)?;
        index.checked_sub(1).and_then(|previous| self.stages().get(previous))
    }

    fn stage(&self, id: &StageId) -> Option<&StageDefinition> {
        self.stages().iter().find(|stage| &stage.id == id)
    }

    fn position(&self, id: &StageId) -> Option<usize> {
        self.stages().iter().position(|stage| &stage.id == id)
    }

    fn is_last_stage(&self, id: &StageId) -> bool {
        self.stages().last().map(|stage| &stage.id == id).unwrap_or(false)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinearFlow {
    flow_type: String,
    stages: Vec<StageDefinition>,
    allows_back_navigation: bool,
    shows_progress: bool,
}

impl LinearFlow {
    pub fn new(
        flow_type: impl Into<String>,
        stages: Vec<StageDefinition>,
    ) -> Result<Self, DomainError> {
        let flow_type = flow_type.into();
        if flow_type.trim().is_empty() {
            return Err(DomainError::EmptyFlowType);
        }

        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(&stage.id) {
                return Err(DomainError::DuplicateStage {
                    flow_type,
                    stage: stage.id.clone(),
                });
            }
        }

        Ok(Self { flow_type, stages, allows_back_navigation: true, shows_progress: true })
    }

    pub fn with_back_navigation(mut self, allowed: bool) -> Self {
        self.allows_back_navigation = allowed;
        self
    }

    pub fn with_progress(mut self, shown: bool) -> Self {
        self.shows_progress = shown;
        self
    }
}

impl FlowDefinition for LinearFlow {
    fn flow_type(&self) -> &str {
        &self.flow_type
    }

    fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    fn allows_back_navigation(&self) -> bool {
        self.allows_back_navigation
    }

    fn shows_progress(&self) -> bool {
        self.shows_progress
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::DomainError;
    use crate::flows::definition::{FlowDefinition, LinearFlow};
    use crate::flows::states::StageDataMap;
    use crate::stages::{StageDefinition, StageId};

    fn stages() -> Vec<StageDefinition> {
        vec![
            StageDefinition::selection("select", "Select", &[]),
            StageDefinition::processing("process", "Process"),
            StageDefinition::results("results", "Results"),
        ]
    }

    #[test]
    fn linear_resolution_follows_array_order() {
        let flow = LinearFlow::new("scan", stages()).expect("valid flow");
        let data = StageDataMap::new();

        let next = flow.next_stage(&StageId::from("select"), &data).map(|s| s.id.as_str());
        assert_eq!(next, Some("process"));
        assert!(flow.next_stage(&StageId::from("results"), &data).is_none());
        assert!(flow.previous_stage(&StageId::from("select")).is_none());
        assert_eq!(
            flow.previous_stage(&StageId::from("results")).map(|s| s.id.as_str()),
            Some("process")
        );
        assert!(flow.is_last_stage(&StageId::from("results")));
        assert!(flow.next_stage(&StageId::from("unknown"), &data).is_none());
    }

    #[test]
    fn duplicate_stage_ids_are_rejected() {
        let mut duplicated = stages();
        duplicated.push(StageDefinition::results("select", "Again"));

        let error = LinearFlow::new("scan", duplicated).expect_err("duplicate ids");
        assert!(matches!(
            error,
            DomainError::DuplicateStage { ref stage, .. } if stage.as_str() == "select"
        ));
    }

    #[test]
    fn empty_flow_type_is_rejected() {
        assert_eq!(LinearFlow::new("  ", stages()), Err(DomainError::EmptyFlowType));
    }

    #[test]
    fn policies_default_on_and_can_be_disabled() {
        let flow = LinearFlow::new("scan", stages()).expect("valid flow");
        assert!(flow.allows_back_navigation());
        assert!(flow.shows_progress());

        let flow = flow.with_back_navigation(false).with_progress(false);
        assert!(!flow.allows_back_navigation());
        assert!(!flow.shows_progress());
    }
}
