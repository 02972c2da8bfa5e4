pub mod checkpoints;
pub mod config;
pub mod demo;
pub mod doctor;
pub mod history;

use serde::Serialize;
use serde_json::Value;
use stagecraft_core::config::{AppConfig, LoadOptions};
use stagecraft_core::{ApplicationError, DomainError, FlowTransitionError};
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            retryable: None,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            retryable: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Failure payload whose class, exit code and retry hint come from `error`.
    pub fn from_error(command: &str, error: &ApplicationError) -> Self {
        let exit_code = match error {
            ApplicationError::Configuration(_) => 2,
            ApplicationError::Persistence(_) => 4,
            ApplicationError::Domain(_) => 5,
            ApplicationError::InvalidInput(_) => 6,
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error.error_class().to_string()),
            message: error.to_string(),
            retryable: Some(error.is_retryable()),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Maps a command body's error onto the application taxonomy. Anything that
/// is not a flow or domain error came from storage.
pub(crate) fn classify(error: anyhow::Error) -> ApplicationError {
    if let Some(transition) = error.downcast_ref::<FlowTransitionError>() {
        return transition.clone().into();
    }
    if let Some(domain) = error.downcast_ref::<DomainError>() {
        return domain.clone().into();
    }
    ApplicationError::Persistence(format!("{error:#}"))
}

/// Loads config for a command, mapping failures to exit code 2.
pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::from_error(command, &ApplicationError::Configuration(error.to_string()))
    })
}

pub(crate) fn runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use stagecraft_core::{ApplicationError, DomainError, FlowTransitionError, StageId};

    use super::{classify, CommandResult};

    #[test]
    fn flow_and_domain_errors_keep_their_class_through_anyhow() {
        let transition = anyhow::Error::from(FlowTransitionError::SkipNotAllowed {
            stage: StageId::from("capture"),
        });
        assert_eq!(classify(transition).error_class(), "flow_transition");

        let invariant = anyhow::Error::from(DomainError::InvariantViolation("stuck".to_owned()))
            .context("running scan");
        assert_eq!(classify(invariant).error_class(), "domain");

        let storage = anyhow::anyhow!("disk full").context("opening history");
        assert_eq!(
            classify(storage),
            ApplicationError::Persistence("opening history: disk full".to_owned())
        );
    }

    #[test]
    fn error_payload_carries_class_exit_code_and_retry_hint() {
        let result = CommandResult::from_error(
            "history",
            &ApplicationError::Persistence("disk full".to_owned()),
        );
        assert_eq!(result.exit_code, 4);

        let payload: Value = serde_json::from_str(&result.output).expect("json payload");
        assert_eq!(payload["error_class"], "persistence");
        assert_eq!(payload["retryable"], true);
        assert_eq!(payload["message"], "persistence failure: disk full");
    }
}
