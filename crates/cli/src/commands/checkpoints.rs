use anyhow::Context;
use serde_json::json;
use stagecraft_store::{CheckpointStoreConfig, FlowCheckpointStore};

use crate::commands::{classify, load_config, runtime, CommandResult};

const COMMAND: &str = "checkpoints";

pub enum CheckpointAction {
    List,
    Clear(String),
    ClearAll,
}

pub fn run(action: CheckpointAction) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let store = FlowCheckpointStore::open(CheckpointStoreConfig::from_app_config(&config))
            .await
            .context("opening checkpoint store")?;

        let outcome = match action {
            CheckpointAction::List => {
                let saved: Vec<_> = store
                    .saved_flow_types()
                    .iter()
                    .filter_map(|flow_type| store.saved_state_info(flow_type))
                    .collect();
                let message = format!("{} saved checkpoint(s)", saved.len());
                (message, Some(serde_json::to_value(saved).context("encoding checkpoints")?))
            }
            CheckpointAction::Clear(flow_type) => {
                let removed = store.clear(&flow_type).await;
                let message = if removed {
                    format!("cleared checkpoint for `{flow_type}`")
                } else {
                    format!("no checkpoint saved for `{flow_type}`")
                };
                (message, Some(json!({ "flow_type": flow_type, "removed": removed })))
            }
            CheckpointAction::ClearAll => {
                let removed = store.clear_all().await;
                (format!("cleared {removed} checkpoint(s)"), Some(json!({ "removed": removed })))
            }
        };
        Ok::<_, anyhow::Error>(outcome)
    });

    match result {
        Ok((message, data)) => CommandResult::success_with_data(COMMAND, message, data),
        Err(error) => CommandResult::from_error(COMMAND, &classify(error)),
    }
}
