use anyhow::Context;
use serde_json::{json, Value};
use stagecraft_core::ApplicationError;
use stagecraft_store::{HistoryStoreConfig, ResultsHistoryStore, StoredResult};
use uuid::Uuid;

use crate::commands::{classify, load_config, runtime, CommandResult};

const COMMAND: &str = "history";

pub enum HistoryAction {
    List,
    Delete(String),
    Clear,
}

enum Resolved {
    List,
    Delete(Uuid),
    Clear,
}

pub fn run(category: &str, action: HistoryAction) -> CommandResult {
    let action = match action {
        HistoryAction::List => Resolved::List,
        HistoryAction::Clear => Resolved::Clear,
        HistoryAction::Delete(raw_id) => match Uuid::parse_str(raw_id.trim()) {
            Ok(id) => Resolved::Delete(id),
            Err(error) => {
                let error = ApplicationError::InvalidInput(format!(
                    "`{raw_id}` is not a result id: {error}"
                ));
                return CommandResult::from_error(COMMAND, &error);
            }
        },
    };
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let store: ResultsHistoryStore<Value> =
            ResultsHistoryStore::open(HistoryStoreConfig::from_app_config(&config, category))
                .await
                .with_context(|| format!("opening history `{category}`"))?;

        let outcome = match action {
            Resolved::List => {
                let results = store.results().await;
                let message = format!("{} result(s) in `{category}`", results.len());
                (message, Some(Value::Array(results.iter().map(summarize).collect())))
            }
            Resolved::Delete(id) => {
                let removed = store.delete(id).await;
                let message =
                    if removed { format!("deleted {id}") } else { format!("no result {id}") };
                (message, Some(json!({ "id": id, "removed": removed })))
            }
            Resolved::Clear => {
                let cleared = store.clear_all().await;
                anyhow::ensure!(cleared, "history `{category}` could not be cleared");
                (format!("cleared `{category}`"), None)
            }
        };
        Ok::<_, anyhow::Error>(outcome)
    });

    match result {
        Ok((message, data)) => CommandResult::success_with_data(COMMAND, message, data),
        Err(error) => CommandResult::from_error(COMMAND, &classify(error)),
    }
}

fn summarize(entry: &StoredResult<Value>) -> Value {
    json!({
        "id": entry.id,
        "created_at": entry.created_at,
        "result": entry.result,
        "media": entry.media.len(),
    })
}
