use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use stagecraft_cli::commands::checkpoints::{self, CheckpointAction};
use stagecraft_cli::commands::demo::{self, DemoOptions};
use stagecraft_cli::commands::history::{self, HistoryAction};
use stagecraft_cli::commands::{config, doctor};
use tempfile::TempDir;

#[test]
fn demo_completes_and_clears_its_checkpoint() {
    let root = TempDir::new().expect("temp dir");
    with_env(&[("STAGECRAFT_STORAGE_ROOT_DIR", root_str(&root))], || {
        let result = demo::run(DemoOptions { area: "hands".to_string(), score: Some(77) });
        assert_eq!(result.exit_code, 0, "expected demo success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "demo");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["flow_type"], "scan");
        assert_eq!(payload["data"]["resumed_at"], "capture");
        assert_eq!(payload["data"]["score"], 77);
        assert_eq!(payload["data"]["checkpoint_cleared"], true);
        assert_eq!(payload["data"]["transitions"].as_array().map(Vec::len), Some(4));
        assert_eq!(payload["data"]["progress"]["completed"], 4);
    });
}

#[test]
fn repeated_demo_runs_keep_only_the_newest_results() {
    let root = TempDir::new().expect("temp dir");
    with_env(
        &[
            ("STAGECRAFT_STORAGE_ROOT_DIR", root_str(&root)),
            ("STAGECRAFT_HISTORY_MAX_RESULTS", "2"),
        ],
        || {
            let mut last = Value::Null;
            for score in [70, 80, 90] {
                let result =
                    demo::run(DemoOptions { area: "face".to_string(), score: Some(score) });
                assert_eq!(result.exit_code, 0, "demo run failed: {}", result.output);
                last = parse_payload(&result.output);
            }

            assert_eq!(last["data"]["history_scores"], serde_json::json!([90, 80]));

            let listed = parse_payload(&history::run("scan", HistoryAction::List).output);
            assert_eq!(listed["status"], "ok");
            let entries = listed["data"].as_array().expect("history entries");
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0]["result"]["score"], 90);
            assert_eq!(entries[0]["media"], 1);
        },
    );
}

#[test]
fn demo_with_unknown_area_fails_validation() {
    let root = TempDir::new().expect("temp dir");
    with_env(&[("STAGECRAFT_STORAGE_ROOT_DIR", root_str(&root))], || {
        let result = demo::run(DemoOptions { area: "elbow".to_string(), score: None });
        assert_eq!(result.exit_code, 5);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "flow_transition");
        assert_eq!(payload["retryable"], false);
        assert!(
            payload["message"].as_str().unwrap_or_default().contains("select"),
            "message should name the failing stage: {}",
            payload["message"]
        );
    });
}

#[test]
fn checkpoints_list_is_empty_on_fresh_storage() {
    let root = TempDir::new().expect("temp dir");
    with_env(&[("STAGECRAFT_STORAGE_ROOT_DIR", root_str(&root))], || {
        let result = checkpoints::run(CheckpointAction::List);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "checkpoints");
        assert_eq!(payload["data"], serde_json::json!([]));

        let cleared = parse_payload(&checkpoints::run(CheckpointAction::ClearAll).output);
        assert_eq!(cleared["data"]["removed"], 0);

        let missing =
            parse_payload(&checkpoints::run(CheckpointAction::Clear("scan".to_string())).output);
        assert_eq!(missing["data"]["removed"], false);
    });
}

#[test]
fn history_delete_and_clear_after_demo() {
    let root = TempDir::new().expect("temp dir");
    with_env(&[("STAGECRAFT_STORAGE_ROOT_DIR", root_str(&root))], || {
        let result = demo::run(DemoOptions { area: "scalp".to_string(), score: Some(61) });
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let id = parse_payload(&result.output)["data"]["result_id"]
            .as_str()
            .expect("result id")
            .to_string();

        let deleted = parse_payload(&history::run("scan", HistoryAction::Delete(id)).output);
        assert_eq!(deleted["data"]["removed"], true);

        let bad = history::run("scan", HistoryAction::Delete("not-a-uuid".to_string()));
        assert_eq!(bad.exit_code, 6);
        assert_eq!(parse_payload(&bad.output)["error_class"], "invalid_input");

        let cleared = history::run("scan", HistoryAction::Clear);
        assert_eq!(cleared.exit_code, 0);
        let listed = parse_payload(&history::run("scan", HistoryAction::List).output);
        assert_eq!(listed["data"], serde_json::json!([]));
    });
}

#[test]
fn invalid_category_is_a_persistence_failure() {
    let root = TempDir::new().expect("temp dir");
    with_env(&[("STAGECRAFT_STORAGE_ROOT_DIR", root_str(&root))], || {
        let result = history::run("../escape", HistoryAction::List);
        assert_eq!(result.exit_code, 4);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "persistence");
        assert_eq!(payload["retryable"], true);
    });
}

#[test]
fn commands_report_config_validation_failures() {
    let root = TempDir::new().expect("temp dir");
    with_env(
        &[
            ("STAGECRAFT_STORAGE_ROOT_DIR", root_str(&root)),
            ("STAGECRAFT_HISTORY_MAX_RESULTS", "0"),
        ],
        || {
            let result = demo::run(DemoOptions { area: "face".to_string(), score: None });
            assert_eq!(result.exit_code, 2);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");

            let listed = checkpoints::run(CheckpointAction::List);
            assert_eq!(listed.exit_code, 2);
        },
    );
}

#[test]
fn config_reports_env_sources() {
    let root = TempDir::new().expect("temp dir");
    with_env(
        &[
            ("STAGECRAFT_STORAGE_ROOT_DIR", root_str(&root)),
            ("STAGECRAFT_CHECKPOINT_TTL_SECS", "3600"),
        ],
        || {
            let output = config::run();
            assert!(output.contains("checkpoints.ttl_secs = 3600"), "{output}");
            assert!(output.contains("env (STAGECRAFT_CHECKPOINT_TTL_SECS)"), "{output}");
            assert!(output.contains("history.max_results = 50 (source: default)"), "{output}");
        },
    );
}

#[test]
fn doctor_passes_on_writable_storage() {
    let root = TempDir::new().expect("temp dir");
    with_env(&[("STAGECRAFT_STORAGE_ROOT_DIR", root_str(&root))], || {
        let report: Value =
            serde_json::from_str(&doctor::run(true)).expect("doctor should emit json");
        assert_eq!(report["overall_status"], "pass", "{report}");
        let names: Vec<&str> = report["checks"]
            .as_array()
            .expect("checks")
            .iter()
            .filter_map(|check| check["name"].as_str())
            .collect();
        assert_eq!(names, ["config_validation", "storage_writable", "checkpoint_store"]);
    });
}

#[test]
fn doctor_skips_storage_checks_when_config_is_invalid() {
    with_env(&[("STAGECRAFT_CHECKPOINT_TTL_SECS", "soon")], || {
        let report: Value =
            serde_json::from_str(&doctor::run(true)).expect("doctor should emit json");
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(report["checks"][0]["status"], "fail");
        assert_eq!(report["checks"][1]["status"], "skipped");
        assert_eq!(report["checks"][2]["status"], "skipped");
    });
}

fn root_str(root: &TempDir) -> &str {
    root.path().to_str().expect("temp dir path should be utf-8")
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be json")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "STAGECRAFT_STORAGE_ROOT_DIR",
        "STAGECRAFT_CHECKPOINT_TTL_SECS",
        "STAGECRAFT_HISTORY_MAX_RESULTS",
        "STAGECRAFT_LOGGING_LEVEL",
        "STAGECRAFT_LOGGING_FORMAT",
        "STAGECRAFT_LOG_LEVEL",
        "STAGECRAFT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
