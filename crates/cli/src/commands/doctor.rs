use std::path::Path;

use serde::Serialize;
use stagecraft_core::config::{AppConfig, LoadOptions};
use stagecraft_store::{CheckpointStoreConfig, FlowCheckpointStore};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            let storage = check_storage_writable(&config.storage.root_dir);
            let storage_ok = storage.status == CheckStatus::Pass;
            checks.push(storage);
            if storage_ok {
                checks.push(check_checkpoint_store(&config));
            } else {
                checks.push(skipped("checkpoint_store", "storage root is not writable"));
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(skipped("storage_writable", "configuration did not load"));
            checks.push(skipped("checkpoint_store", "configuration did not load"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skipped(name: &'static str, reason: &str) -> DoctorCheck {
    DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: format!("skipped because {reason}"),
    }
}

fn check_storage_writable(root: &Path) -> DoctorCheck {
    let scratch = root.join(format!(".doctor-{}.tmp", Uuid::new_v4().simple()));
    let result = std::fs::create_dir_all(root)
        .and_then(|()| std::fs::write(&scratch, b"ok"))
        .and_then(|()| std::fs::remove_file(&scratch));

    match result {
        Ok(()) => DoctorCheck {
            name: "storage_writable",
            status: CheckStatus::Pass,
            details: format!("`{}` accepts writes", root.display()),
        },
        Err(error) => DoctorCheck {
            name: "storage_writable",
            status: CheckStatus::Fail,
            details: format!("`{}` is not writable: {error}", root.display()),
        },
    }
}

fn check_checkpoint_store(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "checkpoint_store",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        FlowCheckpointStore::open(CheckpointStoreConfig::from_app_config(config))
            .await
            .map(|store| store.saved_flow_types().len())
    });

    match result {
        Ok(saved) => DoctorCheck {
            name: "checkpoint_store",
            status: CheckStatus::Pass,
            details: format!("opened with {saved} live checkpoint(s)"),
        },
        Err(error) => DoctorCheck {
            name: "checkpoint_store",
            status: CheckStatus::Fail,
            details: format!("failed to open checkpoint store: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
