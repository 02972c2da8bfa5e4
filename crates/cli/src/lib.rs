pub mod commands;

use clap::{Parser, Subcommand};
use stagecraft_core::config::{AppConfig, LoadOptions};
use std::process::ExitCode;

use commands::checkpoints::CheckpointAction;
use commands::demo::DemoOptions;
use commands::history::HistoryAction;

#[derive(Debug, Parser)]
#[command(
    name = "stagecraft",
    about = "Stagecraft operator CLI",
    long_about = "Inspect configuration, check storage readiness, manage saved flow checkpoints and results history, and run a scripted demo flow.",
    after_help = "Examples:\n  stagecraft doctor --json\n  stagecraft demo --area hands\n  stagecraft history scan"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, storage writability, and checkpoint store readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List or clear saved in-progress flow checkpoints")]
    Checkpoints {
        #[arg(long, value_name = "FLOW_TYPE", help = "Clear the checkpoint for one flow type")]
        clear: Option<String>,
        #[arg(long, conflicts_with = "clear", help = "Clear every saved checkpoint")]
        clear_all: bool,
    },
    #[command(about = "List, delete, or clear completed results for a history category")]
    History {
        #[arg(help = "History category, for example `scan`")]
        category: String,
        #[arg(long, value_name = "ID", help = "Delete one result by id")]
        delete: Option<String>,
        #[arg(long, conflicts_with = "delete", help = "Remove every result in the category")]
        clear: bool,
    },
    #[command(about = "Run the scripted scan flow end to end and store its result")]
    Demo {
        #[arg(long, default_value = "face", help = "Area to select in the first stage")]
        area: String,
        #[arg(long, help = "Fixed score to record instead of the derived one")]
        score: Option<u32>,
    },
}

fn init_logging() {
    use stagecraft_core::config::LogFormat::*;
    use tracing::Level;

    let Ok(config) = AppConfig::load(LoadOptions::default()) else {
        return;
    };
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::WARN);
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(log_level);

    // Commands own stdout, so a subscriber that is already set is left alone.
    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Checkpoints { clear, clear_all } => {
            let action = match (clear, clear_all) {
                (_, true) => CheckpointAction::ClearAll,
                (Some(flow_type), false) => CheckpointAction::Clear(flow_type),
                (None, false) => CheckpointAction::List,
            };
            commands::checkpoints::run(action)
        }
        Command::History { category, delete, clear } => {
            let action = match (delete, clear) {
                (_, true) => HistoryAction::Clear,
                (Some(id), false) => HistoryAction::Delete(id),
                (None, false) => HistoryAction::List,
            };
            commands::history::run(&category, action)
        }
        Command::Demo { area, score } => commands::demo::run(DemoOptions { area, score }),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
