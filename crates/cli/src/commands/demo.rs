//! Scripted `select -> capture -> process -> results` run that exercises the
//! engine, a checkpoint/resume cycle and the results history end to end.

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stagecraft_core::{
    AppConfig, CountRange, DomainError, FlowEngine, FlowSnapshot, LinearFlow, MediaItem, MediaKind,
    MediaRequirements, StageData, StageDefinition, TransitionOutcome,
};
use stagecraft_store::{
    Checkpoint, CheckpointStoreConfig, FlowCheckpointStore, HistoryStoreConfig, MediaBlob,
    MediaDirectory, PersistedFlowState, ResultsHistoryStore,
};

use crate::commands::{classify, load_config, runtime, CommandResult};

const COMMAND: &str = "demo";
pub const FLOW_TYPE: &str = "scan";
const AREAS: [&str; 3] = ["face", "hands", "scalp"];
const SAMPLE_PHOTO: &[u8] = b"\xFF\xD8\xFF\xE0stagecraft-demo-photo\xFF\xD9";

#[derive(Debug, Serialize, Deserialize)]
struct ScanCheckpoint {
    snapshot: FlowSnapshot,
    photos: Vec<String>,
}

impl Checkpoint for ScanCheckpoint {
    const FLOW_TYPE: &'static str = FLOW_TYPE;

    fn is_valid(&self, media: &MediaDirectory) -> bool {
        self.photos.iter().all(|photo| media.exists(photo))
    }

    fn media_files(&self) -> Vec<String> {
        self.photos.clone()
    }
}

pub struct DemoOptions {
    pub area: String,
    pub score: Option<u32>,
}

pub fn scan_flow() -> anyhow::Result<LinearFlow> {
    let flow = LinearFlow::new(
        FLOW_TYPE,
        vec![
            StageDefinition::selection("select", "Choose an area", &AREAS),
            StageDefinition::media_capture(
                "capture",
                "Take a photo",
                MediaRequirements::images(CountRange::new(1, 3)),
            )
            .with_subtitle("Good light, no filters"),
            StageDefinition::processing("process", "Analyzing"),
            StageDefinition::results("results", "Your results").without_back(),
        ],
    )?;
    Ok(flow)
}

pub fn run(options: DemoOptions) -> CommandResult {
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    match runtime.block_on(run_scan(&config, options)) {
        Ok(data) => CommandResult::success_with_data(
            COMMAND,
            "scan flow completed and saved to history",
            Some(data),
        ),
        Err(error) => CommandResult::from_error(COMMAND, &classify(error)),
    }
}

async fn run_scan(config: &AppConfig, options: DemoOptions) -> anyhow::Result<Value> {
    let checkpoints = FlowCheckpointStore::open(CheckpointStoreConfig::from_app_config(config))
        .await
        .context("opening checkpoint store")?;
    let history: ResultsHistoryStore<Value> =
        ResultsHistoryStore::open(HistoryStoreConfig::from_app_config(config, FLOW_TYPE))
            .await
            .context("opening history")?;

    let mut transitions: Vec<TransitionOutcome> = Vec::new();
    let mut engine = FlowEngine::new(scan_flow()?);
    engine.start()?;

    engine.set_data("select", StageData::selection([options.area.as_str()]));
    transitions.push(engine.proceed()?);

    let photo = checkpoints
        .save_image(SAMPLE_PHOTO, "capture", FLOW_TYPE)
        .await
        .ok_or_else(|| anyhow!("photo could not be stored"))?;
    engine.set_data("capture", StageData::media(vec![MediaItem::new(MediaKind::Image, &photo)]));

    let stage =
        engine.current_stage().map(|stage| stage.id.clone()).context("flow has no stage")?;
    let checkpoint = PersistedFlowState::new(
        stage,
        ScanCheckpoint { snapshot: engine.snapshot(), photos: vec![photo.clone()] },
    );
    anyhow::ensure!(checkpoints.save(&checkpoint).await, "checkpoint could not be saved");
    drop(engine);

    let restored = checkpoints
        .load::<ScanCheckpoint>()
        .await
        .ok_or_else(|| anyhow!("checkpoint was not resumable"))?;
    let mut engine = FlowEngine::resume(scan_flow()?, restored.payload.snapshot)?;
    let resumed_at = restored.current_stage_id;
    transitions.push(engine.proceed()?);

    engine.set_processing(true);
    let score = options.score.unwrap_or_else(|| default_score(&options.area));
    engine.set_data("process", StageData::processing_finished());
    engine.set_processing(false);
    transitions.push(engine.proceed()?);

    let summary = json!({ "area": options.area, "score": score });
    engine.set_data("results", StageData::Results { summary: summary.clone() });
    transitions.push(engine.proceed()?);
    if !engine.is_complete() {
        let stage = engine.current_stage().map(|stage| stage.id.to_string()).unwrap_or_default();
        return Err(
            DomainError::InvariantViolation(format!("scan flow stopped at `{stage}`")).into()
        );
    }

    let photo_bytes = checkpoints
        .load_media(&photo)
        .await
        .ok_or_else(|| anyhow!("checkpoint photo disappeared"))?;
    let thumbnail = photo_bytes.iter().take(8).copied().collect::<Vec<u8>>();
    let stored = history
        .save(summary, vec![MediaBlob::image(photo_bytes).with_thumbnail(thumbnail)])
        .await
        .ok_or_else(|| anyhow!("result could not be saved to history"))?;
    checkpoints.clear(FLOW_TYPE).await;

    let history_scores: Vec<Value> =
        history.results().await.into_iter().map(|entry| entry.result["score"].clone()).collect();

    Ok(json!({
        "flow_type": FLOW_TYPE,
        "resumed_at": resumed_at,
        "transitions": transitions,
        "progress": engine.progress(),
        "result_id": stored.id,
        "score": score,
        "history_scores": history_scores,
        "checkpoint_cleared": !checkpoints.has_saved_state(FLOW_TYPE),
    }))
}

fn default_score(area: &str) -> u32 {
    let spread = area
        .bytes()
        .fold(0u32, |acc, byte| acc.wrapping_mul(31).wrapping_add(u32::from(byte)));
    60 + spread % 40
}
