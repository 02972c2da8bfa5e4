use serde_json::json;
use stagecraft_core::{
    CountRange, FlowEngine, FlowSnapshot, FlowTransitionError, LinearFlow, MediaItem, MediaKind,
    MediaRequirements, StageData, StageDefinition, StageId, StageKind, TransitionKind,
};

fn onboarding_flow() -> LinearFlow {
    LinearFlow::new(
        "onboarding",
        vec![
            StageDefinition::selection("goal", "What brings you here?", &["hydrate", "repair"]),
            StageDefinition::new(
                "profile",
                "Tell us about yourself",
                StageKind::Profile {
                    required_fields: vec!["age".to_owned(), "skin_type".to_owned()],
                },
            ),
            StageDefinition::media_capture(
                "selfie",
                "Take a selfie",
                MediaRequirements::images(CountRange::exactly(1)),
            )
            .optional(),
            StageDefinition::new(
                "preferences",
                "Anything else?",
                StageKind::Custom { required_keys: vec!["newsletter".to_owned()] },
            ),
            StageDefinition::processing("analyze", "Building your routine"),
            StageDefinition::results("routine", "Your routine"),
        ],
    )
    .expect("onboarding flow is valid")
}

#[test]
fn onboarding_flow_runs_to_completion_with_skip_and_back() {
    let mut engine = FlowEngine::new(onboarding_flow());
    engine.start().expect("start");

    engine.set_data("goal", StageData::selection(["repair"]));
    engine.proceed().expect("goal -> profile");

    engine.set_data("profile", StageData::profile([("age", "34"), ("skin_type", " ")]));
    let rejected = engine.proceed().expect_err("blank field blocks");
    assert!(matches!(rejected, FlowTransitionError::ValidationFailed { .. }));

    engine.set_data("profile", StageData::profile([("age", "34"), ("skin_type", "dry")]));
    engine.proceed().expect("profile -> selfie");

    let skipped = engine.skip().expect("selfie is optional");
    assert_eq!(skipped.kind, TransitionKind::Skipped);
    assert_eq!(skipped.to.as_str(), "preferences");

    engine.go_back().expect("preferences -> selfie");
    engine.set_data(
        "selfie",
        StageData::media(vec![MediaItem::new(MediaKind::Image, "checkpoint_selfie_1.jpg")]),
    );
    engine.proceed().expect("selfie -> preferences");

    engine.set_data("preferences", StageData::Custom(json!({ "newsletter": false })));
    engine.proceed().expect("preferences -> analyze");

    engine.set_processing(true);
    engine.set_data("analyze", StageData::processing_finished());
    engine.set_processing(false);
    engine.proceed().expect("analyze -> routine");

    assert!(!engine.is_complete());
    let last = engine.proceed().expect("finish");
    assert_eq!(last.kind, TransitionKind::Completed);
    assert!(engine.is_complete());
    assert_eq!(engine.progress().completed, 6);
}

#[test]
fn snapshot_survives_json_and_resumes_mid_flow() {
    let mut engine = FlowEngine::new(onboarding_flow());
    engine.start().expect("start");
    engine.set_data("goal", StageData::selection(["hydrate"]));
    engine.proceed().expect("goal -> profile");

    let encoded = serde_json::to_string(&engine.snapshot()).expect("encode");
    let snapshot: FlowSnapshot = serde_json::from_str(&encoded).expect("decode");

    let mut resumed = FlowEngine::resume(onboarding_flow(), snapshot).expect("resume");
    assert_eq!(
        resumed.current_stage().map(|stage| stage.id.clone()),
        Some(StageId::from("profile"))
    );
    assert_eq!(resumed.go_back().map(|outcome| outcome.to), Ok(StageId::from("goal")));
    assert!(resumed.can_proceed());
}
