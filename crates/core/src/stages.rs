use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StageId(pub String);

impl StageId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Video => "mov",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// Inclusive bounds on how many media items of one kind a capture stage accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    pub min_items: usize,
    pub max_items: usize,
}

impl CountRange {
    pub const NONE: Self = Self { min_items: 0, max_items: 0 };

    pub fn new(min_items: usize, max_items: usize) -> Self {
        Self { min_items, max_items: max_items.max(min_items) }
    }

    pub fn exactly(count: usize) -> Self {
        Self { min_items: count, max_items: count }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRequirements {
    pub images: CountRange,
    pub videos: CountRange,
}

impl MediaRequirements {
    pub fn images(range: CountRange) -> Self {
        Self { images: range, videos: CountRange::NONE }
    }

    pub fn videos(range: CountRange) -> Self {
        Self { images: CountRange::NONE, videos: range }
    }

    pub fn range_for(&self, kind: MediaKind) -> CountRange {
        match kind {
            MediaKind::Image => self.images,
            MediaKind::Video => self.videos,
        }
    }
}

/// A captured media item, referenced by its file name relative to the managed media directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub file_name: String,
}

impl MediaItem {
    pub fn new(kind: MediaKind, file_name: impl Into<String>) -> Self {
        Self { kind, file_name: file_name.into() }
    }
}

/// Payload shapes a stage can hold. One variant per kind of input the UI collects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StageData {
    Selection { selected: Vec<String> },
    Media { items: Vec<MediaItem> },
    Profile { fields: BTreeMap<String, String> },
    Processing { started_at: Option<DateTime<Utc>>, finished: bool },
    Results { summary: Value },
    Custom(Value),
}

impl StageData {
    pub fn selection<I, S>(selected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Selection { selected: selected.into_iter().map(Into::into).collect() }
    }

    pub fn media(items: Vec<MediaItem>) -> Self {
        Self::Media { items }
    }

    pub fn profile<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Profile { fields: fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    pub fn processing_finished() -> Self {
        Self::Processing { started_at: None, finished: true }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Selection { .. } => "selection",
            Self::Media { .. } => "media",
            Self::Profile { .. } => "profile",
            Self::Processing { .. } => "processing",
            Self::Results { .. } => "results",
            Self::Custom(_) => "custom",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ValidationIssue {
    MissingData,
    UnexpectedData { expected: String, found: String },
    EmptySelection,
    UnknownOption { option: String },
    TooManySelections { max: usize, actual: usize },
    TooFewItems { kind: MediaKind, min: usize, actual: usize },
    TooManyItems { kind: MediaKind, max: usize, actual: usize },
    MissingField { field: String },
    BlankField { field: String },
    NotAnObject,
    MissingKey { key: String },
    ProcessingIncomplete,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageValidation {
    Valid,
    Invalid { reasons: Vec<ValidationIssue> },
}

impl StageValidation {
    pub fn from_reasons(reasons: Vec<ValidationIssue>) -> Self {
        if reasons.is_empty() {
            Self::Valid
        } else {
            Self::Invalid { reasons }
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn reasons(&self) -> &[ValidationIssue] {
        match self {
            Self::Valid => &[],
            Self::Invalid { reasons } => reasons,
        }
    }

    pub fn into_reasons(self) -> Vec<ValidationIssue> {
        match self {
            Self::Valid => Vec::new(),
            Self::Invalid { reasons } => reasons,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageKind {
    /// Empty `options` accepts any non-empty id.
    Selection { options: Vec<String>, allows_multiple: bool },
    MediaCapture(MediaRequirements),
    Profile { required_fields: Vec<String> },
    Processing,
    Results,
    /// Data-driven validator over a JSON object.
    Custom { required_keys: Vec<String> },
}

impl StageKind {
    pub fn validate(&self, data: Option<&StageData>) -> StageValidation {
        let reasons = match self {
            Self::Selection { options, allows_multiple } => match data {
                Some(StageData::Selection { selected }) => {
                    validate_selection(options, *allows_multiple, selected)
                }
                other => missing_or_unexpected("selection", other),
            },
            Self::MediaCapture(requirements) => match data {
                Some(StageData::Media { items }) => validate_media(requirements, items),
                None if requirements.images.min_items == 0
                    && requirements.videos.min_items == 0 =>
                {
                    Vec::new()
                }
                other => missing_or_unexpected("media", other),
            },
            Self::Profile { required_fields } => match data {
                Some(StageData::Profile { fields }) => validate_profile(required_fields, fields),
                other => missing_or_unexpected("profile", other),
            },
            Self::Processing => match data {
                Some(StageData::Processing { finished: true, .. }) => Vec::new(),
                Some(StageData::Processing { finished: false, .. }) => {
                    vec![ValidationIssue::ProcessingIncomplete]
                }
                other => missing_or_unexpected("processing", other),
            },
            Self::Results => Vec::new(),
            Self::Custom { required_keys } => match data {
                Some(StageData::Custom(value)) => validate_custom(required_keys, value),
                other => missing_or_unexpected("custom", other),
            },
        };

        StageValidation::from_reasons(reasons)
    }
}

fn missing_or_unexpected(expected: &str, data: Option<&StageData>) -> Vec<ValidationIssue> {
    match data {
        None => vec![ValidationIssue::MissingData],
        Some(found) => vec![ValidationIssue::UnexpectedData {
            expected: expected.to_owned(),
            found: found.kind_name().to_owned(),
        }],
    }
}

fn validate_selection(
    options: &[String],
    allows_multiple: bool,
    selected: &[String],
) -> Vec<ValidationIssue> {
    let selected: Vec<&String> = selected.iter().filter(|id| !id.trim().is_empty()).collect();
    if selected.is_empty() {
        return vec![ValidationIssue::EmptySelection];
    }

    let mut reasons = Vec::new();
    if !allows_multiple && selected.len() > 1 {
        reasons.push(ValidationIssue::TooManySelections { max: 1, actual: selected.len() });
    }
    if !options.is_empty() {
        reasons.extend(
            selected
                .into_iter()
                .filter(|id| !options.contains(*id))
                .map(|id| ValidationIssue::UnknownOption { option: id.clone() }),
        );
    }
    reasons
}

fn validate_media(requirements: &MediaRequirements, items: &[MediaItem]) -> Vec<ValidationIssue> {
    let mut reasons = Vec::new();
    for kind in [MediaKind::Image, MediaKind::Video] {
        let range = requirements.range_for(kind);
        let actual = items.iter().filter(|item| item.kind == kind).count();
        if actual < range.min_items {
            reasons.push(ValidationIssue::TooFewItems { kind, min: range.min_items, actual });
        }
        if actual > range.max_items {
            reasons.push(ValidationIssue::TooManyItems { kind, max: range.max_items, actual });
        }
    }
    reasons
}

fn validate_profile(
    required_fields: &[String],
    fields: &BTreeMap<String, String>,
) -> Vec<ValidationIssue> {
    required_fields
        .iter()
        .filter_map(|field| match fields.get(field) {
            None => Some(ValidationIssue::MissingField { field: field.clone() }),
            Some(value) if value.trim().is_empty() => {
                Some(ValidationIssue::BlankField { field: field.clone() })
            }
            Some(_) => None,
        })
        .collect()
}

fn validate_custom(required_keys: &[String], value: &Value) -> Vec<ValidationIssue> {
    let Some(object) = value.as_object() else {
        return vec![ValidationIssue::NotAnObject];
    };

    required_keys
        .iter()
        .filter(|key| object.get(key.as_str()).map(Value::is_null).unwrap_or(true))
        .map(|key| ValidationIssue::MissingKey { key: key.clone() })
        .collect()
}

/// One step of a flow. Created once when the flow is assembled and never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub id: StageId,
    pub title: String,
    pub subtitle: Option<String>,
    pub kind: StageKind,
    pub is_required: bool,
    pub can_skip: bool,
    pub can_go_back: bool,
    pub shows_header: bool,
}

impl StageDefinition {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: StageKind) -> Self {
        Self {
            id: StageId::new(id),
            title: title.into(),
            subtitle: None,
            kind,
            is_required: true,
            can_skip: false,
            can_go_back: true,
            shows_header: true,
        }
    }

    pub fn selection(id: impl Into<String>, title: impl Into<String>, options: &[&str]) -> Self {
        Self::new(
            id,
            title,
            StageKind::Selection {
                options: options.iter().map(|option| (*option).to_owned()).collect(),
                allows_multiple: false,
            },
        )
    }

    pub fn media_capture(
        id: impl Into<String>,
        title: impl Into<String>,
        requirements: MediaRequirements,
    ) -> Self {
        Self::new(id, title, StageKind::MediaCapture(requirements))
    }

    pub fn processing(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(id, title, StageKind::Processing).without_back()
    }

    pub fn results(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(id, title, StageKind::Results)
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    /// Marks the stage as not required and skippable.
    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self.can_skip = true;
        self
    }

    pub fn skippable(mut self) -> Self {
        self.can_skip = true;
        self
    }

    pub fn without_back(mut self) -> Self {
        self.can_go_back = false;
        self
    }

    pub fn without_header(mut self) -> Self {
        self.shows_header = false;
        self
    }

    pub fn validate(&self, data: Option<&StageData>) -> StageValidation {
        self.kind.validate(data)
    }
}
