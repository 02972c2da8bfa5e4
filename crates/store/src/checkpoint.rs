use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stagecraft_core::{AppConfig, MediaKind, StageId};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{validate_name, StoreError};
use crate::fs::{
    is_temp_file, list_files, read_optional, read_optional_sync, remove_if_exists,
    remove_stale_temp_files, write_atomic,
};
use crate::media::MediaDirectory;

pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CHECKPOINT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const RECORD_EXTENSION: &str = "json";

/// A resumable payload. One checkpoint slot exists per `FLOW_TYPE`.
pub trait Checkpoint: Serialize + DeserializeOwned + Send + Sync {
    const FLOW_TYPE: &'static str;

    /// Caller-defined usability check run on load, typically "do my media files
    /// still exist". A `false` result discards the checkpoint.
    fn is_valid(&self, media: &MediaDirectory) -> bool {
        let _ = media;
        true
    }

    /// Media files owned by this checkpoint; deleted along with it.
    fn media_files(&self) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedFlowState<T> {
    pub schema_version: u32,
    pub flow_type: String,
    pub current_stage_id: StageId,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub media_files: Vec<String>,
    pub payload: T,
}

impl<T> PersistedFlowState<T>
where
    T: Checkpoint,
{
    pub fn new(current_stage_id: impl Into<StageId>, payload: T) -> Self {
        Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            flow_type: T::FLOW_TYPE.to_owned(),
            current_stage_id: current_stage_id.into(),
            saved_at: Utc::now(),
            media_files: payload.media_files(),
            payload,
        }
    }
}

/// The fields of a record that can be read without decoding the payload.
#[derive(Debug, Deserialize)]
struct CheckpointEnvelope {
    schema_version: u32,
    flow_type: String,
    current_stage_id: StageId,
    saved_at: DateTime<Utc>,
    #[serde(default)]
    media_files: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SavedStateInfo {
    pub flow_type: String,
    pub current_stage_id: StageId,
    pub saved_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct CheckpointStoreConfig {
    pub directory: PathBuf,
    pub ttl: Duration,
}

impl CheckpointStoreConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into(), ttl: DEFAULT_CHECKPOINT_TTL }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(config.checkpoints_dir())
            .with_ttl(Duration::from_secs(config.checkpoints.ttl_secs))
    }
}

/// Checkpoint/resume storage, one JSON record per flow type plus a media
/// directory at `<directory>/media`.
///
/// Mutating operations are serialized through an internal queue lock. The
/// `has_saved_state`, `saved_state_info` and `media_file_exists` checks read
/// the disk directly and never mutate.
pub struct FlowCheckpointStore {
    config: CheckpointStoreConfig,
    media: MediaDirectory,
    queue: Mutex<()>,
}

impl FlowCheckpointStore {
    /// Creates the directories, removes temp files left by interrupted writes
    /// and clears every checkpoint that has already expired.
    pub async fn open(config: CheckpointStoreConfig) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&config.directory)
            .await
            .map_err(StoreError::io(&config.directory))?;
        let media = MediaDirectory::new(config.directory.join("media"));
        media.ensure().await?;

        let stale = remove_stale_temp_files(&config.directory).await?;
        if stale > 0 {
            info!(
                event_name = "checkpoint.stale_temp_removed",
                directory = %config.directory.display(),
                count = stale,
                "removed temp files from interrupted checkpoint writes"
            );
        }

        let store = Self { config, media, queue: Mutex::new(()) };
        store.sweep_expired().await;
        Ok(store)
    }

    pub fn config(&self) -> &CheckpointStoreConfig {
        &self.config
    }

    pub fn media(&self) -> &MediaDirectory {
        &self.media
    }

    /// Writes the record for `T::FLOW_TYPE`, replacing any previous one. Media
    /// owned by the replaced record and not carried over is deleted once the new
    /// record is committed. Failures are logged and reported as `false`; the
    /// live flow is unaffected.
    pub async fn save<T>(&self, state: &PersistedFlowState<T>) -> bool
    where
        T: Checkpoint,
    {
        let _queue = self.queue.lock().await;
        let replaced = self.owned_media(T::FLOW_TYPE).await;
        match self.write_record(state).await {
            Ok(()) => {
                let released = replaced
                    .into_iter()
                    .filter(|file_name| !state.media_files.contains(file_name))
                    .collect();
                self.delete_owned_media(released).await;
                debug!(
                    event_name = "checkpoint.saved",
                    flow_type = T::FLOW_TYPE,
                    stage = %state.current_stage_id,
                    "checkpoint saved"
                );
                true
            }
            Err(error) => {
                warn!(
                    event_name = "checkpoint.save_failed",
                    flow_type = T::FLOW_TYPE,
                    error = %error,
                    "checkpoint could not be saved"
                );
                false
            }
        }
    }

    async fn write_record<T>(&self, state: &PersistedFlowState<T>) -> Result<(), StoreError>
    where
        T: Checkpoint,
    {
        let path = self.record_path(T::FLOW_TYPE)?;
        let bytes = serde_json::to_vec_pretty(state).map_err(StoreError::Encode)?;
        write_atomic(&path, &bytes).await
    }

    /// Returns the checkpoint only when it decodes, has not expired and passes
    /// `Checkpoint::is_valid`. Any other record is deleted with its media.
    pub async fn load<T>(&self) -> Option<PersistedFlowState<T>>
    where
        T: Checkpoint,
    {
        let _queue = self.queue.lock().await;
        let path = self.record_path(T::FLOW_TYPE).ok()?;
        let bytes = match read_optional(&path).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(error) => {
                warn!(
                    event_name = "checkpoint.read_failed",
                    flow_type = T::FLOW_TYPE,
                    error = %error,
                    "checkpoint could not be read"
                );
                return None;
            }
        };

        let rejection = match decode_record::<T>(&path, &bytes) {
            Ok(state) if self.is_expired(state.saved_at) => "expired",
            Ok(state) if state.flow_type != T::FLOW_TYPE => "flow_type_mismatch",
            Ok(state) if !state.payload.is_valid(&self.media) => "invalid",
            Ok(state) => return Some(state),
            Err(error) => {
                warn!(
                    event_name = "checkpoint.decode_failed",
                    flow_type = T::FLOW_TYPE,
                    error = %error,
                    "checkpoint is unreadable"
                );
                "corrupt"
            }
        };

        info!(
            event_name = "checkpoint.discarded",
            flow_type = T::FLOW_TYPE,
            reason = rejection,
            "checkpoint discarded on load"
        );
        let owned = decode_envelope(&path, &bytes).map(|envelope| envelope.media_files);
        self.remove_record(&path, owned.unwrap_or_default()).await;
        None
    }

    pub fn has_saved_state(&self, flow_type: &str) -> bool {
        self.saved_state_info(flow_type).is_some()
    }

    /// Reads only the record envelope. Expired or unreadable records report `None`.
    pub fn saved_state_info(&self, flow_type: &str) -> Option<SavedStateInfo> {
        let path = self.record_path(flow_type).ok()?;
        let bytes = read_optional_sync(&path).ok()??;
        let envelope = decode_envelope(&path, &bytes).ok()?;
        if self.is_expired(envelope.saved_at) {
            return None;
        }
        Some(SavedStateInfo {
            flow_type: envelope.flow_type,
            current_stage_id: envelope.current_stage_id,
            saved_at: envelope.saved_at,
        })
    }

    /// Flow types with a live checkpoint, sorted.
    pub fn saved_flow_types(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.config.directory) else {
            return Vec::new();
        };

        let mut flow_types: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| record_flow_type(&entry.path()))
            .filter(|flow_type| self.has_saved_state(flow_type))
            .collect();
        flow_types.sort();
        flow_types
    }

    /// Deletes the checkpoint for `flow_type` and the media files it owns.
    pub async fn clear(&self, flow_type: &str) -> bool {
        let _queue = self.queue.lock().await;
        let Ok(path) = self.record_path(flow_type) else {
            return false;
        };
        let owned = self.owned_media(flow_type).await;
        self.remove_record(&path, owned).await
    }

    /// Deletes every checkpoint record and purges the checkpoint media directory.
    pub async fn clear_all(&self) -> usize {
        let _queue = self.queue.lock().await;
        let mut removed = 0;

        match list_files(&self.config.directory).await {
            Ok(files) => {
                for path in files.into_iter().filter(|path| is_record_file(path)) {
                    match remove_if_exists(&path).await {
                        Ok(true) => removed += 1,
                        Ok(false) => {}
                        Err(error) => warn!(
                            event_name = "checkpoint.clear_failed",
                            error = %error,
                            "checkpoint record could not be removed"
                        ),
                    }
                }
            }
            Err(error) => warn!(
                event_name = "checkpoint.clear_failed",
                error = %error,
                "checkpoint directory could not be listed"
            ),
        }

        if let Err(error) = self.media.purge().await {
            warn!(
                event_name = "checkpoint.media_purge_failed",
                error = %error,
                "checkpoint media directory could not be purged"
            );
        }

        info!(event_name = "checkpoint.cleared_all", count = removed, "all checkpoints cleared");
        removed
    }

    pub async fn save_image(
        &self,
        bytes: &[u8],
        identifier: &str,
        flow_type: &str,
    ) -> Option<String> {
        self.save_media(MediaKind::Image, bytes, identifier, flow_type).await
    }

    pub async fn save_video(
        &self,
        bytes: &[u8],
        identifier: &str,
        flow_type: &str,
    ) -> Option<String> {
        self.save_media(MediaKind::Video, bytes, identifier, flow_type).await
    }

    /// Stores `bytes` under a fresh unique name and returns that name.
    async fn save_media(
        &self,
        kind: MediaKind,
        bytes: &[u8],
        identifier: &str,
        flow_type: &str,
    ) -> Option<String> {
        let _queue = self.queue.lock().await;
        let file_name = MediaDirectory::unique_file_name(flow_type, identifier, kind);
        match self.media.write(&file_name, bytes).await {
            Ok(_) => Some(file_name),
            Err(error) => {
                warn!(
                    event_name = "checkpoint.media_save_failed",
                    flow_type,
                    kind = kind.as_str(),
                    error = %error,
                    "checkpoint media could not be saved"
                );
                None
            }
        }
    }

    pub async fn load_media(&self, file_name: &str) -> Option<Vec<u8>> {
        self.media.read(file_name).await.ok().flatten()
    }

    /// Absolute location of an existing media file.
    pub fn media_path(&self, file_name: &str) -> Option<PathBuf> {
        self.media.resolve(file_name).ok().filter(|path| path.is_file())
    }

    pub fn media_file_exists(&self, file_name: &str) -> bool {
        self.media.exists(file_name)
    }

    pub async fn delete_media_file(&self, file_name: &str) -> bool {
        let _queue = self.queue.lock().await;
        match self.media.delete(file_name).await {
            Ok(removed) => removed,
            Err(error) => {
                warn!(
                    event_name = "checkpoint.media_delete_failed",
                    file_name,
                    error = %error,
                    "checkpoint media could not be deleted"
                );
                false
            }
        }
    }

    async fn sweep_expired(&self) {
        let _queue = self.queue.lock().await;
        let files = match list_files(&self.config.directory).await {
            Ok(files) => files,
            Err(error) => {
                warn!(
                    event_name = "checkpoint.sweep_failed",
                    error = %error,
                    "checkpoint directory could not be listed"
                );
                return;
            }
        };

        for path in files.into_iter().filter(|path| is_record_file(path)) {
            let Ok(Some(bytes)) = read_optional(&path).await else {
                continue;
            };
            let Ok(envelope) = decode_envelope(&path, &bytes) else {
                continue;
            };
            if self.is_expired(envelope.saved_at) {
                info!(
                    event_name = "checkpoint.expired",
                    flow_type = %envelope.flow_type,
                    saved_at = %envelope.saved_at,
                    "expired checkpoint removed at open"
                );
                self.remove_record(&path, envelope.media_files).await;
            }
        }
    }

    async fn remove_record(&self, path: &Path, media_files: Vec<String>) -> bool {
        let removed = match remove_if_exists(path).await {
            Ok(removed) => removed,
            Err(error) => {
                warn!(
                    event_name = "checkpoint.remove_failed",
                    error = %error,
                    "checkpoint record could not be removed"
                );
                false
            }
        };

        self.delete_owned_media(media_files).await;
        removed
    }

    /// Media listed by the stored record for `flow_type`, if it still decodes.
    async fn owned_media(&self, flow_type: &str) -> Vec<String> {
        let Ok(path) = self.record_path(flow_type) else {
            return Vec::new();
        };
        match read_optional(&path).await {
            Ok(Some(bytes)) => decode_envelope(&path, &bytes)
                .map(|envelope| envelope.media_files)
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    async fn delete_owned_media(&self, media_files: Vec<String>) {
        for file_name in media_files {
            if let Err(error) = self.media.delete(&file_name).await {
                warn!(
                    event_name = "checkpoint.media_delete_failed",
                    file_name = %file_name,
                    error = %error,
                    "owned checkpoint media could not be deleted"
                );
            }
        }
    }

    fn record_path(&self, flow_type: &str) -> Result<PathBuf, StoreError> {
        let flow_type = validate_name(flow_type)?;
        Ok(self.config.directory.join(format!("{flow_type}.{RECORD_EXTENSION}")))
    }

    fn is_expired(&self, saved_at: DateTime<Utc>) -> bool {
        match (Utc::now() - saved_at).to_std() {
            Ok(age) => age > self.config.ttl,
            Err(_) => false,
        }
    }
}

fn record_flow_type(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    flow_type_of(path)
}

fn is_record_file(path: &Path) -> bool {
    flow_type_of(path).is_some()
}

/// Flow type encoded in a record file name, ignoring temp files.
fn flow_type_of(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if is_temp_file(name) {
        return None;
    }
    let flow_type = name.strip_suffix(RECORD_EXTENSION)?.strip_suffix('.')?;
    validate_name(flow_type).ok().map(str::to_owned)
}

fn check_schema(path: &Path, found: u32) -> Result<(), StoreError> {
    if found > CHECKPOINT_SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchema {
            path: path.to_path_buf(),
            found,
            supported: CHECKPOINT_SCHEMA_VERSION,
        });
    }
    Ok(())
}

fn decode_envelope(path: &Path, bytes: &[u8]) -> Result<CheckpointEnvelope, StoreError> {
    let envelope: CheckpointEnvelope = serde_json::from_slice(bytes)
        .map_err(|source| StoreError::Decode { path: path.to_path_buf(), source })?;
    check_schema(path, envelope.schema_version)?;
    Ok(envelope)
}

fn decode_record<T>(path: &Path, bytes: &[u8]) -> Result<PersistedFlowState<T>, StoreError>
where
    T: Checkpoint,
{
    let state: PersistedFlowState<T> = serde_json::from_slice(bytes)
        .map_err(|source| StoreError::Decode { path: path.to_path_buf(), source })?;
    check_schema(path, state.schema_version)?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::record_flow_type;

    #[test]
    fn record_names_map_to_flow_types() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        for name in ["scan.json", ".scan.json.1234.tmp", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"{}").expect("write");
        }

        assert_eq!(record_flow_type(&dir.path().join("scan.json")), Some("scan".to_owned()));
        assert_eq!(record_flow_type(&dir.path().join(".scan.json.1234.tmp")), None);
        assert_eq!(record_flow_type(&dir.path().join("notes.txt")), None);
        assert_eq!(record_flow_type(Path::new("/does/not/exist.json")), None);
    }
}
