use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stagecraft_core::{AppConfig, MediaKind};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{validate_name, StoreError};
use crate::fs::{read_optional, remove_stale_temp_files, write_atomic};
use crate::media::MediaDirectory;

pub const HISTORY_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_MAX_RESULTS: usize = 50;

const INDEX_FILE: &str = "index.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMedia {
    pub kind: MediaKind,
    pub file_name: String,
    #[serde(default)]
    pub thumbnail_file_name: Option<String>,
}

impl StoredMedia {
    fn file_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.file_name.as_str()).chain(self.thumbnail_file_name.as_deref())
    }
}

/// A completed outcome. Never mutated after `save` returns it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredResult<R> {
    pub schema_version: u32,
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub result: R,
    #[serde(default)]
    pub media: Vec<StoredMedia>,
}

impl<R> StoredResult<R> {
    pub fn media_file_names(&self) -> impl Iterator<Item = &str> {
        self.media.iter().flat_map(StoredMedia::file_names)
    }
}

/// Raw media handed to `ResultsHistoryStore::save`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaBlob {
    pub kind: MediaKind,
    pub full: Vec<u8>,
    pub thumbnail: Option<Vec<u8>>,
}

impl MediaBlob {
    pub fn image(full: impl Into<Vec<u8>>) -> Self {
        Self { kind: MediaKind::Image, full: full.into(), thumbnail: None }
    }

    pub fn video(full: impl Into<Vec<u8>>) -> Self {
        Self { kind: MediaKind::Video, full: full.into(), thumbnail: None }
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<Vec<u8>>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct HistoryStoreConfig {
    pub directory: PathBuf,
    pub category: String,
    pub max_results: usize,
}

impl HistoryStoreConfig {
    pub fn new(directory: impl Into<PathBuf>, category: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            category: category.into(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn from_app_config(config: &AppConfig, category: impl Into<String>) -> Self {
        Self::new(config.history_dir(), category).with_max_results(config.history.max_results)
    }
}

#[derive(Serialize)]
struct IndexRef<'a, R> {
    schema_version: u32,
    results: &'a [StoredResult<R>],
}

#[derive(Deserialize)]
struct Index<R> {
    schema_version: u32,
    results: Vec<StoredResult<R>>,
}

/// Bounded, newest-first history of completed results for one category,
/// stored at `<directory>/<category>/index.json` with media beside it.
///
/// The entry list lock doubles as the store's serial queue: every mutation
/// holds it across the disk writes it performs.
pub struct ResultsHistoryStore<R> {
    config: HistoryStoreConfig,
    index_path: PathBuf,
    media: MediaDirectory,
    entries: Mutex<Vec<StoredResult<R>>>,
}

impl<R> ResultsHistoryStore<R>
where
    R: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    pub async fn open(config: HistoryStoreConfig) -> Result<Self, StoreError> {
        let category_dir = config.directory.join(validate_name(&config.category)?);
        tokio::fs::create_dir_all(&category_dir).await.map_err(StoreError::io(&category_dir))?;
        let media = MediaDirectory::new(category_dir.join("media"));
        media.ensure().await?;

        let stale = remove_stale_temp_files(&category_dir).await?;
        if stale > 0 {
            info!(
                event_name = "history.stale_temp_removed",
                category = %config.category,
                count = stale,
                "removed temp files from interrupted index writes"
            );
        }

        let index_path = category_dir.join(INDEX_FILE);
        let entries = load_index(&index_path, &config.category).await;

        Ok(Self { config, index_path, media, entries: Mutex::new(entries) })
    }

    pub fn config(&self) -> &HistoryStoreConfig {
        &self.config
    }

    pub fn media(&self) -> &MediaDirectory {
        &self.media
    }

    /// Writes the media, prepends the new entry, evicts past the cap and
    /// persists. Returns `None` and leaves the history unchanged on any failure.
    pub async fn save(&self, result: R, blobs: Vec<MediaBlob>) -> Option<StoredResult<R>> {
        let mut entries = self.entries.lock().await;
        let id = Uuid::new_v4();

        let mut written = Vec::new();
        let mut media = Vec::with_capacity(blobs.len());
        for (index, blob) in blobs.into_iter().enumerate() {
            match self.write_blob(id, index, &blob, &mut written).await {
                Ok(stored) => media.push(stored),
                Err(error) => {
                    warn!(
                        event_name = "history.media_write_failed",
                        category = %self.config.category,
                        error = %error,
                        "result media could not be written; save rolled back"
                    );
                    self.delete_files(written.iter().map(String::as_str)).await;
                    return None;
                }
            }
        }

        let entry = StoredResult {
            schema_version: HISTORY_SCHEMA_VERSION,
            id,
            created_at: Utc::now(),
            result,
            media,
        };

        let mut next = Vec::with_capacity(entries.len() + 1);
        next.push(entry.clone());
        next.extend(entries.iter().cloned());
        let evicted = if next.len() > self.config.max_results {
            next.split_off(self.config.max_results)
        } else {
            Vec::new()
        };

        if let Err(error) = self.persist(&next).await {
            warn!(
                event_name = "history.persist_failed",
                category = %self.config.category,
                error = %error,
                "history index could not be written; save rolled back"
            );
            self.delete_files(written.iter().map(String::as_str)).await;
            return None;
        }
        *entries = next;

        for old in &evicted {
            self.delete_files(old.media_file_names()).await;
            info!(
                event_name = "history.result_evicted",
                category = %self.config.category,
                id = %old.id,
                "oldest result evicted"
            );
        }

        info!(
            event_name = "history.result_saved",
            category = %self.config.category,
            id = %entry.id,
            media = entry.media.len(),
            "result saved"
        );
        Some(entry)
    }

    /// Removes the entry from the index, persists, then deletes its media.
    pub async fn delete(&self, id: Uuid) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(position) = entries.iter().position(|entry| entry.id == id) else {
            return false;
        };

        let mut next = entries.clone();
        let removed = next.remove(position);
        if let Err(error) = self.persist(&next).await {
            warn!(
                event_name = "history.persist_failed",
                category = %self.config.category,
                error = %error,
                "history index could not be written; delete skipped"
            );
            return false;
        }
        *entries = next;

        self.delete_files(removed.media_file_names()).await;
        info!(
            event_name = "history.result_deleted",
            category = %self.config.category,
            id = %id,
            "result deleted"
        );
        true
    }

    pub async fn clear_all(&self) -> bool {
        let mut entries = self.entries.lock().await;
        if let Err(error) = self.persist(&[]).await {
            warn!(
                event_name = "history.persist_failed",
                category = %self.config.category,
                error = %error,
                "history index could not be written; clear skipped"
            );
            return false;
        }
        let count = entries.len();
        entries.clear();

        if let Err(error) = self.media.purge().await {
            warn!(
                event_name = "history.media_purge_failed",
                category = %self.config.category,
                error = %error,
                "history media directory could not be purged"
            );
        }
        info!(
            event_name = "history.cleared",
            category = %self.config.category,
            count,
            "history cleared"
        );
        true
    }

    /// Newest first.
    pub async fn results(&self) -> Vec<StoredResult<R>> {
        self.entries.lock().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<StoredResult<R>> {
        self.entries.lock().await.iter().find(|entry| entry.id == id).cloned()
    }

    pub async fn latest(&self) -> Option<StoredResult<R>> {
        self.entries.lock().await.first().cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Full-size media for `entry.media[index]`; `None` if the file is gone.
    pub async fn load_media(&self, entry: &StoredResult<R>, index: usize) -> Option<Vec<u8>> {
        let stored = entry.media.get(index)?;
        self.media.read(&stored.file_name).await.ok().flatten()
    }

    pub async fn load_thumbnail(&self, entry: &StoredResult<R>, index: usize) -> Option<Vec<u8>> {
        let thumbnail = entry.media.get(index)?.thumbnail_file_name.as_deref()?;
        self.media.read(thumbnail).await.ok().flatten()
    }

    pub fn media_file_exists(&self, file_name: &str) -> bool {
        self.media.exists(file_name)
    }

    async fn write_blob(
        &self,
        id: Uuid,
        index: usize,
        blob: &MediaBlob,
        written: &mut Vec<String>,
    ) -> Result<StoredMedia, StoreError> {
        let stem = format!("{}_{}_{index}", self.config.category, id.simple());
        let file_name = format!("{stem}.{}", blob.kind.extension());
        self.media.write(&file_name, &blob.full).await?;
        written.push(file_name.clone());

        let thumbnail_file_name = match &blob.thumbnail {
            Some(bytes) => {
                let name = format!("{stem}_thumb.{}", MediaKind::Image.extension());
                self.media.write(&name, bytes).await?;
                written.push(name.clone());
                Some(name)
            }
            None => None,
        };

        Ok(StoredMedia { kind: blob.kind, file_name, thumbnail_file_name })
    }

    async fn persist(&self, entries: &[StoredResult<R>]) -> Result<(), StoreError> {
        let index = IndexRef { schema_version: HISTORY_SCHEMA_VERSION, results: entries };
        let bytes = serde_json::to_vec_pretty(&index).map_err(StoreError::Encode)?;
        write_atomic(&self.index_path, &bytes).await
    }

    async fn delete_files<'a>(&self, names: impl Iterator<Item = &'a str>) {
        for name in names {
            if let Err(error) = self.media.delete(name).await {
                warn!(
                    event_name = "history.media_delete_failed",
                    category = %self.config.category,
                    file_name = name,
                    error = %error,
                    "result media could not be deleted"
                );
            }
        }
    }
}

/// An unreadable index is dropped and the history starts empty.
async fn load_index<R>(path: &Path, category: &str) -> Vec<StoredResult<R>>
where
    R: DeserializeOwned,
{
    let bytes = match read_optional(path).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Vec::new(),
        Err(error) => {
            warn!(
                event_name = "history.index_unreadable",
                category,
                error = %error,
                "history index could not be read; starting empty"
            );
            return Vec::new();
        }
    };

    match serde_json::from_slice::<Index<R>>(&bytes) {
        Ok(index) if index.schema_version > HISTORY_SCHEMA_VERSION => {
            warn!(
                event_name = "history.index_unsupported",
                category,
                found = index.schema_version,
                supported = HISTORY_SCHEMA_VERSION,
                "history index was written by a newer version; starting empty"
            );
            Vec::new()
        }
        Ok(index) => index.results,
        Err(error) => {
            warn!(
                event_name = "history.index_corrupt",
                category,
                error = %error,
                "history index could not be decoded; starting empty"
            );
            Vec::new()
        }
    }
}
