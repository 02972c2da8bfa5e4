use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use stagecraft_core::MediaKind;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{validate_name, StoreError};
use crate::fs::remove_if_exists;

/// A flat directory of media files owned by exactly one store.
///
/// Records reference files by bare file name only, so the directory can move
/// without rewriting them.
#[derive(Clone, Debug)]
pub struct MediaDirectory {
    root: PathBuf,
}

impl MediaDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) async fn ensure(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(StoreError::io(&self.root))
    }

    pub fn resolve(&self, file_name: &str) -> Result<PathBuf, StoreError> {
        validate_name(file_name).map(|name| self.root.join(name))
    }

    pub fn exists(&self, file_name: &str) -> bool {
        self.resolve(file_name).map(|path| path.is_file()).unwrap_or(false)
    }

    /// Writes a new file. Fails instead of overwriting when the name is taken.
    pub(crate) async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.resolve(file_name)?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(StoreError::io(&path))?;
        file.write_all(bytes).await.map_err(StoreError::io(&path))?;
        file.sync_all().await.map_err(StoreError::io(&path))?;
        Ok(path)
    }

    pub(crate) async fn read(&self, file_name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.resolve(file_name)?;
        crate::fs::read_optional(&path).await
    }

    pub(crate) async fn delete(&self, file_name: &str) -> Result<bool, StoreError> {
        let path = self.resolve(file_name)?;
        remove_if_exists(&path).await
    }

    /// Deletes every regular file in the directory.
    pub(crate) async fn purge(&self) -> Result<usize, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(StoreError::io(&self.root)(error)),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(StoreError::io(&self.root))? {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|kind| kind.is_file()).unwrap_or(false);
            if is_file && remove_if_exists(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// `{namespace}_{identifier}_{token}.{ext}`; the random token keeps
    /// concurrent saves from ever sharing a name.
    pub fn unique_file_name(namespace: &str, identifier: &str, kind: MediaKind) -> String {
        format!(
            "{}_{}_{}.{}",
            file_safe(namespace),
            file_safe(identifier),
            Uuid::new_v4().simple(),
            kind.extension()
        )
    }
}

fn file_safe(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '-' })
        .collect();
    if cleaned.is_empty() {
        "media".to_owned()
    } else {
        cleaned
    }
}
