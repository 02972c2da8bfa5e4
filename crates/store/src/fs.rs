//! File helpers shared by the checkpoint and history stores.
//!
//! Records are replaced with write-temp, fsync, rename. A crash before the
//! rename leaves the previous file untouched plus a hidden `.{name}.{uuid}.tmp`
//! file, which `remove_stale_temp_files` clears on the next open.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::StoreError;

const TEMP_SUFFIX: &str = ".tmp";

pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let temp_path = write_temp(path, bytes).await?;
    if let Err(error) = commit_temp(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(error);
    }
    Ok(())
}

pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path.file_name().and_then(|name| name.to_str()).unwrap_or("record");
    path.with_file_name(format!(".{file_name}.{}{TEMP_SUFFIX}", Uuid::new_v4()))
}

pub(crate) async fn write_temp(path: &Path, bytes: &[u8]) -> Result<PathBuf, StoreError> {
    let temp_path = temp_path_for(path);
    let mut file =
        tokio::fs::File::create(&temp_path).await.map_err(StoreError::io(&temp_path))?;
    file.write_all(bytes).await.map_err(StoreError::io(&temp_path))?;
    file.sync_all().await.map_err(StoreError::io(&temp_path))?;
    Ok(temp_path)
}

pub(crate) async fn commit_temp(temp_path: &Path, path: &Path) -> Result<(), StoreError> {
    tokio::fs::rename(temp_path, path).await.map_err(StoreError::io(path))?;

    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if let Ok(dir) = tokio::fs::File::open(parent).await {
                let _ = dir.sync_all().await;
            }
        }
    }

    Ok(())
}

pub(crate) fn is_temp_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

pub(crate) async fn remove_stale_temp_files(dir: &Path) -> Result<usize, StoreError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(0),
        Err(error) => return Err(StoreError::io(dir)(error)),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await.map_err(StoreError::io(dir))? {
        let name = entry.file_name();
        if name.to_str().map(is_temp_file).unwrap_or(false) {
            let path = entry.path();
            remove_if_exists(&path).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Regular files directly inside `dir`. A missing directory lists as empty.
pub(crate) async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(StoreError::io(dir)(error)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(StoreError::io(dir))? {
        if entry.file_type().await.map(|kind| kind.is_file()).unwrap_or(false) {
            files.push(entry.path());
        }
    }
    Ok(files)
}

pub(crate) async fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => Err(StoreError::io(path)(error)),
    }
}

pub(crate) async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(StoreError::io(path)(error)),
    }
}

pub(crate) fn read_optional_sync(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(StoreError::io(path)(error)),
    }
}
