//! Content-addressed audio storage.
//!
//! Imported audio is copied into the audio directory under
//! `<sha256[0:12]>.<ext>`; the file name is the opaque [`AudioRef`] stored on
//! the entry. Deleting an entry removes its file, invalidating the handle.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::domain::AudioRef;

/// Errors that can occur with the audio store
#[derive(Debug, Error)]
pub enum AudioStoreError {
    #[error("Audio file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid audio handle: {0}")]
    InvalidRef(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Directory of imported audio files
#[derive(Debug, Clone)]
pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy an audio file into the store and return its handle.
    ///
    /// Importing identical content twice yields the same handle.
    pub async fn import(&self, source: &Path) -> Result<AudioRef, AudioStoreError> {
        if !source.is_file() {
            return Err(AudioStoreError::NotFound(source.to_path_buf()));
        }

        let hash = compute_file_hash(source).await?;
        let file_name = match source.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", hash, ext.to_lowercase()),
            None => hash,
        };

        fs::create_dir_all(&self.dir).await?;
        let target = self.dir.join(&file_name);
        if target.exists() {
            debug!(audio = %file_name, "Audio already imported");
        } else {
            fs::copy(source, &target).await?;
            info!(audio = %file_name, source = %source.display(), "Imported audio");
        }

        Ok(AudioRef::new(file_name))
    }

    /// Path of the file behind a handle
    pub fn resolve(&self, audio_ref: &AudioRef) -> Result<PathBuf, AudioStoreError> {
        let name = audio_ref.as_str();
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(AudioStoreError::InvalidRef(name.to_string()));
        }
        Ok(self.dir.join(name))
    }

    /// Delete the file behind a handle; missing files are not an error
    pub async fn remove(&self, audio_ref: &AudioRef) -> Result<bool, AudioStoreError> {
        let path = self.resolve(audio_ref)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Compute SHA256 hash of file content (first 12 hex chars)
pub async fn compute_file_hash(path: &Path) -> Result<String, std::io::Error> {
    let content = fs::read(path).await?;
    let digest = Sha256::digest(&content);
    Ok(hex::encode(digest)[..12].to_string())
}
