#![allow(dead_code)]

//! Stage Store: persistent, keyed cache of completed stage outputs.
//!
//! One pretty-printed JSON document per stage under the cache root
//! (`<root>/<stage>.json`). The presence of that file is the resume signal.
//! Entries are only ever replaced wholesale, never edited in place.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::StoreError;

/// The persisted unit of a completed stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub stage_name: String,
    pub created_at: DateTime<Utc>,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct StageStore {
    root: PathBuf,
}

impl StageStore {
    /// Opens (and creates if needed) the cache root directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            stage: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, stage: &str) -> PathBuf {
        self.root.join(format!("{stage}.json"))
    }

    pub fn exists(&self, stage: &str) -> bool {
        self.path_for(stage).is_file()
    }

    /// Loads the payload of a cached stage.
    pub fn load(&self, stage: &str) -> Result<Value, StoreError> {
        Ok(self.load_entry(stage)?.payload)
    }

    pub fn load_entry(&self, stage: &str) -> Result<CacheEntry, StoreError> {
        let path = self.path_for(stage);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(stage.to_string()))
            }
            Err(source) => {
                return Err(StoreError::Io {
                    stage: stage.to_string(),
                    source,
                })
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| StoreError::Serde {
            stage: stage.to_string(),
            source,
        })
    }

    /// Replaces the cache entry for `stage` atomically.
    pub fn save(&self, stage: &str, payload: &Value) -> Result<CacheEntry, StoreError> {
        let entry = CacheEntry {
            stage_name: stage.to_string(),
            created_at: Utc::now(),
            payload: payload.clone(),
        };

        let bytes = serde_json::to_vec_pretty(&entry).map_err(|source| StoreError::Serde {
            stage: stage.to_string(),
            source,
        })?;

        let path = self.path_for(stage);
        write_atomic(&self.root, &path, &bytes).map_err(|source| StoreError::Io {
            stage: stage.to_string(),
            source,
        })?;

        debug!("Saved cache entry '{}' ({} bytes)", path.display(), bytes.len());
        Ok(entry)
    }

    /// Names of every JSON artifact under the cache root, sorted.
    pub fn entries(&self) -> Result<Vec<String>, StoreError> {
        let io_err = |source| StoreError::Io {
            stage: self.root.display().to_string(),
            source,
        };

        let mut names = Vec::new();
        for dir_entry in fs::read_dir(&self.root).map_err(io_err)? {
            let path = dir_entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Writes `bytes` to a temp file in `dir` and renames it over `path`, so a
/// reader never observes a half-written file.
pub(crate) fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
