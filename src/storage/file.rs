// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! File-backed [`Storage`] implementation.
//!
//! Layout: `<base>/<kind-plural-lower>/<uid>.json` for live resources and
//! `<base>/<kind-plural-lower>/versions/<uid>/<versionId>.json` for
//! immutable spec snapshots. Writes are atomic (temp file + rename within
//! the same directory); a single process-global `RwLock` serializes access,
//! mirroring the teacher's single-writer-lock convention.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::sync::RwLock;

use super::Storage;
use crate::constants::SNAPSHOTS_DIR_NAME;
use crate::errors::FabricaError;

/// A [`Storage`] backend that persists resources as JSON files on disk.
pub struct FileStorage {
    base_dir: PathBuf,
    lock: RwLock<()>,
    closed: std::sync::atomic::AtomicBool,
}

impl FileStorage {
    /// Create a backend rooted at `base_dir`. The directory is created
    /// lazily on first write.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            lock: RwLock::new(()),
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn kind_dir(&self, kind: &str) -> PathBuf {
        self.base_dir.join(plural_lower(kind))
    }

    fn resource_path(&self, kind: &str, uid: &str) -> PathBuf {
        self.kind_dir(kind).join(format!("{uid}.json"))
    }

    fn snapshots_dir(&self, kind: &str, uid: &str) -> PathBuf {
        self.kind_dir(kind).join(SNAPSHOTS_DIR_NAME).join(uid)
    }

    fn snapshot_path(&self, kind: &str, uid: &str, version_id: &str) -> PathBuf {
        self.snapshots_dir(kind, uid).join(format!("{version_id}.json"))
    }

    fn check_open(&self) -> Result<(), FabricaError> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(FabricaError::BackendUnavailable("storage is closed".into()));
        }
        Ok(())
    }

    async fn atomic_write(path: &Path, value: &Value) -> Result<(), FabricaError> {
        let dir = path
            .parent()
            .ok_or_else(|| FabricaError::BackendUnavailable("invalid storage path".into()))?;
        fs::create_dir_all(dir)
            .await
            .map_err(|e| FabricaError::BackendUnavailable(e.to_string()))?;

        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| FabricaError::InvalidData(e.to_string()))?;

        let tmp_name = format!(
            ".{}.tmp-{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("resource"),
            rand::random::<u32>()
        );
        let tmp_path = dir.join(tmp_name);

        fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| FabricaError::BackendUnavailable(e.to_string()))?;
        fs::rename(&tmp_path, path)
            .await
            .map_err(|e| FabricaError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn read_json(path: &Path) -> Result<Value, std::io::Error> {
        let bytes = fs::read(path).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Lowercase, pluralized directory name for a kind (`Device` -> `devices`).
#[must_use]
pub fn plural_lower(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') {
        lower
    } else {
        format!("{lower}s")
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn load_all(&self, kind: &str) -> Result<Vec<Value>, FabricaError> {
        self.check_open()?;
        let _guard = self.lock.read().await;
        let dir = self.kind_dir(kind);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FabricaError::BackendUnavailable(e.to_string())),
        };

        let mut results = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FabricaError::BackendUnavailable(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_json(&path).await {
                Ok(value) => results.push(value),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unparsable resource file");
                }
            }
        }
        Ok(results)
    }

    async fn load(&self, kind: &str, uid: &str) -> Result<Value, FabricaError> {
        self.check_open()?;
        let _guard = self.lock.read().await;
        let path = self.resource_path(kind, uid);
        match Self::read_json(&path).await {
            Ok(value) => Ok(value),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FabricaError::NotFound {
                kind: kind.to_string(),
                uid: uid.to_string(),
            }),
            Err(e) => Err(FabricaError::BackendUnavailable(e.to_string())),
        }
    }

    async fn save(&self, kind: &str, uid: &str, value: Value) -> Result<(), FabricaError> {
        self.check_open()?;
        let _guard = self.lock.write().await;
        let path = self.resource_path(kind, uid);
        Self::atomic_write(&path, &value).await
    }

    async fn delete(&self, kind: &str, uid: &str) -> Result<(), FabricaError> {
        self.check_open()?;
        let _guard = self.lock.write().await;
        let path = self.resource_path(kind, uid);
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FabricaError::NotFound {
                    kind: kind.to_string(),
                    uid: uid.to_string(),
                }
            } else {
                FabricaError::BackendUnavailable(e.to_string())
            }
        })
    }

    async fn exists(&self, kind: &str, uid: &str) -> Result<bool, FabricaError> {
        self.check_open()?;
        let _guard = self.lock.read().await;
        Ok(fs::metadata(self.resource_path(kind, uid)).await.is_ok())
    }

    async fn list(&self, kind: &str) -> Result<Vec<String>, FabricaError> {
        self.check_open()?;
        let _guard = self.lock.read().await;
        let dir = self.kind_dir(kind);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FabricaError::BackendUnavailable(e.to_string())),
        };

        let mut uids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FabricaError::BackendUnavailable(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    uids.push(stem.to_string());
                }
            }
        }
        Ok(uids)
    }

    async fn save_snapshot(&self, kind: &str, uid: &str, snapshot: Value) -> Result<String, FabricaError> {
        self.check_open()?;
        let _guard = self.lock.write().await;
        let version_id = format!("{:x}", chrono::Utc::now().timestamp_micros());
        let path = self.snapshot_path(kind, uid, &version_id);
        Self::atomic_write(&path, &snapshot).await?;
        Ok(version_id)
    }

    async fn load_snapshot(&self, kind: &str, uid: &str, version_id: &str) -> Result<Value, FabricaError> {
        self.check_open()?;
        let _guard = self.lock.read().await;
        let path = self.snapshot_path(kind, uid, version_id);
        Self::read_json(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FabricaError::NotFound {
                    kind: format!("{kind}Snapshot"),
                    uid: format!("{uid}/{version_id}"),
                }
            } else {
                FabricaError::BackendUnavailable(e.to_string())
            }
        })
    }

    async fn list_snapshots(&self, kind: &str, uid: &str) -> Result<Vec<String>, FabricaError> {
        self.check_open()?;
        let _guard = self.lock.read().await;
        let dir = self.snapshots_dir(kind, uid);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(FabricaError::BackendUnavailable(e.to_string())),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FabricaError::BackendUnavailable(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn delete_snapshot(&self, kind: &str, uid: &str, version_id: &str) -> Result<(), FabricaError> {
        self.check_open()?;
        let _guard = self.lock.write().await;
        let path = self.snapshot_path(kind, uid, version_id);
        fs::remove_file(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FabricaError::NotFound {
                    kind: format!("{kind}Snapshot"),
                    uid: format!("{uid}/{version_id}"),
                }
            } else {
                FabricaError::BackendUnavailable(e.to_string())
            }
        })
    }

    async fn close(&self) -> Result<(), FabricaError> {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod file_tests;
