//! Position store -- last read offset and rotation signature per watched file.
//!
//! Persisted as JSON keyed by path. Loading is best-effort: a missing or
//! unreadable file yields an empty store, so watchers start from scratch.
//! Every commit rewrites the whole file through a temp file and a rename
//! while the store lock is held.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::LogPipelineError;

const STORE_VERSION: u32 = 1;

/// Tailing state of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherState {
    /// Bytes consumed from the start of the file
    pub offset: u64,
    /// Leading bytes seen at the last signature check
    #[serde(default)]
    pub signature: Vec<u8>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    positions: BTreeMap<String, WatcherState>,
}

/// Shared, mutex-guarded position store.
#[derive(Debug)]
pub struct PositionStore {
    path: Option<PathBuf>,
    positions: Mutex<BTreeMap<String, WatcherState>>,
}

impl PositionStore {
    /// Opens the store backed by `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let positions = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<StoreFile>(&bytes) {
                Ok(file) => {
                    tracing::info!(
                        path = %path.display(),
                        entries = file.positions.len(),
                        "loaded log positions"
                    );
                    file.positions
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "position store is corrupt, starting from scratch"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no position store yet, starting from scratch");
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "position store unreadable, starting from scratch"
                );
                BTreeMap::new()
            }
        };

        Self {
            path: Some(path),
            positions: Mutex::new(positions),
        }
    }

    /// Store that never touches the disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            positions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Stored state for a watched file (default when unknown).
    pub async fn get(&self, watched: &Path) -> WatcherState {
        self.positions
            .lock()
            .await
            .get(&key(watched))
            .cloned()
            .unwrap_or_default()
    }

    /// Records the state of a watched file and persists the store.
    ///
    /// The in-memory entry is updated even when persisting fails.
    pub async fn commit(&self, watched: &Path, state: WatcherState) -> Result<(), LogPipelineError> {
        let mut positions = self.positions.lock().await;
        positions.insert(key(watched), state);

        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = StoreFile {
            version: STORE_VERSION,
            positions: positions.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|e| LogPipelineError::Position {
            path: path.display().to_string(),
            reason: format!("serialize failed: {e}"),
        })?;

        atomic_write(path, &json)
            .await
            .map_err(|e| LogPipelineError::Position {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    /// Copy of every stored entry.
    pub async fn entries(&self) -> BTreeMap<String, WatcherState> {
        self.positions.lock().await.clone()
    }
}

fn key(watched: &Path) -> String {
    watched.display().to_string()
}

async fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(contents).await?;
    // flushed before the rename makes it visible
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_path_has_default_state() {
        let store = PositionStore::in_memory();
        assert_eq!(
            store.get(Path::new("/var/log/a.log")).await,
            WatcherState::default()
        );
    }

    #[tokio::test]
    async fn commit_persists_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("state").join("positions.json");

        let store = PositionStore::open(&store_path).await;
        let state = WatcherState {
            offset: 1234,
            signature: b"2024/01/01 00:00:01".to_vec(),
        };
        store
            .commit(Path::new("/var/log/a.log"), state.clone())
            .await
            .unwrap();
        assert!(store_path.exists());

        let reopened = PositionStore::open(&store_path).await;
        assert_eq!(reopened.get(Path::new("/var/log/a.log")).await, state);
    }

    #[tokio::test]
    async fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::open(dir.path().join("nope.json")).await;
        assert!(store.entries().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("positions.json");
        std::fs::write(&store_path, b"{not json").unwrap();

        let store = PositionStore::open(&store_path).await;
        assert!(store.entries().await.is_empty());
    }

    #[tokio::test]
    async fn commit_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store_path = dir.path().join("positions.json");
        let store = PositionStore::open(&store_path).await;
        store
            .commit(Path::new("/a"), WatcherState::default())
            .await
            .unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("positions.json")]);
    }

    #[tokio::test]
    async fn concurrent_commits_keep_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(PositionStore::open(dir.path().join("p.json")).await);

        let mut handles = Vec::new();
        for i in 0..16u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let path = PathBuf::from(format!("/var/log/{i}.log"));
                store
                    .commit(
                        &path,
                        WatcherState {
                            offset: i,
                            signature: Vec::new(),
                        },
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let reopened = PositionStore::open(dir.path().join("p.json")).await;
        assert_eq!(reopened.entries().await.len(), 16);
    }
}
