//! Directory-of-JSON-files store.
//!
//! ```text
//! <root>/snapshots/<room id>.json
//! <root>/remaps/<old room id>.json
//! ```
//!
//! Every write goes to a `.tmp` sibling first and is renamed into place,
//! so a crash mid-write leaves either the old file or the new one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use skirmish_protocol::RoomId;
use tokio::fs;
use tokio::sync::Mutex;

use crate::{RoomRemap, SnapshotRecord, SnapshotStore, StoreError};

const SNAPSHOTS: &str = "snapshots";
const REMAPS: &str = "remaps";
const MAX_KEY_LEN: usize = 128;

/// A [`SnapshotStore`] backed by one JSON file per record.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    /// Serializes read-modify-write sequences.
    write_lock: Mutex<()>,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Room ids become file names, so only a safe alphabet is accepted.
fn check_key(room_id: &RoomId) -> Result<&str, StoreError> {
    let key = room_id.as_str();
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(key)
    } else {
        Err(StoreError::InvalidKey(room_id.clone()))
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::CorruptRecord {
                path: path.to_path_buf(),
                source,
            }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path)(e)),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| io_error(path)(e.into()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await.map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).await.map_err(io_error(path))
}

async fn remove_if_present(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path)(e)),
    }
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    /// [`StoreError::Io`] if the directories cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for dir in [SNAPSHOTS, REMAPS] {
            let path = root.join(dir);
            fs::create_dir_all(&path).await.map_err(io_error(&path))?;
        }
        tracing::info!(root = %root.display(), "file snapshot store opened");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_path(&self, room_id: &RoomId) -> Result<PathBuf, StoreError> {
        let key = check_key(room_id)?;
        Ok(self.root.join(SNAPSHOTS).join(format!("{key}.json")))
    }

    fn remap_path(&self, room_id: &RoomId) -> Result<PathBuf, StoreError> {
        let key = check_key(room_id)?;
        Ok(self.root.join(REMAPS).join(format!("{key}.json")))
    }

    /// Reads every `.json` file in `dir`. Unreadable files are logged and
    /// skipped so one bad file cannot block the rest.
    async fn read_all<T: DeserializeOwned>(&self, dir: &str) -> Result<Vec<(PathBuf, T)>, StoreError> {
        let dir = self.root.join(dir);
        let mut entries = fs::read_dir(&dir).await.map_err(io_error(&dir))?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error(&dir))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json(&path).await {
                Ok(Some(value)) => out.push((path, value)),
                Ok(None) => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record"),
            }
        }
        Ok(out)
    }
}

impl SnapshotStore for FileStore {
    async fn upsert(&self, record: SnapshotRecord) -> Result<bool, StoreError> {
        let path = self.snapshot_path(&record.room_id)?;
        let _guard = self.write_lock.lock().await;

        // A corrupt existing file is simply replaced.
        if let Ok(Some(existing)) = read_json::<SnapshotRecord>(&path).await {
            if existing.updated_at > record.updated_at {
                tracing::debug!(room_id = %record.room_id, "discarding stale snapshot");
                return Ok(false);
            }
        }
        write_json(&path, &record).await?;
        Ok(true)
    }

    async fn delete(&self, room_id: &RoomId) -> Result<(), StoreError> {
        let path = self.snapshot_path(room_id)?;
        let _guard = self.write_lock.lock().await;
        remove_if_present(&path).await.map(|_| ())
    }

    async fn load_active(&self, now: DateTime<Utc>) -> Result<Vec<SnapshotRecord>, StoreError> {
        let records = self.read_all::<SnapshotRecord>(SNAPSHOTS).await?;
        Ok(records
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| record.is_recoverable(now))
            .collect())
    }

    async fn deactivate(&self, room_id: &RoomId) -> Result<(), StoreError> {
        let path = self.snapshot_path(room_id)?;
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = read_json::<SnapshotRecord>(&path).await? else {
            return Ok(());
        };
        record.active = false;
        write_json(&path, &record).await
    }

    async fn put_remap(&self, remap: RoomRemap) -> Result<(), StoreError> {
        let path = self.remap_path(&remap.old_room_id)?;
        let _guard = self.write_lock.lock().await;
        write_json(&path, &remap).await
    }

    async fn remap(&self, old: &RoomId) -> Result<Option<RoomRemap>, StoreError> {
        let path = self.remap_path(old)?;
        read_json(&path).await
    }

    async fn prune(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0;
        for (path, record) in self.read_all::<SnapshotRecord>(SNAPSHOTS).await? {
            if record.is_expired(now) && remove_if_present(&path).await? {
                removed += 1;
            }
        }
        for (path, remap) in self.read_all::<RoomRemap>(REMAPS).await? {
            if remap.is_expired(now) && remove_if_present(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
