//! Durable key-value storage for progress and settings
//!
//! Last writer wins; no transactional guarantees. The JSON store keeps the
//! whole document in memory and rewrites the file on every change.

use crate::{
    error::Error,
    types::{MediaId, PlaybackSettings, ProgressRecord},
    Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Storage collaborator for per-title progress and process-wide settings
pub trait PlaybackStore: Send + Sync {
    fn load_progress(&self, media_id: &MediaId) -> Result<Option<ProgressRecord>>;
    fn save_progress(&self, record: &ProgressRecord) -> Result<()>;
    fn list_progress(&self) -> Result<Vec<ProgressRecord>>;
    /// Explicit removal; the controller itself never deletes progress
    fn remove_progress(&self, media_id: &MediaId) -> Result<bool>;
    fn load_settings(&self) -> Result<PlaybackSettings>;
    fn save_settings(&self, settings: &PlaybackSettings) -> Result<()>;
}

/// On-disk document layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreDocument {
    pub settings: PlaybackSettings,
    pub progress: BTreeMap<MediaId, ProgressRecord>,
}

impl StoreDocument {
    fn insert(&mut self, record: &ProgressRecord) {
        self.progress.insert(record.media_id.clone(), record.clone());
    }
}

fn lock_poisoned() -> Error {
    Error::storage("store lock poisoned")
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: Mutex<StoreDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlaybackStore for MemoryStore {
    fn load_progress(&self, media_id: &MediaId) -> Result<Option<ProgressRecord>> {
        let doc = self.doc.lock().map_err(|_| lock_poisoned())?;
        Ok(doc.progress.get(media_id).cloned())
    }

    fn save_progress(&self, record: &ProgressRecord) -> Result<()> {
        self.doc.lock().map_err(|_| lock_poisoned())?.insert(record);
        Ok(())
    }

    fn list_progress(&self) -> Result<Vec<ProgressRecord>> {
        let doc = self.doc.lock().map_err(|_| lock_poisoned())?;
        Ok(doc.progress.values().cloned().collect())
    }

    fn remove_progress(&self, media_id: &MediaId) -> Result<bool> {
        let mut doc = self.doc.lock().map_err(|_| lock_poisoned())?;
        Ok(doc.progress.remove(media_id).is_some())
    }

    fn load_settings(&self) -> Result<PlaybackSettings> {
        Ok(self.doc.lock().map_err(|_| lock_poisoned())?.settings)
    }

    fn save_settings(&self, settings: &PlaybackSettings) -> Result<()> {
        self.doc.lock().map_err(|_| lock_poisoned())?.settings = *settings;
        Ok(())
    }
}

/// JSON file store surviving process restarts
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    doc: Mutex<StoreDocument>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => StoreDocument::default(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreDocument::default(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), records = doc.progress.len(), "Store opened");
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write to a sibling temp file, then rename over the target
    fn persist(&self, doc: &StoreDocument) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update<T>(&self, f: impl FnOnce(&mut StoreDocument) -> T) -> Result<T> {
        let mut doc = self.doc.lock().map_err(|_| lock_poisoned())?;
        let out = f(&mut doc);
        self.persist(&doc)?;
        Ok(out)
    }
}

impl PlaybackStore for JsonFileStore {
    fn load_progress(&self, media_id: &MediaId) -> Result<Option<ProgressRecord>> {
        let doc = self.doc.lock().map_err(|_| lock_poisoned())?;
        Ok(doc.progress.get(media_id).cloned())
    }

    fn save_progress(&self, record: &ProgressRecord) -> Result<()> {
        self.update(|doc| doc.insert(record))
    }

    fn list_progress(&self) -> Result<Vec<ProgressRecord>> {
        let doc = self.doc.lock().map_err(|_| lock_poisoned())?;
        Ok(doc.progress.values().cloned().collect())
    }

    fn remove_progress(&self, media_id: &MediaId) -> Result<bool> {
        self.update(|doc| doc.progress.remove(media_id).is_some())
    }

    fn load_settings(&self) -> Result<PlaybackSettings> {
        Ok(self.doc.lock().map_err(|_| lock_poisoned())?.settings)
    }

    fn save_settings(&self, settings: &PlaybackSettings) -> Result<()> {
        self.update(|doc| doc.settings = *settings)
    }
}
