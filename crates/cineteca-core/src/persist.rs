//! Progress Persister
//!
//! Reads a title's last position once per load and writes the current
//! position on the persist tick and on key transitions. Storage failures are
//! logged and swallowed: losing a progress write must never stop playback.

use crate::{
    store::PlaybackStore,
    types::{MediaId, PlaybackSettings, ProgressRecord},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Writes below this delta from the last written value are skipped
const POSITION_EPSILON: f64 = 0.01;

pub struct ProgressPersister {
    store: Arc<dyn PlaybackStore>,
    last_written: Option<(MediaId, f64)>,
}

impl ProgressPersister {
    pub fn new(store: Arc<dyn PlaybackStore>) -> Self {
        Self {
            store,
            last_written: None,
        }
    }

    pub fn store(&self) -> &Arc<dyn PlaybackStore> {
        &self.store
    }

    /// Position to resume from, if a meaningful one was stored
    pub fn restore(&mut self, media_id: &MediaId) -> Option<f64> {
        self.last_written = None;
        match self.store.load_progress(media_id) {
            Ok(Some(record)) if record.position > 0.0 && record.position.is_finite() => {
                debug!(media_id = %media_id, position = record.position, "Progress restored");
                self.last_written = Some((media_id.clone(), record.position));
                Some(record.position)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(media_id = %media_id, error = %e, "Failed to read progress");
                None
            }
        }
    }

    /// Write `position` unless it matches the last value written for this title
    pub fn write(&mut self, media_id: &MediaId, position: f64) {
        if let Some((last_id, last_pos)) = &self.last_written {
            if last_id == media_id && (last_pos - position).abs() < POSITION_EPSILON {
                return;
            }
        }

        let record = ProgressRecord::new(media_id.clone(), position);
        match self.store.save_progress(&record) {
            Ok(()) => {
                debug!(media_id = %media_id, position = record.position, "Progress saved");
                self.last_written = Some((media_id.clone(), record.position));
            }
            Err(e) => warn!(media_id = %media_id, error = %e, "Failed to save progress"),
        }
    }

    pub fn load_settings(&self) -> PlaybackSettings {
        self.store.load_settings().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read settings, using defaults");
            PlaybackSettings::default()
        })
    }

    pub fn save_settings(&self, settings: &PlaybackSettings) {
        if let Err(e) = self.store.save_settings(settings) {
            warn!(error = %e, "Failed to save settings");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_restore_ignores_zero_position() {
        let store = Arc::new(MemoryStore::new());
        let id = MediaId::from("tt01");
        store.save_progress(&ProgressRecord::new(id.clone(), 0.0)).unwrap();

        let mut persister = ProgressPersister::new(store.clone());
        assert_eq!(persister.restore(&id), None);

        store.save_progress(&ProgressRecord::new(id.clone(), 93.0)).unwrap();
        assert_eq!(persister.restore(&id), Some(93.0));
    }

    #[test]
    fn test_unchanged_position_is_not_rewritten() {
        let store = Arc::new(MemoryStore::new());
        let id = MediaId::from("tt02");
        let mut persister = ProgressPersister::new(store.clone());

        persister.write(&id, 12.0);
        let first = store.load_progress(&id).unwrap().unwrap();
        persister.write(&id, 12.0);
        let second = store.load_progress(&id).unwrap().unwrap();
        assert_eq!(first.updated_at, second.updated_at);

        persister.write(&id, 13.0);
        assert_eq!(store.load_progress(&id).unwrap().unwrap().position, 13.0);
    }
}
