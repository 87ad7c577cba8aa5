use crate::{KeyValueStore, StorageError, SESSION_KEY};
use belong_core::Track;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    #[serde(rename = "currentSong")]
    pub current_track: Option<Track>,
    #[serde(default)]
    pub queue: Option<Vec<Track>>,
    #[serde(default)]
    pub current_index: Option<usize>,
    #[serde(default)]
    pub volume: Option<f32>,
    #[serde(default)]
    pub is_muted: Option<bool>,
    #[serde(default)]
    pub current_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoredSession {
    pub current_track: Track,
    pub queue: Vec<Track>,
    pub current_index: usize,
    pub volume: f32,
    pub is_muted: bool,
    pub current_time: f64,
}

impl PersistedSession {
    /// Returns `None` when the stored value carries no track to restore.
    pub fn into_restored(self) -> Option<RestoredSession> {
        let current_track = self.current_track.filter(|t| !t.id.is_empty())?;
        let queue = match self.queue {
            Some(queue) if !queue.is_empty() => queue,
            _ => vec![current_track.clone()],
        };
        let current_index = self
            .current_index
            .unwrap_or(0)
            .min(queue.len().saturating_sub(1));
        let volume = self
            .volume
            .filter(|v| v.is_finite())
            .unwrap_or(1.0)
            .clamp(0.0, 1.0);
        let current_time = self
            .current_time
            .filter(|t| t.is_finite() && *t >= 0.0)
            .unwrap_or(0.0);

        Some(RestoredSession {
            current_track,
            queue,
            current_index,
            volume,
            is_muted: self.is_muted.unwrap_or(false),
            current_time,
        })
    }
}

pub struct SessionStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn save(&self, session: &PersistedSession) -> Result<(), StorageError> {
        let json = serde_json::to_string(session).map_err(|source| StorageError::Encode {
            key: SESSION_KEY.to_string(),
            source,
        })?;
        self.store.set(SESSION_KEY, &json)
    }

    /// Missing, unreadable or malformed state all read as "nothing to restore".
    pub fn load(&self) -> Option<RestoredSession> {
        let raw = match self.store.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "failed to read persisted playback state");
                return None;
            }
        };
        match serde_json::from_str::<PersistedSession>(&raw) {
            Ok(session) => session.into_restored(),
            Err(err) => {
                warn!(error = %err, "ignoring malformed persisted playback state");
                None
            }
        }
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(SESSION_KEY)
    }
}
