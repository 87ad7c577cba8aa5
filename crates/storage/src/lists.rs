use crate::{KeyValueStore, StorageError, LIKED_KEY, RECENT_KEY};
use belong_core::{LikedTrack, RecentTrack, Track};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

pub const RECENT_CAPACITY: usize = 50;

/// A JSON array persisted under one key, loaded lazily on first use.
///
/// Nothing is written until the stored list has been read, so an empty
/// in-memory list can never overwrite entries that were not loaded yet.
struct PersistedList<T, S> {
    key: &'static str,
    store: S,
    items: Vec<T>,
    loaded: bool,
}

impl<T, S> PersistedList<T, S>
where
    T: Serialize + DeserializeOwned,
    S: KeyValueStore,
{
    fn new(key: &'static str, store: S) -> Self {
        Self {
            key,
            store,
            items: Vec::new(),
            loaded: false,
        }
    }

    fn items(&mut self) -> &mut Vec<T> {
        if !self.loaded {
            self.items = self.read();
            self.loaded = true;
        }
        &mut self.items
    }

    fn read(&self) -> Vec<T> {
        let raw = match self.store.get(self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!(key = self.key, error = %err, "failed to read list; starting empty");
                return Vec::new();
            }
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "null" || trimmed == "undefined" {
            return Vec::new();
        }

        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Array(values)) => {
                let total = values.len();
                let items: Vec<T> = values
                    .into_iter()
                    .filter_map(|v| serde_json::from_value(v).ok())
                    .collect();
                if items.len() != total {
                    warn!(
                        key = self.key,
                        skipped = total - items.len(),
                        "dropped unreadable list entries"
                    );
                }
                items
            }
            Ok(_) => {
                warn!(key = self.key, "stored list is not an array; resetting");
                self.discard();
                Vec::new()
            }
            Err(err) => {
                warn!(key = self.key, error = %err, "stored list is malformed; resetting");
                self.discard();
                Vec::new()
            }
        }
    }

    fn discard(&self) {
        if let Err(err) = self.store.remove(self.key) {
            warn!(key = self.key, error = %err, "failed to remove corrupt list");
        }
    }

    fn save(&self) {
        if !self.loaded {
            return;
        }
        let result = serde_json::to_string(&self.items)
            .map_err(|source| StorageError::Encode {
                key: self.key.to_string(),
                source,
            })
            .and_then(|json| self.store.set(self.key, &json));
        match result {
            Ok(()) => debug!(key = self.key, len = self.items.len(), "list saved"),
            Err(err) => error!(key = self.key, error = %err, "failed to save list"),
        }
    }

    fn mutate<R>(&mut self, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        let out = f(self.items());
        self.save();
        out
    }
}

fn has_id(track: &Track) -> bool {
    if track.id.trim().is_empty() {
        error!(name = %track.name, "track has no id; ignoring");
        false
    } else {
        true
    }
}

pub struct LikedSongs<S: KeyValueStore> {
    list: PersistedList<LikedTrack, S>,
}

impl<S: KeyValueStore> LikedSongs<S> {
    pub fn new(store: S) -> Self {
        Self {
            list: PersistedList::new(LIKED_KEY, store),
        }
    }

    pub fn liked(&mut self) -> &[LikedTrack] {
        self.list.items()
    }

    pub fn is_liked(&mut self, id: &str) -> bool {
        !id.is_empty() && self.list.items().iter().any(|s| s.track.id == id)
    }

    pub fn add_liked(&mut self, track: &Track) -> bool {
        if !has_id(track) || self.is_liked(&track.id) {
            return false;
        }
        let now = Utc::now();
        let entry = LikedTrack {
            track: track.snapshot(now),
            liked_at: now,
        };
        self.list.mutate(|items| items.push(entry));
        true
    }

    pub fn remove_liked(&mut self, id: &str) -> bool {
        if !self.is_liked(id) {
            return false;
        }
        self.list.mutate(|items| items.retain(|s| s.track.id != id));
        true
    }

    /// Flips membership and returns the new state (`true` = liked).
    pub fn toggle_like(&mut self, track: &Track) -> bool {
        if self.is_liked(&track.id) {
            self.remove_liked(&track.id);
            false
        } else {
            self.add_liked(track)
        }
    }

    pub fn clear(&mut self) {
        self.list.mutate(Vec::clear);
    }
}

pub struct RecentlyPlayed<S: KeyValueStore> {
    list: PersistedList<RecentTrack, S>,
}

impl<S: KeyValueStore> RecentlyPlayed<S> {
    pub fn new(store: S) -> Self {
        Self {
            list: PersistedList::new(RECENT_KEY, store),
        }
    }

    pub fn recent(&mut self) -> &[RecentTrack] {
        self.list.items()
    }

    pub fn add_to_recently_played(&mut self, track: &Track) -> bool {
        if !has_id(track) {
            return false;
        }
        let now = Utc::now();
        let entry = RecentTrack {
            track: track.snapshot(now),
            played_at: now,
        };
        self.list.mutate(|items| {
            items.retain(|s| s.track.id != entry.track.id);
            items.insert(0, entry);
            items.truncate(RECENT_CAPACITY);
        });
        true
    }

    pub fn clear(&mut self) {
        self.list.mutate(Vec::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::{LikedSongs, RecentlyPlayed, RECENT_CAPACITY};
    use crate::{KeyValueStore, MemoryStore, LIKED_KEY, RECENT_KEY};
    use belong_core::Track;

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            name: format!("song {id}"),
            ..Track::default()
        }
    }

    #[test]
    fn toggle_like_flips_membership() {
        let store = MemoryStore::new();
        let mut liked = LikedSongs::new(store.clone());
        let t = track("a");

        assert!(liked.toggle_like(&t));
        assert!(liked.is_liked("a"));
        assert!(!liked.toggle_like(&t));
        assert!(!liked.is_liked("a"));
        assert_eq!(store.get(LIKED_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn liked_list_has_no_duplicates_and_survives_reload() {
        let store = MemoryStore::new();
        let mut liked = LikedSongs::new(store.clone());
        assert!(liked.add_liked(&track("a")));
        assert!(!liked.add_liked(&track("a")));
        assert!(liked.add_liked(&track("b")));

        let mut reloaded = LikedSongs::new(store);
        let ids: Vec<_> = reloaded.liked().iter().map(|s| s.track.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(reloaded.liked()[0].track.artist_line(), "Unknown Artist");
    }

    #[test]
    fn rejects_tracks_without_id() {
        let mut liked = LikedSongs::new(MemoryStore::new());
        assert!(!liked.toggle_like(&track("")));
        assert!(liked.liked().is_empty());
    }

    #[test]
    fn corrupt_values_self_heal_to_empty() {
        for raw in ["null", "undefined", "{broken", "{\"id\":\"x\"}"] {
            let store = MemoryStore::new();
            store.set(LIKED_KEY, raw).unwrap();
            let mut liked = LikedSongs::new(store.clone());
            assert!(liked.liked().is_empty(), "{raw} should load as empty");
            assert!(!liked.is_liked("x"));
            assert_eq!(store.get(LIKED_KEY).unwrap(), None, "{raw} should be removed");
        }
    }

    #[test]
    fn unreadable_entries_are_skipped() {
        let store = MemoryStore::new();
        store
            .set(
                LIKED_KEY,
                r#"[{"id":"ok","name":"Fine","likedAt":"2025-01-01T00:00:00Z"},{"id":"bad"}]"#,
            )
            .unwrap();
        let mut liked = LikedSongs::new(store);
        assert_eq!(liked.liked().len(), 1);
        assert!(liked.is_liked("ok"));
    }

    #[test]
    fn existing_entries_are_not_clobbered_before_load() {
        let store = MemoryStore::new();
        {
            let mut liked = LikedSongs::new(store.clone());
            liked.add_liked(&track("keep"));
        }
        let mut liked = LikedSongs::new(store.clone());
        liked.add_liked(&track("new"));
        assert!(liked.is_liked("keep"));
        assert!(store.get(LIKED_KEY).unwrap().unwrap().contains("keep"));
    }

    #[test]
    fn recent_caps_and_orders_newest_first() {
        let mut recent = RecentlyPlayed::new(MemoryStore::new());
        for i in 0..=RECENT_CAPACITY {
            recent.add_to_recently_played(&track(&i.to_string()));
        }
        let list = recent.recent();
        assert_eq!(list.len(), RECENT_CAPACITY);
        assert_eq!(list[0].track.id, RECENT_CAPACITY.to_string());
        assert!(list.iter().all(|s| s.track.id != "0"));
    }

    #[test]
    fn replaying_moves_entry_to_front() {
        let store = MemoryStore::new();
        let mut recent = RecentlyPlayed::new(store.clone());
        recent.add_to_recently_played(&track("a"));
        recent.add_to_recently_played(&track("b"));
        recent.add_to_recently_played(&track("a"));

        let ids: Vec<_> = recent.recent().iter().map(|s| s.track.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        recent.clear();
        assert!(recent.recent().is_empty());
        assert_eq!(store.get(RECENT_KEY).unwrap().as_deref(), Some("[]"));
    }
}
