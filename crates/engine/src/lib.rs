use belong_core::{AppConfig, Track};
use belong_storage::{KeyValueStore, PersistedSession, SessionStore, StorageError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

pub mod output;
pub mod state;

pub use output::{MediaError, MediaEvent, MediaOutput, SourceId};
pub use state::{Followup, PlaybackState, TransportStatus};

const MAX_SEEK_SECONDS: f64 = 86_400.0;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("track {track_id} has no playable source")]
    NoPlayableSource { track_id: String },
    #[error("media failed to load: {0}")]
    MediaLoad(String),
    #[error("playback was not allowed to start")]
    AutoplayRejected,
    #[error("audio output is gone")]
    OutputDisconnected,
    #[error("persisting playback state failed: {0}")]
    Persistence(#[from] StorageError),
}

impl From<MediaError> for PlaybackError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::AutoplayRejected => PlaybackError::AutoplayRejected,
            MediaError::Load(message) => PlaybackError::MediaLoad(message),
            MediaError::Disconnected => PlaybackError::OutputDisconnected,
        }
    }
}

#[derive(Debug)]
pub enum PlayOutcome {
    Started,
    Toggled { playing: bool },
    Failed(PlaybackError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRequest {
    pub track_id: String,
    pub track_name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub default_volume: f32,
    /// `None` keeps auto-resume off.
    pub auto_resume_delay: Option<Duration>,
    pub load_timeout: Option<Duration>,
    pub persist_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_volume: 1.0,
            auto_resume_delay: None,
            load_timeout: None,
            persist_interval: Duration::from_secs(5),
        }
    }
}

impl CoordinatorConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        let playback = &cfg.playback;
        Self {
            default_volume: playback.default_volume,
            auto_resume_delay: playback
                .auto_resume
                .then(|| Duration::from_millis(playback.auto_resume_delay_ms)),
            load_timeout: (playback.load_timeout_ms > 0)
                .then(|| Duration::from_millis(playback.load_timeout_ms)),
            persist_interval: Duration::from_millis(playback.persist_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AutoResume {
    Disarmed,
    Armed,
    Due(Instant),
}

pub struct Coordinator<O: MediaOutput, S: KeyValueStore> {
    cfg: CoordinatorConfig,
    output: O,
    session: SessionStore<S>,
    cache_tx: Option<UnboundedSender<CacheRequest>>,
    state: PlaybackState,
    queue: Vec<Track>,
    current_index: usize,
    source: Option<SourceId>,
    next_source_id: u64,
    loading_since: Option<Instant>,
    auto_resume: AutoResume,
    last_persisted_time: f64,
}

impl<O: MediaOutput, S: KeyValueStore> Coordinator<O, S> {
    pub fn new(cfg: CoordinatorConfig, mut output: O, store: S) -> Self {
        output.enable_background_playback();
        let state = PlaybackState {
            volume: sanitize_volume(cfg.default_volume).unwrap_or(1.0),
            ..PlaybackState::default()
        };
        output.set_volume(state.effective_volume());

        Self {
            cfg,
            output,
            session: SessionStore::new(store),
            cache_tx: None,
            state,
            queue: Vec::new(),
            current_index: 0,
            source: None,
            next_source_id: 0,
            loading_since: None,
            auto_resume: AutoResume::Disarmed,
            last_persisted_time: 0.0,
        }
    }

    pub fn with_cache_requests(mut self, tx: UnboundedSender<CacheRequest>) -> Self {
        self.cache_tx = Some(tx);
        self
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn queue(&self) -> &[Track] {
        &self.queue
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    /// Loads the last persisted session. Never starts playback.
    pub fn restore(&mut self) -> bool {
        let Some(restored) = self.session.load() else {
            return false;
        };

        self.state.duration = restored.current_track.duration.unwrap_or(0) as f64;
        self.state.current_time = restored.current_time;
        self.state.status = TransportStatus::Idle;
        self.state.play_requested = false;
        self.state.volume = restored.volume;
        self.state.is_muted = restored.is_muted;
        info!(
            track_id = %restored.current_track.id,
            queue_len = restored.queue.len(),
            "restored playback session"
        );
        self.state.current_track = Some(restored.current_track);
        self.queue = restored.queue;
        self.current_index = restored.current_index;
        self.source = None;
        self.auto_resume = AutoResume::Disarmed;
        self.last_persisted_time = self.state.current_time;
        self.apply_volume();
        true
    }

    /// Plays `track` with `queue` as the new queue (`[track]` when empty).
    /// Re-invoking with the current track flips play/pause instead.
    pub fn play_track(&mut self, track: Track, queue: Vec<Track>, start_index: usize) -> PlayOutcome {
        if self.is_loaded(&track.id) {
            return self.toggle();
        }
        let queue = if queue.is_empty() {
            vec![track.clone()]
        } else {
            queue
        };
        self.current_index = start_index.min(queue.len() - 1);
        self.queue = queue;
        self.start(track)
    }

    pub fn pause(&mut self) {
        if self.state.current_track.is_none() || self.source.is_none() {
            return;
        }
        self.output.pause();
        self.state.play_requested = false;
        if self.state.status == TransportStatus::Playing {
            self.state.status = TransportStatus::Paused;
        }
        self.auto_resume = AutoResume::Disarmed;
        self.persist();
    }

    pub fn resume(&mut self) -> bool {
        let Some(track) = self.state.current_track.clone() else {
            return false;
        };

        if self.source.is_none()
            || matches!(
                self.state.status,
                TransportStatus::Idle | TransportStatus::Ended | TransportStatus::Error
            )
        {
            let restored_position =
                (self.state.status == TransportStatus::Idle).then_some(self.state.current_time);
            let started = matches!(self.start(track), PlayOutcome::Started);
            if let Some(position) = restored_position.filter(|p| *p > 0.0) {
                if started {
                    self.seek_to(position);
                }
            }
            return started && self.state.play_requested;
        }

        match self.output.play() {
            Ok(()) => {
                self.state.play_requested = true;
                if self.state.status == TransportStatus::Paused {
                    self.state.status = TransportStatus::Playing;
                }
                true
            }
            Err(err) => {
                let err = PlaybackError::from(err);
                warn!(error = %err, track_id = %track.id, "resume failed");
                self.state.play_requested = false;
                false
            }
        }
    }

    pub fn seek_to(&mut self, seconds: f64) {
        if !seconds.is_finite() {
            warn!(seconds, "ignoring seek to non-finite position");
            return;
        }
        let target = seconds.max(0.0).min(self.seek_limit());
        if self.source.is_some() {
            if let Err(err) = self.output.seek(target) {
                let err = PlaybackError::from(err);
                warn!(error = %err, target, "seek failed");
            }
        }
        self.state.current_time = target;
        self.persist();
    }

    pub fn play_next(&mut self) -> Option<PlayOutcome> {
        if self.current_index + 1 >= self.queue.len() {
            debug!("no next track in queue");
            return None;
        }
        Some(self.play_at(self.current_index + 1))
    }

    pub fn play_previous(&mut self) -> Option<PlayOutcome> {
        if self.queue.is_empty() || self.current_index == 0 {
            debug!("no previous track in queue");
            return None;
        }
        Some(self.play_at(self.current_index - 1))
    }

    pub fn toggle_mute(&mut self) {
        self.state.is_muted = !self.state.is_muted;
        self.apply_volume();
        self.persist();
    }

    pub fn change_volume(&mut self, volume: f32) {
        let Some(volume) = sanitize_volume(volume) else {
            warn!(volume, "ignoring non-finite volume");
            return;
        };
        self.state.volume = volume;
        if volume > 0.0 {
            self.state.is_muted = false;
        }
        self.apply_volume();
        self.persist();
    }

    pub fn add_to_queue(&mut self, tracks: impl IntoIterator<Item = Track>) {
        let before = self.queue.len();
        self.queue.extend(tracks);
        debug!(added = self.queue.len() - before, "queue extended");
        self.persist();
    }

    /// Removes the entry at `index`, keeping `current_index` on the same track
    /// when an earlier entry goes away.
    pub fn remove_from_queue(&mut self, index: usize) -> Option<Track> {
        if index >= self.queue.len() {
            return None;
        }
        let removed = self.queue.remove(index);
        if index < self.current_index {
            self.current_index -= 1;
        }
        if self.current_index >= self.queue.len() {
            self.current_index = self.queue.len().saturating_sub(1);
        }
        self.persist();
        Some(removed)
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.current_index = 0;
        self.persist();
    }

    pub fn handle_media_event(&mut self, source: SourceId, event: MediaEvent) {
        if self.source != Some(source) {
            debug!(%source, ?event, "ignoring event from superseded source");
            return;
        }

        match self.state.apply(&event) {
            Followup::None => {}
            Followup::PositionChanged => {
                let elapsed = (self.state.current_time - self.last_persisted_time).abs();
                if elapsed >= self.cfg.persist_interval.as_secs_f64() {
                    self.persist();
                }
            }
            Followup::Advance => self.advance_after_end(),
            Followup::LoadFailed(message) => {
                self.source = None;
                let err = PlaybackError::MediaLoad(message);
                warn!(
                    error = %err,
                    track_id = self.state.current_track_id().unwrap_or_default(),
                    "playback failed"
                );
            }
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if self.state.is_loading() && self.source.is_some() {
            let since = *self.loading_since.get_or_insert(now);
            if let Some(limit) = self.cfg.load_timeout {
                if now.duration_since(since) >= limit {
                    let err = PlaybackError::MediaLoad(format!("no response after {limit:?}"));
                    warn!(error = %err, "giving up on stuck load");
                    self.output.pause();
                    self.source = None;
                    self.loading_since = None;
                    self.state.fail();
                }
            }
        } else {
            self.loading_since = None;
        }

        match self.auto_resume {
            AutoResume::Disarmed => {}
            _ if self.state.is_playing() => self.auto_resume = AutoResume::Disarmed,
            _ if self.state.is_loading() => {}
            AutoResume::Armed => {
                self.auto_resume = match self.cfg.auto_resume_delay {
                    Some(delay) => AutoResume::Due(now + delay),
                    None => AutoResume::Disarmed,
                };
            }
            AutoResume::Due(at) if now >= at => {
                self.auto_resume = AutoResume::Disarmed;
                if self.state.status == TransportStatus::Paused && self.source.is_some() {
                    debug!("auto-resuming playback");
                    self.resume();
                }
            }
            AutoResume::Due(_) => {}
        }
    }

    /// Decoder duration, else the catalog duration, else a day.
    fn seek_limit(&self) -> f64 {
        let catalog = self
            .state
            .current_track
            .as_ref()
            .and_then(|t| t.duration)
            .unwrap_or(0) as f64;
        [self.state.duration, catalog]
            .into_iter()
            .find(|d| *d > 0.0)
            .unwrap_or(MAX_SEEK_SECONDS)
    }

    fn is_loaded(&self, id: &str) -> bool {
        self.source.is_some()
            && self.state.current_track_id() == Some(id)
            && matches!(
                self.state.status,
                TransportStatus::Loading | TransportStatus::Playing | TransportStatus::Paused
            )
    }

    fn toggle(&mut self) -> PlayOutcome {
        let wants_play = self.state.is_playing()
            || (self.state.is_loading() && self.state.play_requested);
        if wants_play {
            self.pause();
        } else {
            self.resume();
        }
        PlayOutcome::Toggled {
            playing: self.state.play_requested,
        }
    }

    fn play_at(&mut self, index: usize) -> PlayOutcome {
        let track = self.queue[index].clone();
        self.current_index = index;
        if self.is_loaded(&track.id) {
            return self.toggle();
        }
        self.start(track)
    }

    fn start(&mut self, track: Track) -> PlayOutcome {
        let url = track.best_audio_url().map(str::to_owned);
        let track_id = track.id.clone();
        self.state.begin_load(track);
        self.source = None;
        self.loading_since = None;
        self.last_persisted_time = 0.0;
        self.auto_resume = if self.cfg.auto_resume_delay.is_some() {
            AutoResume::Armed
        } else {
            AutoResume::Disarmed
        };

        let Some(url) = url else {
            return self.abort_start(PlaybackError::NoPlayableSource { track_id });
        };

        self.next_source_id += 1;
        let source = SourceId(self.next_source_id);
        if let Err(err) = self.output.load(source, &url) {
            return self.abort_start(err.into());
        }
        self.source = Some(source);

        match self.output.play() {
            Ok(()) => self.state.play_requested = true,
            Err(err) => {
                let err = PlaybackError::from(err);
                warn!(error = %err, %track_id, "track loaded but playback did not start");
            }
        }

        info!(%track_id, %source, "loading track");
        self.persist();
        self.request_cache(&url);
        PlayOutcome::Started
    }

    fn abort_start(&mut self, err: PlaybackError) -> PlayOutcome {
        self.state.fail();
        warn!(
            error = %err,
            track_id = self.state.current_track_id().unwrap_or_default(),
            "cannot play track"
        );
        self.persist();
        PlayOutcome::Failed(err)
    }

    fn advance_after_end(&mut self) {
        if self.play_next().is_none() {
            info!("reached end of queue");
            // Replaying the last track starts it from the top.
            self.state.status = TransportStatus::Idle;
            self.state.current_time = 0.0;
            self.source = None;
            self.persist();
        }
    }

    fn apply_volume(&mut self) {
        self.output.set_volume(self.state.effective_volume());
    }

    fn persist(&mut self) {
        let Some(track) = &self.state.current_track else {
            return;
        };
        let session = PersistedSession {
            current_track: Some(track.clone()),
            queue: Some(self.queue.clone()),
            current_index: Some(self.current_index),
            volume: Some(self.state.volume),
            is_muted: Some(self.state.is_muted),
            current_time: Some(self.state.current_time),
        };
        match self.session.save(&session) {
            Ok(()) => self.last_persisted_time = self.state.current_time,
            Err(err) => {
                let err = PlaybackError::from(err);
                warn!(error = %err, "failed to persist playback state");
            }
        }
    }

    fn request_cache(&self, url: &str) {
        let (Some(tx), Some(track)) = (&self.cache_tx, &self.state.current_track) else {
            return;
        };
        let request = CacheRequest {
            track_id: track.id.clone(),
            track_name: track.name.clone(),
            url: url.to_string(),
        };
        if tx.send(request).is_err() {
            debug!("cache worker stopped; skipping offline copy");
        }
    }
}

fn sanitize_volume(volume: f32) -> Option<f32> {
    volume.is_finite().then(|| volume.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::{
        CacheRequest, Coordinator, CoordinatorConfig, MediaError, MediaEvent, MediaOutput,
        PlayOutcome, PlaybackError, SourceId, TransportStatus,
    };
    use belong_core::{MediaLink, Track};
    use belong_storage::{KeyValueStore, MemoryStore, SESSION_KEY};
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeOutput {
        loads: Vec<(SourceId, String)>,
        plays: usize,
        pauses: usize,
        seeks: Vec<f64>,
        volume: Option<f32>,
        background: bool,
        reject_play: bool,
        fail_load: bool,
    }

    impl MediaOutput for FakeOutput {
        fn enable_background_playback(&mut self) {
            self.background = true;
        }

        fn load(&mut self, source: SourceId, url: &str) -> Result<(), MediaError> {
            if self.fail_load {
                return Err(MediaError::Load("unsupported".to_string()));
            }
            self.loads.push((source, url.to_string()));
            Ok(())
        }

        fn play(&mut self) -> Result<(), MediaError> {
            if self.reject_play {
                return Err(MediaError::AutoplayRejected);
            }
            self.plays += 1;
            Ok(())
        }

        fn pause(&mut self) {
            self.pauses += 1;
        }

        fn seek(&mut self, seconds: f64) -> Result<(), MediaError> {
            self.seeks.push(seconds);
            Ok(())
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = Some(volume);
        }
    }

    fn track(id: &str) -> Track {
        track_with(id, &[(4, &format!("https://cdn.test/{id}_320.mp4"))])
    }

    fn track_with(id: &str, urls: &[(usize, &str)]) -> Track {
        let mut download_url = vec![None; 5];
        for (tier, url) in urls {
            download_url[*tier] = Some(MediaLink {
                quality: format!("tier{tier}"),
                url: url.to_string(),
            });
        }
        Track {
            id: id.to_string(),
            name: format!("song {id}"),
            duration: Some(200),
            download_url,
            ..Track::default()
        }
    }

    fn coordinator() -> Coordinator<FakeOutput, MemoryStore> {
        Coordinator::new(
            CoordinatorConfig::default(),
            FakeOutput::default(),
            MemoryStore::new(),
        )
    }

    fn ready(coord: &mut Coordinator<FakeOutput, MemoryStore>) {
        let source = coord.source().unwrap();
        coord.handle_media_event(source, MediaEvent::LoadedMetadata { duration: 200.0 });
        coord.handle_media_event(source, MediaEvent::CanPlay);
    }

    #[test]
    fn sets_background_hint_once() {
        let coord = coordinator();
        assert!(coord.output().background);
        assert_eq!(coord.output().volume, Some(1.0));
    }

    #[test]
    fn replaying_same_track_toggles_without_reload() {
        let mut coord = coordinator();
        let t = track("a");

        assert!(matches!(coord.play_track(t.clone(), vec![], 0), PlayOutcome::Started));
        ready(&mut coord);
        assert!(coord.state().is_playing());

        let second = coord.play_track(t.clone(), vec![], 0);
        assert!(matches!(second, PlayOutcome::Toggled { playing: false }));
        assert!(!coord.state().is_playing());

        let third = coord.play_track(t, vec![], 0);
        assert!(matches!(third, PlayOutcome::Toggled { playing: true }));
        assert!(coord.state().is_playing());
        assert_eq!(coord.output().loads.len(), 1);
    }

    #[test]
    fn toggling_while_loading_cancels_the_play_request() {
        let mut coord = coordinator();
        coord.play_track(track("a"), vec![], 0);
        coord.play_track(track("a"), vec![], 0);

        assert_eq!(coord.output().loads.len(), 1);
        assert!(!coord.state().play_requested);
        ready(&mut coord);
        assert_eq!(coord.state().status, TransportStatus::Paused);
    }

    #[test]
    fn picks_highest_available_quality() {
        let mut coord = coordinator();
        let t = track_with("a", &[(0, "https://cdn.test/low"), (2, "https://cdn.test/mid")]);
        coord.play_track(t, vec![], 0);
        assert_eq!(coord.output().loads[0].1, "https://cdn.test/mid");
    }

    #[test]
    fn track_without_sources_fails_quietly() {
        let mut coord = coordinator();
        let t = Track {
            id: "silent".to_string(),
            ..Track::default()
        };
        let outcome = coord.play_track(t, vec![], 0);

        assert!(matches!(
            outcome,
            PlayOutcome::Failed(PlaybackError::NoPlayableSource { .. })
        ));
        assert!(!coord.state().is_playing());
        assert!(!coord.state().is_loading());
        assert_eq!(coord.state().status, TransportStatus::Error);
        assert_eq!(coord.state().current_track_id(), Some("silent"));
        assert!(coord.output().loads.is_empty());
    }

    #[test]
    fn load_failure_resets_flags() {
        let output = FakeOutput {
            fail_load: true,
            ..FakeOutput::default()
        };
        let mut coord = Coordinator::new(CoordinatorConfig::default(), output, MemoryStore::new());
        let outcome = coord.play_track(track("a"), vec![], 0);
        assert!(matches!(outcome, PlayOutcome::Failed(PlaybackError::MediaLoad(_))));
        assert!(!coord.state().is_loading());
        assert!(coord.source().is_none());
    }

    #[test]
    fn queue_edges_are_no_ops() {
        let mut coord = coordinator();
        let queue = vec![track("a"), track("b")];
        coord.play_track(queue[0].clone(), queue.clone(), 0);

        assert!(coord.play_previous().is_none());
        assert_eq!(coord.current_index(), 0);
        assert_eq!(coord.output().loads.len(), 1);

        assert!(matches!(coord.play_next(), Some(PlayOutcome::Started)));
        assert_eq!(coord.current_index(), 1);
        assert_eq!(coord.state().current_track_id(), Some("b"));

        assert!(coord.play_next().is_none());
        assert_eq!(coord.current_index(), 1);
        assert_eq!(coord.output().loads.len(), 2);

        assert!(matches!(coord.play_previous(), Some(PlayOutcome::Started)));
        assert_eq!(coord.state().current_track_id(), Some("a"));
    }

    #[test]
    fn stale_events_are_ignored() {
        let mut coord = coordinator();
        coord.play_track(track("a"), vec![], 0);
        let first = coord.source().unwrap();
        coord.play_track(track("b"), vec![], 0);
        let second = coord.source().unwrap();
        assert_ne!(first, second);

        coord.handle_media_event(first, MediaEvent::CanPlay);
        coord.handle_media_event(first, MediaEvent::Error { message: "late".to_string() });
        assert!(coord.state().is_loading());
        assert_eq!(coord.state().current_track_id(), Some("b"));

        coord.handle_media_event(second, MediaEvent::CanPlay);
        assert!(coord.state().is_playing());
    }

    #[test]
    fn media_error_clears_loading_and_playing() {
        let mut coord = coordinator();
        coord.play_track(track("a"), vec![], 0);
        let source = coord.source().unwrap();
        coord.handle_media_event(source, MediaEvent::Error { message: "404".to_string() });

        assert_eq!(coord.state().status, TransportStatus::Error);
        assert!(coord.source().is_none());

        // Error behaves like idle: the same track loads again.
        assert!(matches!(coord.play_track(track("a"), vec![], 0), PlayOutcome::Started));
        assert_eq!(coord.output().loads.len(), 2);
    }

    #[test]
    fn ended_advances_then_stops_at_end_of_queue() {
        let mut coord = coordinator();
        let queue = vec![track("a"), track("b")];
        coord.play_track(queue[0].clone(), queue, 0);
        ready(&mut coord);

        let first = coord.source().unwrap();
        coord.handle_media_event(first, MediaEvent::Ended);
        assert_eq!(coord.state().current_track_id(), Some("b"));
        assert_eq!(coord.current_index(), 1);
        assert!(coord.state().is_loading());

        ready(&mut coord);
        let second = coord.source().unwrap();
        coord.handle_media_event(second, MediaEvent::Ended);
        assert_eq!(coord.state().status, TransportStatus::Idle);
        assert_eq!(coord.state().current_time, 0.0);
        assert!(coord.source().is_none());
        assert_eq!(coord.output().loads.len(), 2);
    }

    #[test]
    fn volume_is_clamped_and_unmutes() {
        let mut coord = coordinator();
        coord.toggle_mute();
        assert!(coord.state().is_muted);
        assert_eq!(coord.output().volume, Some(0.0));

        coord.change_volume(1.7);
        assert_eq!(coord.state().volume, 1.0);
        assert!(!coord.state().is_muted);
        assert_eq!(coord.output().volume, Some(1.0));

        coord.toggle_mute();
        coord.change_volume(-0.5);
        assert_eq!(coord.state().volume, 0.0);
        assert!(coord.state().is_muted);

        coord.change_volume(f32::NAN);
        assert_eq!(coord.state().volume, 0.0);
    }

    #[test]
    fn seek_clamps_to_known_duration() {
        let mut coord = coordinator();
        coord.seek_to(30.0);
        assert!(coord.output().seeks.is_empty());

        coord.play_track(track("a"), vec![], 0);
        ready(&mut coord);
        coord.seek_to(500.0);
        coord.seek_to(-3.0);
        assert_eq!(coord.output().seeks, vec![200.0, 0.0]);
        assert_eq!(coord.state().current_time, 0.0);
    }

    #[test]
    fn seek_before_metadata_is_bounded() {
        let mut coord = coordinator();
        coord.play_track(track("a"), vec![], 0);
        assert!(coord.state().is_loading());
        coord.seek_to(1e300);
        assert_eq!(coord.output().seeks, vec![200.0]);

        let mut unknown = track_with("b", &[(4, "https://cdn.test/b.mp4")]);
        unknown.duration = None;
        coord.play_track(unknown, vec![], 0);
        coord.seek_to(1e300);
        assert_eq!(coord.output().seeks, vec![200.0, super::MAX_SEEK_SECONDS]);
        assert_eq!(coord.state().current_time, super::MAX_SEEK_SECONDS);
    }

    #[test]
    fn removing_earlier_entry_keeps_current_track() {
        let mut coord = coordinator();
        let queue = vec![track("a"), track("b"), track("c")];
        coord.play_track(queue[2].clone(), queue, 2);

        assert_eq!(coord.remove_from_queue(0).map(|t| t.id), Some("a".to_string()));
        assert_eq!(coord.current_index(), 1);
        assert_eq!(coord.queue()[coord.current_index()].id, "c");

        assert!(coord.remove_from_queue(9).is_none());
        coord.add_to_queue(vec![track("d")]);
        assert_eq!(coord.queue().len(), 3);

        coord.clear_queue();
        assert!(coord.queue().is_empty());
        assert_eq!(coord.current_index(), 0);
        assert_eq!(coord.state().current_track_id(), Some("c"));
    }

    #[test]
    fn rejected_resume_stays_paused() {
        let mut coord = coordinator();
        coord.play_track(track("a"), vec![], 0);
        ready(&mut coord);
        coord.pause();
        assert_eq!(coord.state().status, TransportStatus::Paused);

        assert_eq!(coord.output().pauses, 1);
        coord.output.reject_play = true;
        assert!(!coord.resume());
        assert!(!coord.state().is_playing());
    }

    #[test]
    fn persists_and_restores_without_playing() {
        let store = MemoryStore::new();
        let queue = vec![track("a"), track("b")];
        {
            let mut coord =
                Coordinator::new(CoordinatorConfig::default(), FakeOutput::default(), store.clone());
            coord.play_track(queue[1].clone(), queue.clone(), 1);
            ready(&mut coord);
            coord.seek_to(42.0);
            coord.change_volume(0.3);
            coord.toggle_mute();
        }
        assert!(store.get(SESSION_KEY).unwrap().is_some());

        let mut coord =
            Coordinator::new(CoordinatorConfig::default(), FakeOutput::default(), store);
        assert!(coord.restore());
        assert_eq!(coord.state().current_track_id(), Some("b"));
        assert_eq!(coord.queue().len(), 2);
        assert_eq!(coord.current_index(), 1);
        assert_eq!(coord.state().volume, 0.3);
        assert!(coord.state().is_muted);
        assert_eq!(coord.state().status, TransportStatus::Idle);
        assert!(coord.output().loads.is_empty());
        assert_eq!(coord.output().plays, 0);

        assert_eq!(coord.state().current_time, 42.0);

        assert!(coord.resume());
        assert_eq!(coord.output().loads.len(), 1);
        assert_eq!(coord.output().seeks, vec![42.0]);
        assert_eq!(coord.state().current_time, 42.0);
    }

    #[test]
    fn nothing_is_persisted_without_a_track() {
        let store = MemoryStore::new();
        let mut coord =
            Coordinator::new(CoordinatorConfig::default(), FakeOutput::default(), store.clone());
        coord.change_volume(0.5);
        assert!(store.get(SESSION_KEY).unwrap().is_none());
        assert!(!coord.restore());
    }

    #[test]
    fn requests_offline_copy_of_played_url() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut coord = coordinator().with_cache_requests(tx);
        coord.play_track(track("a"), vec![], 0);

        assert_eq!(
            rx.try_recv().unwrap(),
            CacheRequest {
                track_id: "a".to_string(),
                track_name: "song a".to_string(),
                url: "https://cdn.test/a_320.mp4".to_string(),
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn auto_resume_is_off_by_default() {
        let output = FakeOutput {
            reject_play: true,
            ..FakeOutput::default()
        };
        let mut coord = Coordinator::new(CoordinatorConfig::default(), output, MemoryStore::new());
        coord.play_track(track("a"), vec![], 0);
        ready(&mut coord);
        coord.output.reject_play = false;

        let now = Instant::now();
        coord.tick(now);
        coord.tick(now + Duration::from_secs(5));
        assert_eq!(coord.output().plays, 0);
    }

    #[test]
    fn auto_resume_retries_after_delay_when_enabled() {
        let cfg = CoordinatorConfig {
            auto_resume_delay: Some(Duration::from_millis(100)),
            ..CoordinatorConfig::default()
        };
        let output = FakeOutput {
            reject_play: true,
            ..FakeOutput::default()
        };
        let mut coord = Coordinator::new(cfg, output, MemoryStore::new());
        coord.play_track(track("a"), vec![], 0);
        ready(&mut coord);
        assert_eq!(coord.state().status, TransportStatus::Paused);
        coord.output.reject_play = false;

        let now = Instant::now();
        coord.tick(now);
        coord.tick(now + Duration::from_millis(50));
        assert_eq!(coord.output().plays, 0);

        coord.tick(now + Duration::from_millis(100));
        assert_eq!(coord.output().plays, 1);
        assert!(coord.state().is_playing());

        coord.pause();
        coord.tick(now + Duration::from_secs(10));
        assert_eq!(coord.output().plays, 1);
    }

    #[test]
    fn stuck_load_times_out() {
        let cfg = CoordinatorConfig {
            load_timeout: Some(Duration::from_secs(10)),
            ..CoordinatorConfig::default()
        };
        let mut coord = Coordinator::new(cfg, FakeOutput::default(), MemoryStore::new());
        coord.play_track(track("a"), vec![], 0);
        let source = coord.source().unwrap();

        let now = Instant::now();
        coord.tick(now);
        coord.tick(now + Duration::from_secs(9));
        assert!(coord.state().is_loading());

        coord.tick(now + Duration::from_secs(10));
        assert_eq!(coord.state().status, TransportStatus::Error);
        coord.handle_media_event(source, MediaEvent::CanPlay);
        assert_eq!(coord.state().status, TransportStatus::Error);
    }
}
