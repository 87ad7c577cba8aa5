use crate::output::MediaEvent;
use belong_core::Track;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransportStatus {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Followup {
    None,
    Advance,
    LoadFailed(String),
    PositionChanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybackState {
    pub current_track: Option<Track>,
    pub status: TransportStatus,
    /// Playback was asked for and not cancelled since.
    pub play_requested: bool,
    pub current_time: f64,
    pub duration: f64,
    pub volume: f32,
    pub is_muted: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_track: None,
            status: TransportStatus::Idle,
            play_requested: false,
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
            is_muted: false,
        }
    }
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.status == TransportStatus::Playing
    }

    pub fn is_loading(&self) -> bool {
        self.status == TransportStatus::Loading
    }

    pub fn current_track_id(&self) -> Option<&str> {
        self.current_track.as_ref().map(|t| t.id.as_str())
    }

    pub fn effective_volume(&self) -> f32 {
        if self.is_muted {
            0.0
        } else {
            self.volume
        }
    }

    pub fn begin_load(&mut self, track: Track) {
        self.current_track = Some(track);
        self.status = TransportStatus::Loading;
        self.play_requested = false;
        self.current_time = 0.0;
        self.duration = 0.0;
    }

    /// Load or source resolution failed; the track stays for display.
    pub fn fail(&mut self) {
        self.status = TransportStatus::Error;
        self.play_requested = false;
    }

    pub fn apply(&mut self, event: &MediaEvent) -> Followup {
        match event {
            MediaEvent::LoadStart => {
                self.status = TransportStatus::Loading;
                Followup::None
            }
            MediaEvent::CanPlay => {
                self.settle_after_load();
                Followup::None
            }
            MediaEvent::LoadedMetadata { duration } => {
                if duration.is_finite() && *duration >= 0.0 {
                    self.duration = *duration;
                }
                self.settle_after_load();
                Followup::None
            }
            MediaEvent::TimeUpdate { position } => {
                if !position.is_finite() {
                    return Followup::None;
                }
                self.current_time = position.max(0.0);
                Followup::PositionChanged
            }
            MediaEvent::Play => {
                self.play_requested = true;
                self.status = TransportStatus::Playing;
                Followup::None
            }
            MediaEvent::Pause => {
                self.play_requested = false;
                if matches!(
                    self.status,
                    TransportStatus::Playing | TransportStatus::Loading
                ) {
                    self.status = TransportStatus::Paused;
                }
                Followup::None
            }
            MediaEvent::Ended => {
                self.play_requested = false;
                self.status = TransportStatus::Ended;
                if self.duration > 0.0 {
                    self.current_time = self.duration;
                }
                Followup::Advance
            }
            MediaEvent::Error { message } => {
                self.fail();
                Followup::LoadFailed(message.clone())
            }
        }
    }

    fn settle_after_load(&mut self) {
        if self.status != TransportStatus::Loading {
            return;
        }
        self.status = if self.play_requested {
            TransportStatus::Playing
        } else {
            TransportStatus::Paused
        };
    }
}
