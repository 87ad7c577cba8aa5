use std::fmt;
use thiserror::Error;

/// Identifies one `load` issued to the output. Events carry the id of the
/// load they belong to so superseded loads can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    LoadStart,
    CanPlay,
    LoadedMetadata { duration: f64 },
    TimeUpdate { position: f64 },
    Play,
    Pause,
    Ended,
    Error { message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("playback was not allowed to start")]
    AutoplayRejected,
    #[error("failed to load media: {0}")]
    Load(String),
    #[error("audio output is gone")]
    Disconnected,
}

/// The single audio resource driven by the coordinator.
pub trait MediaOutput {
    fn enable_background_playback(&mut self) {}
    fn load(&mut self, source: SourceId, url: &str) -> Result<(), MediaError>;
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self);
    fn seek(&mut self, seconds: f64) -> Result<(), MediaError>;
    fn set_volume(&mut self, volume: f32);
}
