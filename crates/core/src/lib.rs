pub mod config;
pub mod de;
pub mod model;
pub mod urls;

pub use config::{AppConfig, CatalogConfig, PlaybackConfig, StorageConfig};
pub use model::{
    AlbumRef, ArtistCredits, ArtistRef, LikedTrack, Lyrics, MediaLink, RecentTrack, Track,
    QUALITY_LADDER,
};
