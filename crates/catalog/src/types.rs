use belong_core::de::{lenient_string, lenient_u64, null_as_default};
use belong_core::{ArtistCredits, MediaLink, Track};
use serde::Deserialize;

/// `{ success, data, message }` wrapper around every response.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct SearchPage<T> {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub start: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AlbumSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub year: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub artists: ArtistCredits,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: Vec<MediaLink>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArtistSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: Vec<MediaLink>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub song_count: Option<u64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: Vec<MediaLink>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub year: Option<String>,
    #[serde(default)]
    pub artists: ArtistCredits,
    #[serde(default, deserialize_with = "null_as_default")]
    pub songs: Vec<Track>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub follower_count: Option<u64>,
    #[serde(default)]
    pub dominant_language: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub top_songs: Vec<Track>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub top_albums: Vec<AlbumSummary>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub song_count: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub songs: Vec<Track>,
}
