use chrono::{DateTime, Datelike, Utc};
use crate::de::{lenient_string, lenient_u64, null_as_default};
use serde::{Deserialize, Serialize};

pub const QUALITY_LADDER: [usize; 5] = [4, 3, 2, 1, 0];

pub const UNKNOWN_SONG: &str = "Unknown Song";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_LANGUAGE: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MediaLink {
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ArtistRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ArtistCredits {
    #[serde(default)]
    pub primary: Vec<ArtistRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AlbumRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "title")]
    pub name: String,
    #[serde(default)]
    pub artists: ArtistCredits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<AlbumRef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: Vec<MediaLink>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub duration: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub download_url: Vec<Option<MediaLink>>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64", skip_serializing_if = "Option::is_none")]
    pub play_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<Lyrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Lyrics {
    #[serde(default)]
    pub lyrics: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub copyright: Option<String>,
}

impl Lyrics {
    pub fn text(&self) -> Option<String> {
        let raw = [self.lyrics.as_deref(), self.snippet.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())?;
        Some(strip_markup(raw).trim().to_string())
    }
}

fn strip_markup(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('>') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let tag = rest[open + 1..open + close].trim().to_ascii_lowercase();
        if tag == "br" || tag.starts_with("br ") || tag.starts_with("br/") {
            out.push('\n');
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

impl Track {
    fn link_at(&self, tier: usize) -> Option<&MediaLink> {
        self.download_url
            .get(tier)
            .and_then(Option::as_ref)
            .filter(|link| !link.url.trim().is_empty())
    }

    pub fn best_audio_url(&self) -> Option<&str> {
        QUALITY_LADDER
            .iter()
            .find_map(|&tier| self.link_at(tier))
            .map(|link| link.url.trim())
    }

    /// Link for `tier`, or the best tier below it when that one is missing.
    pub fn audio_link(&self, tier: usize) -> Option<(usize, &MediaLink)> {
        QUALITY_LADDER
            .iter()
            .filter(|&&t| t <= tier)
            .find_map(|&t| self.link_at(t).map(|link| (t, link)))
    }

    pub fn is_playable(&self) -> bool {
        self.best_audio_url().is_some()
    }

    pub fn artist_names(&self) -> Vec<&str> {
        self.artists
            .primary
            .iter()
            .map(|a| a.name.as_str())
            .filter(|n| !n.is_empty())
            .collect()
    }

    pub fn artist_line(&self) -> String {
        let names = self.artist_names();
        if names.is_empty() {
            UNKNOWN_ARTIST.to_string()
        } else {
            names.join(", ")
        }
    }

    pub fn album_name(&self) -> Option<&str> {
        self.album.as_ref().and_then(|a| a.name.as_deref())
    }

    pub fn best_image(&self) -> Option<&str> {
        self.image
            .iter()
            .rev()
            .map(|i| i.url.as_str())
            .find(|url| !url.is_empty())
    }

    /// Denormalized copy used by the liked and recently-played lists.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Track {
        let name = if self.name.trim().is_empty() {
            UNKNOWN_SONG.to_string()
        } else {
            self.name.clone()
        };
        let artists = if self.artist_names().is_empty() {
            ArtistCredits {
                primary: vec![ArtistRef {
                    id: None,
                    name: UNKNOWN_ARTIST.to_string(),
                }],
            }
        } else {
            self.artists.clone()
        };
        let album = match &self.album {
            Some(album) if album.name.as_deref().is_some_and(|n| !n.is_empty()) => album.clone(),
            _ => AlbumRef {
                id: None,
                name: Some(UNKNOWN_ALBUM.to_string()),
            },
        };

        Track {
            id: self.id.clone(),
            name,
            artists,
            album: Some(album),
            image: self.image.clone(),
            duration: Some(self.duration.unwrap_or(0)),
            download_url: self.download_url.clone(),
            year: Some(
                self.year
                    .clone()
                    .filter(|y| !y.is_empty())
                    .unwrap_or_else(|| now.year().to_string()),
            ),
            language: Some(
                self.language
                    .clone()
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string()),
            ),
            play_count: None,
            label: None,
            lyrics: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LikedTrack {
    #[serde(flatten)]
    pub track: Track,
    pub liked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecentTrack {
    #[serde(flatten)]
    pub track: Track,
    pub played_at: DateTime<Utc>,
}
