use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Songs,
    Albums,
    Artists,
    Playlists,
}

impl SearchKind {
    pub fn as_path(self) -> &'static str {
        match self {
            SearchKind::Songs => "songs",
            SearchKind::Albums => "albums",
            SearchKind::Artists => "artists",
            SearchKind::Playlists => "playlists",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

fn encode(part: &str) -> String {
    urlencoding::encode(part.trim()).into_owned()
}

fn base(root: &str) -> &str {
    root.trim_end_matches('/')
}

pub fn search_url(root: &str, kind: SearchKind, query: &str, page: u32, limit: u32) -> String {
    format!(
        "{}/api/search/{}?query={}&page={page}&limit={limit}",
        base(root),
        kind.as_path(),
        encode(query)
    )
}

pub fn song_url(root: &str, id: &str) -> String {
    format!("{}/api/songs/{}", base(root), encode(id))
}

pub fn song_lyrics_url(root: &str, id: &str) -> String {
    format!("{}?lyrics=true", song_url(root, id))
}

pub fn suggestions_url(root: &str, id: &str, limit: u32) -> String {
    format!(
        "{}/api/songs/{}/suggestions?limit={limit}",
        base(root),
        encode(id)
    )
}

pub fn album_url(root: &str, id: &str) -> String {
    format!("{}/api/albums/{}", base(root), encode(id))
}

pub fn artist_url(root: &str, id: &str) -> String {
    format!("{}/api/artists/{}", base(root), encode(id))
}

pub fn playlist_url(root: &str, id: &str) -> String {
    format!("{}/api/playlists/{}", base(root), encode(id))
}
