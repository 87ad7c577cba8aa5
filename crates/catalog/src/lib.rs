use anyhow::{anyhow, Context, Result};
use belong_core::urls::{self, SearchKind};
use belong_core::{CatalogConfig, Track};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub mod types;

pub use types::{
    Album, AlbumSummary, Artist, ArtistSummary, Envelope, Playlist, PlaylistSummary, SearchPage,
};

#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    page_size: u32,
}

impl CatalogClient {
    pub fn new(cfg: &CatalogConfig) -> Result<Self> {
        let base = Url::parse(&cfg.base_url)
            .with_context(|| format!("invalid catalog base url {:?}", cfg.base_url))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(anyhow!("catalog base url must be http(s), got {base}"));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .user_agent(concat!("belong/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")?;
        Ok(Self::with_client(http, cfg))
    }

    pub fn with_client(http: reqwest::Client, cfg: &CatalogConfig) -> Self {
        Self {
            http,
            base_url: cfg.base_url.clone(),
            page_size: cfg.page_size.max(1),
        }
    }

    pub async fn search_songs(&self, query: &str, page: u32) -> Result<SearchPage<Track>> {
        self.search(SearchKind::Songs, query, page).await
    }

    pub async fn search_albums(&self, query: &str, page: u32) -> Result<SearchPage<AlbumSummary>> {
        self.search(SearchKind::Albums, query, page).await
    }

    pub async fn search_artists(
        &self,
        query: &str,
        page: u32,
    ) -> Result<SearchPage<ArtistSummary>> {
        self.search(SearchKind::Artists, query, page).await
    }

    pub async fn search_playlists(
        &self,
        query: &str,
        page: u32,
    ) -> Result<SearchPage<PlaylistSummary>> {
        self.search(SearchKind::Playlists, query, page).await
    }

    pub async fn song(&self, id: &str) -> Result<Option<Track>> {
        self.first_song(&urls::song_url(&self.base_url, id)).await
    }

    /// Like [`Self::song`], with `lyrics` filled in when the catalog has them.
    pub async fn song_with_lyrics(&self, id: &str) -> Result<Option<Track>> {
        self.first_song(&urls::song_lyrics_url(&self.base_url, id)).await
    }

    async fn first_song(&self, url: &str) -> Result<Option<Track>> {
        let songs: Vec<Track> = self.get(url).await?.unwrap_or_default();
        Ok(songs.into_iter().next())
    }

    pub async fn suggestions(&self, id: &str, limit: u32) -> Result<Vec<Track>> {
        Ok(self
            .get(&urls::suggestions_url(&self.base_url, id, limit))
            .await?
            .unwrap_or_default())
    }

    pub async fn album(&self, id: &str) -> Result<Option<Album>> {
        self.get(&urls::album_url(&self.base_url, id)).await
    }

    pub async fn artist(&self, id: &str) -> Result<Option<Artist>> {
        self.get(&urls::artist_url(&self.base_url, id)).await
    }

    pub async fn playlist(&self, id: &str) -> Result<Option<Playlist>> {
        self.get(&urls::playlist_url(&self.base_url, id)).await
    }

    async fn search<T: DeserializeOwned>(
        &self,
        kind: SearchKind,
        query: &str,
        page: u32,
    ) -> Result<SearchPage<T>> {
        let url = urls::search_url(&self.base_url, kind, query, page.max(1), self.page_size);
        Ok(self.get(&url).await?.unwrap_or_else(SearchPage::empty))
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        debug!(url, "catalog request");
        let body = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("catalog returned an error for {url}"))?
            .text()
            .await
            .with_context(|| format!("failed to read response from {url}"))?;
        parse_envelope(&body).with_context(|| format!("unexpected response from {url}"))
    }
}

impl<T> SearchPage<T> {
    pub fn empty() -> Self {
        Self {
            total: Some(0),
            start: None,
            results: Vec::new(),
        }
    }
}

/// Unwraps the response envelope; `Ok(None)` means the catalog had no data.
pub fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<Option<T>> {
    let envelope: Envelope<T> = serde_json::from_str(body)?;
    if !envelope.success {
        return Err(anyhow!(
            "catalog reported failure: {}",
            envelope.message.unwrap_or_else(|| "no message".to_string())
        ));
    }
    Ok(envelope.data)
}
