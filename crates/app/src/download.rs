use crate::audio::DOWNLOAD_TIMEOUT;
use anyhow::{anyhow, Context, Result};
use belong_core::Track;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct Downloaded {
    pub path: PathBuf,
    pub tier: usize,
    pub bytes: usize,
}

/// Saves the requested quality tier, or the best one below it, into `dir`.
pub async fn save_track(track: &Track, tier: usize, dir: &Path) -> Result<Downloaded> {
    let (tier, link) = track
        .audio_link(tier)
        .ok_or_else(|| anyhow!("{} has no downloadable audio", track.name))?;
    let url = link.url.trim();

    let http = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .context("failed to build download client")?;
    let bytes = http
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .with_context(|| format!("failed to fetch {url}"))?
        .bytes()
        .await
        .with_context(|| format!("failed to read audio from {url}"))?;

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(file_name(track, &link.quality, url));
    let tmp = path.with_extension("part");
    tokio::fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, &path)
        .await
        .with_context(|| format!("failed to move {} into place", tmp.display()))?;

    info!(track_id = %track.id, tier, bytes = bytes.len(), path = %path.display(), "downloaded song");
    Ok(Downloaded {
        path,
        tier,
        bytes: bytes.len(),
    })
}

fn file_name(track: &Track, quality: &str, url: &str) -> String {
    let title = format!("{} - {}", track.artist_line(), track.name);
    let mut name = sanitize(&title);
    if name.is_empty() {
        name = sanitize(&track.id);
    }
    if name.is_empty() {
        name = "song".to_string();
    }
    let quality = sanitize(quality);
    if !quality.is_empty() {
        name = format!("{name} ({quality})");
    }
    format!("{name}.{}", extension(url))
}

fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    cleaned.trim().trim_matches('.').trim().to_string()
}

fn extension(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or(path);
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext
        }
        _ => "mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::{extension, file_name, sanitize};
    use belong_core::{ArtistCredits, ArtistRef, Track};

    #[test]
    fn extensions_come_from_the_url_path() {
        assert_eq!(extension("https://cdn.test/a/song_320.mp4"), "mp4");
        assert_eq!(extension("https://cdn.test/song.m4a?token=x.y"), "m4a");
        assert_eq!(extension("https://cdn.test/stream"), "mp4");
        assert_eq!(extension("https://cdn.test.example/"), "mp4");
        assert_eq!(extension("https://cdn.test/.hidden"), "mp4");
    }

    #[test]
    fn file_names_are_safe() {
        assert_eq!(sanitize("AC/DC: Back?"), "AC_DC_ Back_");
        assert_eq!(sanitize(" ..name.. "), "name");

        let track = Track {
            id: "x1".to_string(),
            name: "Night/Day".to_string(),
            artists: ArtistCredits {
                primary: vec![ArtistRef {
                    name: "Duo".to_string(),
                    ..ArtistRef::default()
                }],
            },
            ..Track::default()
        };
        assert_eq!(
            file_name(&track, "320kbps", "https://cdn.test/s.mp4"),
            "Duo - Night_Day (320kbps).mp4"
        );
    }
}
