use anyhow::{anyhow, Context, Result};
use belong_catalog::CatalogClient;
use belong_core::urls::SearchKind;
use belong_core::{AppConfig, Track};
use belong_storage::{
    FileStore, KeyValueStore, LikedSongs, RecentlyPlayed, SessionStore, RECENT_CAPACITY,
};
use clap::{Parser, Subcommand, ValueEnum};
use player::{format_time, PlayerPaths, Start};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

mod audio;
mod download;
mod offline;
mod player;

#[derive(Parser, Debug)]
#[command(
    name = "belong",
    about = "Stream songs from the catalog with a persistent queue"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search for songs and play the results as a queue.
    Play {
        query: Vec<String>,
        /// Play a song by catalog id, followed by its suggestions.
        #[arg(long, conflicts_with = "query")]
        id: Option<String>,
    },
    /// Pick up the last saved session.
    Resume,
    Search {
        query: Vec<String>,
        #[arg(long, value_enum, default_value_t = Kind::Songs)]
        kind: Kind,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Show {
        #[command(subcommand)]
        item: ShowItem,
    },
    Suggest {
        id: String,
    },
    /// Save a song's audio to disk.
    Download {
        id: String,
        /// Bitrate tier from 0 (lowest) to 4 (highest); falls back to lower tiers.
        #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(0..=4))]
        quality: u8,
        /// Directory to write into; defaults to the current one.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Liked {
        #[command(subcommand)]
        action: Option<ListAction>,
    },
    Recent {
        #[command(subcommand)]
        action: Option<RecentAction>,
    },
    Status,
    Doctor,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Songs,
    Albums,
    Artists,
    Playlists,
}

impl From<Kind> for SearchKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Songs => SearchKind::Songs,
            Kind::Albums => SearchKind::Albums,
            Kind::Artists => SearchKind::Artists,
            Kind::Playlists => SearchKind::Playlists,
        }
    }
}

#[derive(Subcommand, Debug)]
enum ShowItem {
    Song { id: String },
    Album { id: String },
    Artist { id: String },
    Playlist { id: String },
}

#[derive(Subcommand, Debug)]
enum ListAction {
    List,
    /// Like or unlike a song by catalog id.
    Toggle { id: String },
    Clear,
}

#[derive(Subcommand, Debug)]
enum RecentAction {
    List,
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Resume);
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    if let Commands::Config {
        action: ConfigAction::Init,
    } = cmd
    {
        init_config(&cfg_path)?;
        println!("Initialized config at {}", cfg_path.display());
        return Ok(());
    }

    let cfg = load_or_default(&cfg_path)?;
    init_logging(&cfg.log_level);
    let paths = resolve_paths(&cfg);
    let store = FileStore::new(&paths.data_dir);

    match cmd {
        Commands::Play { query, id } => {
            let catalog = CatalogClient::new(&cfg.catalog)?;
            let (tracks, index) = match id {
                Some(id) => queue_from_song(&catalog, &id, cfg.catalog.suggestion_limit).await?,
                None => queue_from_search(&catalog, &join_query(&query)?).await?,
            };
            player::run(&cfg, &paths, Start::Queue { tracks, index }).await
        }
        Commands::Resume => player::run(&cfg, &paths, Start::Restore).await,
        Commands::Search { query, kind, page } => {
            let catalog = CatalogClient::new(&cfg.catalog)?;
            search(&catalog, &join_query(&query)?, kind.into(), page).await
        }
        Commands::Show { item } => {
            let catalog = CatalogClient::new(&cfg.catalog)?;
            show(&catalog, item).await
        }
        Commands::Suggest { id } => {
            let catalog = CatalogClient::new(&cfg.catalog)?;
            let tracks = catalog
                .suggestions(&id, cfg.catalog.suggestion_limit)
                .await?;
            if tracks.is_empty() {
                println!("No suggestions for {id}.");
            }
            print_tracks(&tracks);
            Ok(())
        }
        Commands::Download {
            id,
            quality,
            output,
        } => {
            let catalog = CatalogClient::new(&cfg.catalog)?;
            let track = catalog
                .song(&id)
                .await?
                .ok_or_else(|| anyhow!("song {id} not found"))?;
            let dir = output.unwrap_or_else(|| PathBuf::from("."));
            let saved = download::save_track(&track, quality as usize, &dir).await?;
            if saved.tier != quality as usize {
                println!("Quality {quality} unavailable; used {}.", saved.tier);
            }
            println!("Saved {} ({} bytes)", saved.path.display(), saved.bytes);
            Ok(())
        }
        Commands::Liked { action } => {
            liked(&cfg, store, action.unwrap_or(ListAction::List)).await
        }
        Commands::Recent { action } => {
            let mut recent = RecentlyPlayed::new(store);
            match action.unwrap_or(RecentAction::List) {
                RecentAction::List => {
                    let entries = recent.recent();
                    if entries.is_empty() {
                        println!("Nothing played yet.");
                    }
                    for (i, entry) in entries.iter().enumerate() {
                        println!(
                            "{:>3}. {} - {}  ({})",
                            i + 1,
                            entry.track.name,
                            entry.track.artist_line(),
                            entry.played_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
                RecentAction::Clear => {
                    recent.clear();
                    println!("Recently played cleared.");
                }
            }
            Ok(())
        }
        Commands::Status => status(store),
        Commands::Doctor => doctor(&cfg, &paths).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn join_query(words: &[String]) -> Result<String> {
    let query = words.join(" ");
    let query = query.trim();
    if query.is_empty() {
        return Err(anyhow!("a search query is required"));
    }
    Ok(query.to_string())
}

async fn queue_from_search(catalog: &CatalogClient, query: &str) -> Result<(Vec<Track>, usize)> {
    let page = catalog.search_songs(query, 1).await?;
    let tracks: Vec<Track> = page
        .results
        .into_iter()
        .filter(Track::is_playable)
        .collect();
    if tracks.is_empty() {
        return Err(anyhow!("no playable songs found for {query:?}"));
    }
    info!(query, results = tracks.len(), "queued search results");
    Ok((tracks, 0))
}

async fn queue_from_song(
    catalog: &CatalogClient,
    id: &str,
    suggestion_limit: u32,
) -> Result<(Vec<Track>, usize)> {
    let track = catalog
        .song(id)
        .await?
        .ok_or_else(|| anyhow!("song {id} not found"))?;
    let suggestions = match catalog.suggestions(id, suggestion_limit).await {
        Ok(tracks) => tracks,
        Err(err) => {
            warn!(error = %err, track_id = id, "failed to fetch suggestions; playing the song alone");
            Vec::new()
        }
    };
    let mut queue = vec![track];
    queue.extend(
        suggestions
            .into_iter()
            .filter(|t| t.is_playable() && t.id != id),
    );
    Ok((queue, 0))
}

async fn search(catalog: &CatalogClient, query: &str, kind: SearchKind, page: u32) -> Result<()> {
    match kind {
        SearchKind::Songs => print_tracks(&catalog.search_songs(query, page).await?.results),
        SearchKind::Albums => {
            for album in catalog.search_albums(query, page).await?.results {
                println!(
                    "{}  {} - {} ({})",
                    album.id,
                    album.name,
                    artist_names(&album.artists),
                    album.year.as_deref().unwrap_or("?")
                );
            }
        }
        SearchKind::Artists => {
            for artist in catalog.search_artists(query, page).await?.results {
                println!(
                    "{}  {}{}",
                    artist.id,
                    artist.name,
                    artist
                        .role
                        .map(|role| format!(" ({role})"))
                        .unwrap_or_default()
                );
            }
        }
        SearchKind::Playlists => {
            for playlist in catalog.search_playlists(query, page).await?.results {
                println!(
                    "{}  {} [{} songs]",
                    playlist.id,
                    playlist.name,
                    playlist.song_count.unwrap_or(0)
                );
            }
        }
    }
    Ok(())
}

async fn show(catalog: &CatalogClient, item: ShowItem) -> Result<()> {
    match item {
        ShowItem::Song { id } => {
            let track = catalog
                .song_with_lyrics(&id)
                .await?
                .ok_or_else(|| anyhow!("song {id} not found"))?;
            println!("{} - {}", track.name, track.artist_line());
            if let Some(album) = track.album_name() {
                println!("album: {album}");
            }
            if let Some(year) = &track.year {
                println!("year: {year}");
            }
            if let Some(language) = &track.language {
                println!("language: {language}");
            }
            println!(
                "duration: {}",
                format_time(track.duration.unwrap_or(0) as f64)
            );
            println!(
                "playable: {}",
                if track.is_playable() { "yes" } else { "no" }
            );
            if let Some(lyrics) = &track.lyrics {
                if let Some(text) = lyrics.text() {
                    println!("\n{text}");
                }
                if let Some(copyright) = lyrics.copyright.as_deref().filter(|c| !c.trim().is_empty()) {
                    println!("\n\u{a9} {}", copyright.trim());
                }
            }
        }
        ShowItem::Album { id } => {
            let album = catalog
                .album(&id)
                .await?
                .ok_or_else(|| anyhow!("album {id} not found"))?;
            println!(
                "{} - {} ({})",
                album.name,
                artist_names(&album.artists),
                album.year.as_deref().unwrap_or("?")
            );
            print_tracks(&album.songs);
        }
        ShowItem::Artist { id } => {
            let artist = catalog
                .artist(&id)
                .await?
                .ok_or_else(|| anyhow!("artist {id} not found"))?;
            println!("{}", artist.name);
            if let Some(followers) = artist.follower_count {
                println!("followers: {followers}");
            }
            println!("top songs:");
            print_tracks(&artist.top_songs);
            if !artist.top_albums.is_empty() {
                println!("top albums:");
                for album in &artist.top_albums {
                    println!("  {}  {}", album.id, album.name);
                }
            }
        }
        ShowItem::Playlist { id } => {
            let playlist = catalog
                .playlist(&id)
                .await?
                .ok_or_else(|| anyhow!("playlist {id} not found"))?;
            println!("{}", playlist.name);
            if let Some(description) = playlist.description.as_deref().filter(|d| !d.is_empty()) {
                println!("{description}");
            }
            print_tracks(&playlist.songs);
        }
    }
    Ok(())
}

async fn liked(cfg: &AppConfig, store: FileStore, action: ListAction) -> Result<()> {
    let mut liked = LikedSongs::new(store);
    match action {
        ListAction::List => {
            let entries = liked.liked();
            if entries.is_empty() {
                println!("No liked songs yet.");
            }
            for entry in entries {
                println!(
                    "{}  {} - {}  (liked {})",
                    entry.track.id,
                    entry.track.name,
                    entry.track.artist_line(),
                    entry.liked_at.format("%Y-%m-%d")
                );
            }
        }
        ListAction::Toggle { id } => {
            // Unliking works offline; liking needs the song's details.
            if liked.remove_liked(&id) {
                println!("Unliked {id}.");
                return Ok(());
            }
            let catalog = CatalogClient::new(&cfg.catalog)?;
            let track = catalog
                .song(&id)
                .await?
                .ok_or_else(|| anyhow!("song {id} not found"))?;
            if liked.toggle_like(&track) {
                println!("Liked {} - {}.", track.name, track.artist_line());
            }
        }
        ListAction::Clear => {
            liked.clear();
            println!("Liked songs cleared.");
        }
    }
    Ok(())
}

fn status(store: FileStore) -> Result<()> {
    let Some(session) = SessionStore::new(store).load() else {
        println!("session: <none>");
        return Ok(());
    };
    let track = &session.current_track;
    println!("track: {} - {}", track.name, track.artist_line());
    println!("position: {}", format_time(session.current_time));
    println!(
        "queue: {} of {}",
        session.current_index + 1,
        session.queue.len()
    );
    println!(
        "volume: {:.0}%{}",
        session.volume * 100.0,
        if session.is_muted { " (muted)" } else { "" }
    );
    Ok(())
}

async fn doctor(cfg: &AppConfig, paths: &PlayerPaths) -> Result<()> {
    println!("== belong doctor ==");

    match CatalogClient::new(&cfg.catalog) {
        Ok(catalog) => {
            let reached = tokio::time::timeout(
                Duration::from_millis(cfg.catalog.timeout_ms.max(1_000)),
                catalog.search_songs("test", 1),
            )
            .await;
            match reached {
                Ok(Ok(_)) => println!("Catalog {}: reachable", cfg.catalog.base_url),
                Ok(Err(err)) => println!("Catalog {}: error: {err:#}", cfg.catalog.base_url),
                Err(_) => println!("Catalog {}: timed out", cfg.catalog.base_url),
            }
        }
        Err(err) => println!("Catalog: misconfigured: {err:#}"),
    }

    let store = FileStore::new(&paths.data_dir);
    let check_key = "doctorCheck";
    let writable = store
        .set(check_key, "{}")
        .and_then(|()| store.remove(check_key));
    match writable {
        Ok(()) => println!("Data dir {}: writable", paths.data_dir.display()),
        Err(err) => println!("Data dir {}: {err}", paths.data_dir.display()),
    }

    if cfg.storage.offline_cache {
        let entries = std::fs::read_dir(&paths.cache_dir)
            .map(|dir| {
                dir.filter_map(Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "audio"))
                    .count()
            })
            .unwrap_or(0);
        println!(
            "Offline cache {}: {entries} songs",
            paths.cache_dir.display()
        );
    } else {
        println!("Offline cache: disabled");
    }

    let audio = tokio::task::spawn_blocking(|| {
        rodio::OutputStreamBuilder::open_default_stream().map(|mut stream| stream.log_on_drop(false))
    })
    .await
    .context("audio check panicked")?;
    match audio {
        Ok(()) => println!("Audio output: available"),
        Err(err) => println!("Audio output: unavailable ({err})"),
    }

    println!("Recently played keeps the last {RECENT_CAPACITY} songs");
    Ok(())
}

fn print_tracks(tracks: &[Track]) {
    for (i, track) in tracks.iter().enumerate() {
        println!(
            "{:>3}. {}  {} - {} [{}]{}",
            i + 1,
            track.id,
            track.name,
            track.artist_line(),
            format_time(track.duration.unwrap_or(0) as f64),
            if track.is_playable() { "" } else { " (unavailable)" }
        );
    }
}

fn artist_names(credits: &belong_core::ArtistCredits) -> String {
    let names: Vec<&str> = credits.primary.iter().map(|a| a.name.as_str()).collect();
    if names.is_empty() {
        belong_core::model::UNKNOWN_ARTIST.to_string()
    } else {
        names.join(", ")
    }
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("belong").join("config.toml")
}

fn resolve_paths(cfg: &AppConfig) -> PlayerPaths {
    let data_dir = cfg.storage.data_dir.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("belong")
    });
    let cache_dir = cfg.storage.cache_dir.clone().unwrap_or_else(|| {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("belong")
            .join("audio")
    });
    PlayerPaths {
        data_dir,
        cache_dir,
    }
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let cfg = AppConfig::default();
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        parse_config(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

fn parse_config(data: &str) -> Result<AppConfig> {
    Ok(toml::from_str(data)?)
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Logs go to stderr so they never interleave with command output.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();
}

fn apply_env_overrides(cfg: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("BELONG_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.log_level = v;
        }
    }
    if let Some(v) = var("BELONG_CATALOG_URL") {
        if !v.trim().is_empty() {
            cfg.catalog.base_url = v.trim().trim_end_matches('/').to_string();
        }
    }
    if let Some(v) = var("BELONG_OFFLINE_CACHE") {
        if let Ok(parsed) = v.trim().parse::<bool>() {
            cfg.storage.offline_cache = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_env_overrides, join_query, parse_config, Cli, Commands};
    use belong_core::AppConfig;
    use clap::Parser;
    use std::collections::HashMap;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg = parse_config(
            r#"
log_level = "debug"

[playback]
auto_resume = true
"#,
        )
        .unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert!(cfg.playback.auto_resume);
        assert_eq!(cfg.playback.auto_resume_delay_ms, 100);
        assert_eq!(cfg.catalog.page_size, 20);
        assert!(cfg.storage.offline_cache);
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&AppConfig::default()).unwrap();
        let cfg = parse_config(&text).unwrap();
        assert_eq!(cfg.schema_version, 1);
        assert_eq!(cfg.playback.load_timeout_ms, 30_000);
    }

    #[test]
    fn env_overrides_apply_and_ignore_junk() {
        let vars: HashMap<&str, &str> = [
            ("BELONG_LOG_LEVEL", "warn"),
            ("BELONG_CATALOG_URL", " https://catalog.test/ "),
            ("BELONG_OFFLINE_CACHE", "maybe"),
        ]
        .into_iter()
        .collect();
        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, |k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.log_level, "warn");
        assert_eq!(cfg.catalog.base_url, "https://catalog.test");
        assert!(cfg.storage.offline_cache);

        apply_env_overrides(&mut cfg, |k| {
            (k == "BELONG_OFFLINE_CACHE").then(|| "false".to_string())
        });
        assert!(!cfg.storage.offline_cache);
    }

    #[test]
    fn cli_parses_play_variants() {
        assert!(Cli::try_parse_from(["belong", "play", "lofi", "beats"]).is_ok());
        assert!(Cli::try_parse_from(["belong", "play", "--id", "abc"]).is_ok());
        assert!(Cli::try_parse_from(["belong", "play", "x", "--id", "abc"]).is_err());
        assert!(Cli::try_parse_from(["belong", "search", "x", "--kind", "albums"]).is_ok());
        assert!(Cli::try_parse_from(["belong", "liked", "toggle", "abc"]).is_ok());
    }

    #[test]
    fn cli_parses_download_quality() {
        let cli = Cli::try_parse_from(["belong", "download", "abc"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Download { quality: 4, output: None, .. })
        ));
        let cli =
            Cli::try_parse_from(["belong", "download", "abc", "--quality", "1", "--output", "/tmp"])
                .unwrap();
        assert!(matches!(cli.command, Some(Commands::Download { quality: 1, .. })));
        assert!(Cli::try_parse_from(["belong", "download", "abc", "--quality", "5"]).is_err());
        assert!(Cli::try_parse_from(["belong", "download"]).is_err());
    }

    #[test]
    fn empty_queries_are_rejected() {
        assert!(join_query(&[]).is_err());
        assert!(join_query(&["  ".to_string()]).is_err());
        assert_eq!(join_query(&["a".into(), "b".into()]).unwrap(), "a b");
    }
}
