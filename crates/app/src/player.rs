use crate::audio::RodioOutput;
use crate::offline::CacheWorker;
use anyhow::Result;
use belong_core::{AppConfig, Track};
use belong_engine::{Coordinator, CoordinatorConfig, PlayOutcome, TransportStatus};
use belong_storage::{build_cache, ContentCache, FileStore, LikedSongs, RecentlyPlayed};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const VOLUME_STEP: f32 = 0.1;

type Player = Coordinator<RodioOutput, FileStore>;

pub enum Start {
    Queue { tracks: Vec<Track>, index: usize },
    Restore,
}

pub struct PlayerPaths {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Toggle,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
    Mute,
    Seek(f64),
    Like,
    Info,
    Queue,
    Remove(usize),
    ClearQueue,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Option<PlayerCommand> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next()?;
    let arg = parts.next();
    let parsed = match (cmd, arg) {
        ("p", None) => PlayerCommand::Toggle,
        ("n", None) => PlayerCommand::Next,
        ("b", None) => PlayerCommand::Previous,
        ("+", None) => PlayerCommand::VolumeUp,
        ("-", None) => PlayerCommand::VolumeDown,
        ("m", None) => PlayerCommand::Mute,
        ("s", Some(secs)) => PlayerCommand::Seek(parse_position(secs)?),
        ("l", None) => PlayerCommand::Like,
        ("i", None) => PlayerCommand::Info,
        ("u", None) => PlayerCommand::Queue,
        // Positions are shown 1-based.
        ("r", Some(n)) => PlayerCommand::Remove(n.parse::<usize>().ok()?.checked_sub(1)?),
        ("c", None) => PlayerCommand::ClearQueue,
        ("h" | "?", None) => PlayerCommand::Help,
        ("q", None) => PlayerCommand::Quit,
        _ => return None,
    };
    parts.next().is_none().then_some(parsed)
}

/// Accepts plain seconds or `m:ss`.
fn parse_position(raw: &str) -> Option<f64> {
    let secs = match raw.split_once(':') {
        Some((m, s)) => m.parse::<u32>().ok()? as f64 * 60.0 + s.parse::<f64>().ok()?,
        None => raw.parse::<f64>().ok()?,
    };
    (secs.is_finite() && secs >= 0.0).then_some(secs)
}

pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

pub async fn run(cfg: &AppConfig, paths: &PlayerPaths, start: Start) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (cache_tx, cache_rx) = mpsc::unbounded_channel();
    let (payload_tx, payload_rx) = mpsc::unbounded_channel();

    let offline = cfg.storage.offline_cache;
    let output = RodioOutput::spawn(
        event_tx,
        offline.then(|| paths.cache_dir.clone()),
        offline.then_some(payload_tx),
    )?;
    let cache = build_cache(offline, Some(paths.cache_dir.clone()));
    info!(cache = cache.name(), "player started");
    let cache_worker = tokio::spawn(CacheWorker::new(cache).run(cache_rx, payload_rx));

    let store = FileStore::new(&paths.data_dir);
    let mut coord: Player = Coordinator::new(
        CoordinatorConfig::from_app_config(cfg),
        output,
        store.clone(),
    )
    .with_cache_requests(cache_tx);
    let mut liked = LikedSongs::new(store.clone());
    let mut recent = RecentlyPlayed::new(store);

    match start {
        Start::Queue { tracks, index } => {
            let Some(track) = tracks.get(index).cloned() else {
                println!("Nothing to play.");
                return Ok(());
            };
            report_outcome(coord.play_track(track, tracks, index));
        }
        Start::Restore => {
            if !coord.restore() {
                println!("No saved session to resume.");
                return Ok(());
            }
            if !coord.resume() {
                println!("Could not resume the saved session.");
            }
        }
    }
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ticker =
        tokio::time::interval(Duration::from_millis(cfg.playback.event_tick_ms.max(50)));
    let mut announced: Option<String> = None;

    loop {
        tokio::select! {
            Some((source, event)) = event_rx.recv() => {
                coord.handle_media_event(source, event);
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match parse_command(&line) {
                            Some(PlayerCommand::Quit) => break,
                            Some(cmd) => execute(cmd, &mut coord, &mut liked),
                            None => println!("Unknown command {:?}; h for help", line.trim()),
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed; playing until the queue ends");
                        stdin_open = false;
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to read stdin");
                        stdin_open = false;
                    }
                }
            }
            _ = ticker.tick() => coord.tick(Instant::now()),
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }

        announce_start(&coord, &mut announced, &mut recent);

        if !stdin_open && finished(&coord) {
            break;
        }
    }

    coord.pause();
    drop(coord);
    cache_worker.abort();
    Ok(())
}

fn finished(coord: &Player) -> bool {
    let state = coord.state();
    let last = coord.current_index() + 1 >= coord.queue().len();
    match state.status {
        TransportStatus::Ended => last,
        TransportStatus::Error | TransportStatus::Idle => true,
        _ => false,
    }
}

// Prints a track once and records it as recently played.
fn announce_start(
    coord: &Player,
    announced: &mut Option<String>,
    recent: &mut RecentlyPlayed<FileStore>,
) {
    let state = coord.state();
    if !state.is_playing() {
        return;
    }
    let Some(track) = state.current_track.as_ref() else {
        return;
    };
    if announced.as_deref() == Some(track.id.as_str()) {
        return;
    }
    *announced = Some(track.id.clone());
    recent.add_to_recently_played(track);
    println!(
        "Now playing: {} - {} [{}]",
        track.name,
        track.artist_line(),
        format_time(state.duration)
    );
}

fn execute(cmd: PlayerCommand, coord: &mut Player, liked: &mut LikedSongs<FileStore>) {
    match cmd {
        PlayerCommand::Toggle => {
            let state = coord.state();
            if state.is_playing() || (state.is_loading() && state.play_requested) {
                coord.pause();
                println!("Paused.");
            } else if !coord.resume() {
                println!("Could not start playback.");
            }
        }
        PlayerCommand::Next => match coord.play_next() {
            Some(outcome) => report_outcome(outcome),
            None => println!("Already at the end of the queue."),
        },
        PlayerCommand::Previous => match coord.play_previous() {
            Some(outcome) => report_outcome(outcome),
            None => println!("Already at the start of the queue."),
        },
        PlayerCommand::VolumeUp | PlayerCommand::VolumeDown => {
            let step = if cmd == PlayerCommand::VolumeUp {
                VOLUME_STEP
            } else {
                -VOLUME_STEP
            };
            coord.change_volume(coord.state().volume + step);
            println!("Volume {:.0}%", coord.state().volume * 100.0);
        }
        PlayerCommand::Mute => {
            coord.toggle_mute();
            println!("{}", if coord.state().is_muted { "Muted." } else { "Unmuted." });
        }
        PlayerCommand::Seek(seconds) => {
            coord.seek_to(seconds);
            println!("Position {}", format_time(coord.state().current_time));
        }
        PlayerCommand::Like => match coord.state().current_track.clone() {
            Some(track) => {
                let now_liked = liked.toggle_like(&track);
                println!(
                    "{} {}",
                    if now_liked { "Liked" } else { "Unliked" },
                    track.name
                );
            }
            None => println!("Nothing is playing."),
        },
        PlayerCommand::Info => print_info(coord, liked),
        PlayerCommand::Queue => print_queue(coord),
        PlayerCommand::Remove(index) => match coord.remove_from_queue(index) {
            Some(track) => println!("Removed {} from the queue.", track.name),
            None => println!("No queue entry {}.", index + 1),
        },
        PlayerCommand::ClearQueue => {
            coord.clear_queue();
            println!("Queue cleared.");
        }
        PlayerCommand::Help => print_help(),
        PlayerCommand::Quit => {}
    }
}

fn report_outcome(outcome: PlayOutcome) {
    match outcome {
        PlayOutcome::Started => {}
        PlayOutcome::Toggled { playing } => {
            println!("{}", if playing { "Resumed." } else { "Paused." })
        }
        PlayOutcome::Failed(err) => println!("Playback failed: {err}"),
    }
}

fn print_info(coord: &Player, liked: &mut LikedSongs<FileStore>) {
    let state = coord.state();
    let Some(track) = state.current_track.as_ref() else {
        println!("Nothing is playing.");
        return;
    };
    println!("{} - {}", track.name, track.artist_line());
    if let Some(album) = track.album_name() {
        println!("album: {album}");
    }
    println!(
        "status: {:?}  {} / {}",
        state.status,
        format_time(state.current_time),
        format_time(state.duration)
    );
    println!(
        "volume: {:.0}%{}",
        state.volume * 100.0,
        if state.is_muted { " (muted)" } else { "" }
    );
    println!("liked: {}", if liked.is_liked(&track.id) { "yes" } else { "no" });
    println!(
        "queue: {} of {}",
        coord.current_index() + 1,
        coord.queue().len()
    );
}

fn print_queue(coord: &Player) {
    if coord.queue().is_empty() {
        println!("Queue is empty.");
        return;
    }
    for (i, track) in coord.queue().iter().enumerate() {
        let marker = if i == coord.current_index() { ">" } else { " " };
        println!("{marker}{:>3}. {} - {}", i + 1, track.name, track.artist_line());
    }
}

fn print_help() {
    println!(
        "keys: p play/pause, n next, b previous, +/- volume, m mute, s <secs|m:ss> seek, \
         l like, i info, u queue, r <n> remove, c clear queue, h help, q quit"
    );
}
