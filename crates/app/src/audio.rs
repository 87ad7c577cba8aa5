use crate::offline::PayloadSender;
use anyhow::{anyhow, Context, Result};
use belong_engine::{MediaError, MediaEvent, MediaOutput, SourceId};
use belong_storage::entry_path;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};

const POSITION_TICK: Duration = Duration::from_millis(250);
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

pub type EventSender = UnboundedSender<(SourceId, MediaEvent)>;

#[derive(Debug)]
enum AudioCmd {
    Load { source: SourceId, url: String },
    Play,
    Pause,
    Seek(f64),
    Volume(f32),
    Quit,
}

pub struct RodioOutput {
    tx: Sender<AudioCmd>,
    join: Option<JoinHandle<()>>,
}

impl RodioOutput {
    pub fn spawn(
        events: EventSender,
        cache_dir: Option<PathBuf>,
        payloads: Option<PayloadSender>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<AudioCmd>();
        let join = thread::Builder::new()
            .name("belong-audio".to_string())
            .spawn(move || AudioThread::new(events, cache_dir, payloads).run(rx))
            .context("failed to spawn audio thread")?;
        Ok(Self {
            tx,
            join: Some(join),
        })
    }

    fn send(&self, cmd: AudioCmd) -> Result<(), MediaError> {
        self.tx.send(cmd).map_err(|_| MediaError::Disconnected)
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        let _ = self.tx.send(AudioCmd::Quit);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

impl MediaOutput for RodioOutput {
    fn load(&mut self, source: SourceId, url: &str) -> Result<(), MediaError> {
        self.send(AudioCmd::Load {
            source,
            url: url.to_string(),
        })
    }

    fn play(&mut self) -> Result<(), MediaError> {
        self.send(AudioCmd::Play)
    }

    fn pause(&mut self) {
        if self.send(AudioCmd::Pause).is_err() {
            warn!("audio thread is gone; pause dropped");
        }
    }

    fn seek(&mut self, seconds: f64) -> Result<(), MediaError> {
        self.send(AudioCmd::Seek(seconds))
    }

    fn set_volume(&mut self, volume: f32) {
        if self.send(AudioCmd::Volume(volume)).is_err() {
            warn!("audio thread is gone; volume change dropped");
        }
    }
}

struct Loaded {
    source: SourceId,
    payload: Arc<[u8]>,
    sink: Sink,
    offset: Duration,
    ended: bool,
}

struct AudioThread {
    events: EventSender,
    cache_dir: Option<PathBuf>,
    payloads: Option<PayloadSender>,
    http: Option<reqwest::blocking::Client>,
    volume: f32,
    current: Option<Loaded>,
}

impl AudioThread {
    fn new(
        events: EventSender,
        cache_dir: Option<PathBuf>,
        payloads: Option<PayloadSender>,
    ) -> Self {
        let http = match reqwest::blocking::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
        {
            Ok(client) => Some(client),
            Err(err) => {
                error!(error = %err, "failed to build download client; only cached songs will play");
                None
            }
        };
        Self {
            events,
            cache_dir,
            payloads,
            http,
            volume: 1.0,
            current: None,
        }
    }

    fn run(mut self, rx: Receiver<AudioCmd>) {
        let stream = match OutputStreamBuilder::open_default_stream() {
            Ok(mut stream) => {
                // rodio otherwise prints to stderr when the stream is dropped.
                stream.log_on_drop(false);
                Some(stream)
            }
            Err(err) => {
                error!(error = %err, "no audio output device");
                None
            }
        };

        loop {
            match rx.recv_timeout(POSITION_TICK) {
                Ok(AudioCmd::Load { source, url }) => self.load(stream.as_ref(), source, &url),
                Ok(AudioCmd::Play) => {
                    if let Some(cur) = &self.current {
                        cur.sink.play();
                        self.emit(cur.source, MediaEvent::Play);
                    }
                }
                Ok(AudioCmd::Pause) => {
                    if let Some(cur) = &self.current {
                        cur.sink.pause();
                        self.emit(cur.source, MediaEvent::Pause);
                    }
                }
                Ok(AudioCmd::Seek(seconds)) => self.seek(stream.as_ref(), seconds),
                Ok(AudioCmd::Volume(volume)) => {
                    self.volume = volume;
                    if let Some(cur) = &self.current {
                        cur.sink.set_volume(volume);
                    }
                }
                Ok(AudioCmd::Quit) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => self.report_progress(),
            }
        }

        if let Some(cur) = self.current.take() {
            cur.sink.stop();
        }
        debug!("audio thread stopped");
    }

    fn emit(&self, source: SourceId, event: MediaEvent) {
        let _ = self.events.send((source, event));
    }

    fn load(&mut self, stream: Option<&OutputStream>, source: SourceId, url: &str) {
        if let Some(old) = self.current.take() {
            old.sink.stop();
        }
        self.emit(source, MediaEvent::LoadStart);

        let opened = self
            .fetch(url)
            .and_then(|payload| {
                let (sink, duration) = build_sink(stream, &payload, Duration::ZERO, self.volume)?;
                Ok((payload, sink, duration))
            });

        match opened {
            Ok((payload, sink, duration)) => {
                if let Some(duration) = duration {
                    self.emit(
                        source,
                        MediaEvent::LoadedMetadata {
                            duration: duration.as_secs_f64(),
                        },
                    );
                }
                self.emit(source, MediaEvent::CanPlay);
                self.current = Some(Loaded {
                    source,
                    payload,
                    sink,
                    offset: Duration::ZERO,
                    ended: false,
                });
            }
            Err(err) => {
                warn!(error = %err, %source, "failed to open audio");
                self.emit(
                    source,
                    MediaEvent::Error {
                        message: format!("{err:#}"),
                    },
                );
            }
        }
    }

    fn fetch(&self, url: &str) -> Result<Arc<[u8]>> {
        if let Some(dir) = &self.cache_dir {
            let path = entry_path(dir, url);
            if let Ok(bytes) = std::fs::read(&path) {
                debug!(path = %path.display(), "playing from offline cache");
                return Ok(bytes.into());
            }
        }

        let http = self
            .http
            .as_ref()
            .ok_or_else(|| anyhow!("song is not cached and downloads are unavailable"))?;
        let bytes = http
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("failed to fetch {url}"))?
            .bytes()
            .with_context(|| format!("failed to read audio from {url}"))?;
        let payload: Arc<[u8]> = Arc::from(bytes.as_ref());
        if let Some(tx) = &self.payloads {
            let _ = tx.send((url.to_string(), Arc::clone(&payload)));
        }
        Ok(payload)
    }

    fn seek(&mut self, stream: Option<&OutputStream>, seconds: f64) {
        let volume = self.volume;
        let Some(cur) = self.current.as_mut() else {
            return;
        };
        let Some(target) = seek_target(seconds) else {
            let source = cur.source;
            self.emit(
                source,
                MediaEvent::Error {
                    message: format!("cannot seek to {seconds}s"),
                },
            );
            return;
        };
        let was_playing = !cur.sink.is_paused() && !cur.ended;

        match build_sink(stream, &cur.payload, target, volume) {
            Ok((sink, _)) => {
                cur.sink.stop();
                cur.sink = sink;
                cur.offset = target;
                cur.ended = false;
                if was_playing {
                    cur.sink.play();
                }
                let source = cur.source;
                self.emit(
                    source,
                    MediaEvent::TimeUpdate {
                        position: target.as_secs_f64(),
                    },
                );
            }
            Err(err) => warn!(error = %err, seconds, "seek failed"),
        }
    }

    fn report_progress(&mut self) {
        let Some(cur) = self.current.as_mut() else {
            return;
        };
        if cur.ended {
            return;
        }
        let source = cur.source;
        if cur.sink.empty() {
            cur.ended = true;
            self.emit(source, MediaEvent::Ended);
        } else if !cur.sink.is_paused() {
            let position = (cur.offset + cur.sink.get_pos()).as_secs_f64();
            self.emit(source, MediaEvent::TimeUpdate { position });
        }
    }
}

fn seek_target(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds.max(0.0)).ok()
}

fn build_sink(
    stream: Option<&OutputStream>,
    payload: &Arc<[u8]>,
    start_at: Duration,
    volume: f32,
) -> Result<(Sink, Option<Duration>)> {
    let stream = stream.ok_or_else(|| anyhow!("no audio output device"))?;
    let decoder = Decoder::new(Cursor::new(Arc::clone(payload)))
        .map_err(|err| anyhow!("unsupported or corrupt audio: {err}"))?;
    let duration = decoder.total_duration();

    let sink = Sink::connect_new(stream.mixer());
    sink.append(decoder.skip_duration(start_at));
    sink.pause();
    sink.set_volume(volume);
    Ok((sink, duration))
}
