use belong_engine::CacheRequest;
use belong_storage::ContentCache;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

pub type Payload = (String, Arc<[u8]>);
pub type PayloadSender = UnboundedSender<Payload>;

const MAX_WAITING: usize = 8;

/// Pairs the coordinator's cache requests with payloads the audio thread
/// already fetched, so each song crosses the network once.
pub struct CacheWorker {
    cache: Box<dyn ContentCache>,
    waiting: VecDeque<CacheRequest>,
    unclaimed: Option<Payload>,
}

impl CacheWorker {
    pub fn new(cache: Box<dyn ContentCache>) -> Self {
        Self {
            cache,
            waiting: VecDeque::new(),
            unclaimed: None,
        }
    }

    pub async fn run(
        mut self,
        mut requests: UnboundedReceiver<CacheRequest>,
        mut payloads: UnboundedReceiver<Payload>,
    ) {
        loop {
            tokio::select! {
                Some(req) = requests.recv() => self.on_request(req).await,
                Some(payload) = payloads.recv() => self.on_payload(payload).await,
                else => break,
            }
        }
    }

    pub async fn on_request(&mut self, req: CacheRequest) {
        match self.cache.contains(&req.url).await {
            Ok(true) => {
                debug!(track_id = %req.track_id, "song already cached");
                return;
            }
            Ok(false) => {}
            Err(err) => warn!(error = %err, track_id = %req.track_id, "cache lookup failed"),
        }

        match self.unclaimed.take() {
            Some((url, bytes)) if url == req.url => self.store(&req, &bytes).await,
            other => {
                self.unclaimed = other;
                if self.waiting.len() == MAX_WAITING {
                    self.waiting.pop_front();
                }
                self.waiting.push_back(req);
            }
        }
    }

    pub async fn on_payload(&mut self, (url, bytes): Payload) {
        match self.waiting.iter().position(|req| req.url == url) {
            Some(pos) => {
                if let Some(req) = self.waiting.remove(pos) {
                    self.store(&req, &bytes).await;
                }
            }
            None => self.unclaimed = Some((url, bytes)),
        }
    }

    async fn store(&self, req: &CacheRequest, bytes: &[u8]) {
        match self.cache.store(&req.url, bytes).await {
            Ok(true) => info!(track_id = %req.track_id, name = %req.track_name, "cached song for offline playback"),
            Ok(false) => debug!(track_id = %req.track_id, "song already cached"),
            Err(err) => warn!(error = %err, track_id = %req.track_id, "failed to cache song; continuing"),
        }
    }
}
