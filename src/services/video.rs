//! Video loading state machine.
//!
//! One video is "current" at a time: starting a load supersedes any
//! load still in flight, and every load resolves exactly once, to
//! `Ready` or `Error`. Resolved handles are kept in a small LRU cache
//! keyed by asset id; players are never cached, a fresh wrapper is
//! built for every access so stale playback state can't leak between
//! visits.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Notify};

use crate::config::PipelineConfig;
use crate::store::{MediaStore, StoreError, VideoCancelHandle, VideoFetchEvent, VideoHandle};

/// Terminal failure kinds surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VideoError {
    #[error("video not found")]
    NotFound,
    #[error("download failed")]
    DownloadFailed,
    #[error("network unavailable")]
    NetworkUnavailable,
    #[error("video load timed out")]
    Timeout,
    #[error("video load cancelled")]
    Cancelled,
    #[error("video load failed")]
    Other,
}

impl From<&StoreError> for VideoError {
    fn from(error: &StoreError) -> Self {
        match error {
            StoreError::NotFound(_) => VideoError::NotFound,
            StoreError::DownloadFailed(_) => VideoError::DownloadFailed,
            StoreError::NetworkUnavailable => VideoError::NetworkUnavailable,
            StoreError::Timeout => VideoError::Timeout,
            StoreError::Cancelled => VideoError::Cancelled,
            StoreError::Io(_) | StoreError::Decode(_) | StoreError::Other(_) => VideoError::Other,
        }
    }
}

/// Observable loading state. `DownloadingFromCloud` only appears when
/// the store reports transfer progress; local hits jump straight from
/// `Loading` to `Ready`.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoLoadState {
    Idle,
    Loading,
    DownloadingFromCloud { progress: f64 },
    Ready(VideoHandle),
    Error(VideoError),
}

impl VideoLoadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoLoadState::Ready(_) | VideoLoadState::Error(_))
    }
}

/// Playback wrapper over a resolved handle. Deliberately not `Clone`:
/// each accessor call constructs its own player.
#[derive(Debug)]
pub struct VideoPlayer {
    handle: VideoHandle,
    muted: bool,
}

impl VideoPlayer {
    fn new(handle: VideoHandle) -> Self {
        // Inline previews start muted.
        Self {
            handle,
            muted: true,
        }
    }

    pub fn handle(&self) -> &VideoHandle {
        &self.handle
    }

    pub fn uri(&self) -> &str {
        &self.handle.uri
    }

    pub fn duration_secs(&self) -> f64 {
        self.handle.duration_secs
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }
}

struct ActiveLoad {
    cancel: VideoCancelHandle,
    notify: Arc<Notify>,
}

struct LoadSlot {
    /// Bumped by every `load` and `cancel`; publishes from stale
    /// generations are dropped, which is what makes resolution
    /// exactly-once even when loads overlap.
    generation: u64,
    active: Option<ActiveLoad>,
}

pub struct VideoService {
    store: Arc<dyn MediaStore>,
    handles: Mutex<LruCache<String, VideoHandle>>,
    slot: Mutex<LoadSlot>,
    state_tx: watch::Sender<VideoLoadState>,
    timeout: Duration,
}

impl VideoService {
    pub fn new(store: Arc<dyn MediaStore>, config: &PipelineConfig) -> Self {
        let capacity = NonZeroUsize::new(config.video_handle_cache_size.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        let (state_tx, _) = watch::channel(VideoLoadState::Idle);
        Self {
            store,
            handles: Mutex::new(LruCache::new(capacity)),
            slot: Mutex::new(LoadSlot {
                generation: 0,
                active: None,
            }),
            state_tx,
            timeout: config.video_load_timeout,
        }
    }

    pub fn state(&self) -> VideoLoadState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<VideoLoadState> {
        self.state_tx.subscribe()
    }

    /// Fresh player for the currently ready video, if any.
    pub fn player(&self) -> Option<VideoPlayer> {
        match &*self.state_tx.borrow() {
            VideoLoadState::Ready(handle) => Some(VideoPlayer::new(handle.clone())),
            _ => None,
        }
    }

    /// Fresh player straight from the handle cache, without a load.
    pub fn cached_player(&self, asset_id: &str) -> Option<VideoPlayer> {
        let mut handles = self.handles.lock().unwrap();
        handles.get(asset_id).cloned().map(VideoPlayer::new)
    }

    /// Drive a video to a terminal state, superseding any load still in
    /// flight. The returned state is also the last one published,
    /// except for superseded loads, which report `Error(Cancelled)` to
    /// their caller without disturbing the newer load's state.
    pub async fn load(&self, asset_id: &str) -> VideoLoadState {
        let generation = {
            let mut slot = self.slot.lock().unwrap();
            slot.generation += 1;
            if let Some(previous) = slot.active.take() {
                previous.cancel.cancel();
                // notify_one stores a permit, so the wakeup is kept
                // even if the old load isn't parked in its select yet.
                previous.notify.notify_one();
            }
            slot.generation
        };

        // A cached handle resolves without touching the store.
        let cached = {
            let mut handles = self.handles.lock().unwrap();
            handles.get(asset_id).cloned()
        };
        if let Some(handle) = cached {
            let state = VideoLoadState::Ready(handle);
            self.publish(generation, state.clone());
            return state;
        }

        self.publish(generation, VideoLoadState::Loading);

        let mut request = self.store.open_video(asset_id);
        let notify = Arc::new(Notify::new());
        {
            let mut slot = self.slot.lock().unwrap();
            if slot.generation != generation {
                // Superseded before the fetch even registered.
                request.cancel_handle().cancel();
                return VideoLoadState::Error(VideoError::Cancelled);
            }
            slot.active = Some(ActiveLoad {
                cancel: request.cancel_handle(),
                notify: notify.clone(),
            });
        }

        let timer = tokio::time::sleep(self.timeout);
        tokio::pin!(timer);

        let outcome = loop {
            tokio::select! {
                _ = &mut timer => {
                    // The watchdog abandons the load; the store keeps
                    // or drops the transfer as it sees fit.
                    request.cancel_handle().cancel();
                    break VideoLoadState::Error(VideoError::Cancelled);
                }
                _ = notify.notified() => {
                    return VideoLoadState::Error(VideoError::Cancelled);
                }
                event = request.events.recv() => match event {
                    Some(VideoFetchEvent::Progress(progress)) => {
                        // Full progress means nothing is left to
                        // transfer; only partial progress reads as a
                        // cloud download.
                        if progress < 1.0 {
                            self.publish(generation, VideoLoadState::DownloadingFromCloud {
                                progress: progress.clamp(0.0, 1.0),
                            });
                        }
                    }
                    Some(VideoFetchEvent::Finished { handle, degraded }) => {
                        if degraded {
                            // Early reduced-quality delivery; the full
                            // one is still coming.
                            log::debug!("Ignoring degraded video delivery for {}", asset_id);
                            continue;
                        }
                        let mut handles = self.handles.lock().unwrap();
                        handles.put(asset_id.to_string(), handle.clone());
                        break VideoLoadState::Ready(handle);
                    }
                    Some(VideoFetchEvent::Failed(error)) => {
                        log::warn!("Video load failed for {}: {}", asset_id, error);
                        break VideoLoadState::Error(VideoError::from(&error));
                    }
                    None => {
                        break VideoLoadState::Error(VideoError::Other);
                    }
                }
            }
        };

        {
            let mut slot = self.slot.lock().unwrap();
            if slot.generation == generation {
                slot.active = None;
            }
        }
        self.publish(generation, outcome.clone());
        outcome
    }

    /// Return to idle, abandoning any load in flight. Safe to call at
    /// any time, in any state.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock().unwrap();
        slot.generation += 1;
        if let Some(active) = slot.active.take() {
            active.cancel.cancel();
            active.notify.notify_one();
        }
        self.state_tx.send_replace(VideoLoadState::Idle);
    }

    /// Forget cached handles for deleted assets.
    pub fn invalidate(&self, asset_ids: &std::collections::HashSet<String>) {
        let mut handles = self.handles.lock().unwrap();
        for id in asset_ids {
            handles.pop(id);
        }
    }

    fn publish(&self, generation: u64, state: VideoLoadState) {
        let slot = self.slot.lock().unwrap();
        if slot.generation == generation {
            // send_replace stores the value even with no receivers;
            // the accessors read it back through the channel.
            self.state_tx.send_replace(state);
        }
    }
}
