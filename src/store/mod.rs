pub mod filesystem;
pub mod memory;

pub use filesystem::FsMediaStore;
pub use memory::MemoryMediaStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::models::{MediaKind, Thumbnail};

/// Errors surfaced by a media store. Per-item scan failures are logged
/// and skipped upstream; only whole-operation failures propagate.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("asset not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("network unavailable")]
    NetworkUnavailable,
    #[error("download failed: {0}")]
    DownloadFailed(String),
    #[error("operation timed out")]
    Timeout,
    #[error("operation cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

/// Asset classes a store can enumerate or count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetFilter {
    /// Still images excluding screenshots (live photos included).
    Photos,
    Screenshots,
    Videos,
    Audio,
    Hidden,
    /// Burst shots other than the cover frame.
    BurstExtras,
    /// The store's "all photos" smart collection.
    AllPhotosAlbum,
    /// Every asset of every class.
    All,
}

/// Role of one underlying data resource attached to an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Full-size photo data.
    Photo,
    /// Full-size video data.
    Video,
    /// Motion component of a live photo.
    PairedVideo,
    /// Edit sidecars, adjustment data, anything else.
    Auxiliary,
}

impl ResourceKind {
    /// Whether this resource is the original full-quality payload for
    /// an asset of the given media kind.
    pub fn is_original_for(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Video => *self == ResourceKind::Video,
            MediaKind::Image | MediaKind::Screenshot | MediaKind::LivePhoto => {
                *self == ResourceKind::Photo
            }
            MediaKind::Audio => false,
        }
    }
}

/// One resource descriptor as reported by the store. `byte_size` is
/// whatever the backend claims; `None` and `Some(0)` both mean the size
/// is unusable and the caller must fall back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub kind: ResourceKind,
    pub byte_size: Option<u64>,
}

impl ResourceInfo {
    pub fn new(kind: ResourceKind, byte_size: Option<u64>) -> Self {
        Self { kind, byte_size }
    }

    pub fn reported_size(&self) -> Option<u64> {
        match self.byte_size {
            Some(n) if n > 0 => Some(n),
            _ => None,
        }
    }
}

/// Raw asset row returned by enumeration, before metadata resolution.
/// Resource descriptors are deliberately not embedded; they cost a
/// separate per-asset lookup and the fetcher decides when to pay it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: String,
    pub kind: MediaKind,
    pub capture_time: Option<DateTime<Utc>>,
    pub duration_secs: f64,
    /// Full-quality data present on this device (not just a cloud stub).
    pub is_local: bool,
}

/// Requested thumbnail fidelity; doubles as the cache key discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThumbnailQuality {
    /// Small and fast, for grid cells.
    Grid,
    /// Larger, for the detail pane.
    Preview,
}

impl ThumbnailQuality {
    /// Longest edge in pixels the store should render at.
    pub fn target_edge(&self) -> u32 {
        match self {
            ThumbnailQuality::Grid => 256,
            ThumbnailQuality::Preview => 1024,
        }
    }
}

/// Progress stream for one video fetch.
///
/// The store may emit any number of `Progress` events, then terminates
/// with `Finished` or `Failed`. Backends that hand results to multiple
/// callbacks can emit more than one terminal event (a degraded preview
/// followed by the full asset); consumers take the first acceptable one
/// and drop the rest.
#[derive(Debug)]
pub enum VideoFetchEvent {
    /// Download progress in `[0.0, 1.0]`.
    Progress(f64),
    Finished {
        handle: VideoHandle,
        /// True when this is a reduced-quality early delivery.
        degraded: bool,
    },
    Failed(StoreError),
}

/// A resolved, playable video: everything needed to construct a player
/// without touching the store again. Cheap to clone, safe to cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoHandle {
    pub asset_id: String,
    /// Location a player can open directly (local path or streaming URL).
    pub uri: String,
    pub duration_secs: f64,
    pub byte_size: u64,
}

/// Cancels an in-flight video fetch. Clones share the same flag;
/// cancelling twice is a no-op.
#[derive(Debug, Clone, Default)]
pub struct VideoCancelHandle {
    flag: Arc<AtomicBool>,
}

impl VideoCancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// An in-flight video fetch: the event stream plus its cancel handle.
#[derive(Debug)]
pub struct VideoRequest {
    pub events: mpsc::UnboundedReceiver<VideoFetchEvent>,
    cancel: VideoCancelHandle,
}

impl VideoRequest {
    pub fn new(events: mpsc::UnboundedReceiver<VideoFetchEvent>, cancel: VideoCancelHandle) -> Self {
        Self { events, cancel }
    }

    pub fn cancel_handle(&self) -> VideoCancelHandle {
        self.cancel.clone()
    }
}

/// Backend boundary for everything the cleanup pipeline reads or
/// deletes. Implementations must be safe to share across tasks.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Enumerate assets matching the filter, in the store's native
    /// order (newest additions last is typical but not guaranteed).
    async fn fetch_assets(&self, filter: AssetFilter) -> Result<Vec<AssetRecord>, StoreError>;

    /// Count without materializing records.
    async fn count_assets(&self, filter: AssetFilter) -> Result<usize, StoreError> {
        Ok(self.fetch_assets(filter).await?.len())
    }

    /// Resource descriptors for one asset. Each call may hit the
    /// backend; callers batch per scan, never per render.
    async fn fetch_resources(&self, asset_id: &str) -> Result<Vec<ResourceInfo>, StoreError>;

    /// Render a thumbnail at the requested quality.
    async fn fetch_thumbnail(
        &self,
        asset_id: &str,
        quality: ThumbnailQuality,
    ) -> Result<Thumbnail, StoreError>;

    /// Begin fetching a playable video, downloading from cloud storage
    /// if needed. Returns immediately; progress arrives on the stream.
    fn open_video(&self, asset_id: &str) -> VideoRequest;

    /// Delete the given assets as one transaction: either every asset
    /// is removed or none are (the error reports why).
    async fn delete_assets(&self, ids: &[String]) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_size_rejects_zero_and_none() {
        assert_eq!(
            ResourceInfo::new(ResourceKind::Photo, Some(42)).reported_size(),
            Some(42)
        );
        assert_eq!(ResourceInfo::new(ResourceKind::Photo, Some(0)).reported_size(), None);
        assert_eq!(ResourceInfo::new(ResourceKind::Photo, None).reported_size(), None);
    }

    #[test]
    fn test_original_resource_matches_media_kind() {
        assert!(ResourceKind::Video.is_original_for(MediaKind::Video));
        assert!(!ResourceKind::Photo.is_original_for(MediaKind::Video));
        assert!(ResourceKind::Photo.is_original_for(MediaKind::Screenshot));
        assert!(ResourceKind::Photo.is_original_for(MediaKind::LivePhoto));
        assert!(!ResourceKind::PairedVideo.is_original_for(MediaKind::LivePhoto));
    }

    #[test]
    fn test_cancel_handle_is_shared_and_idempotent() {
        let handle = VideoCancelHandle::new();
        let other = handle.clone();
        assert!(!other.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_quality_edges() {
        assert!(ThumbnailQuality::Preview.target_edge() > ThumbnailQuality::Grid.target_edge());
    }
}
