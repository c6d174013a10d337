//! Scan orchestration and library mutation.
//!
//! The cleanup service owns the published [`LibraryState`]: every write
//! goes through it, under a lock held only for the write itself, never
//! across a store call. Reads get a clone; observers follow the
//! broadcast event stream instead of polling.
//!
//! A scan runs in two stages. Stage one fetches the asset classes
//! concurrently, derives the six cleanup categories, and publishes them
//! right away, so results are on screen while thumbnails are still
//! cold. Stage two warms preview thumbnails for the leading items of
//! each category in parallel and patches them in as they land.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::models::{CategoryData, CategoryKind, MediaItem};
use crate::services::fetcher::{select_large_videos, MetadataFetcher};
use crate::services::grouping::group_similar;
use crate::services::thumbnails::ThumbnailService;
use crate::services::video::VideoService;
use crate::snapshot::SnapshotStore;
use crate::store::{AssetFilter, MediaStore, StoreError, ThumbnailQuality};

/// Everything a scan publishes, in one value. Replaced wholesale by a
/// rescan; mutated in place only by the pruning helpers below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryState {
    pub scan_id: Option<String>,
    pub scanned_at: Option<DateTime<Utc>>,
    /// The six cleanup categories, in presentation order.
    pub categories: Vec<CategoryData>,
    /// Full video inventory, kept alongside the cleanup categories for
    /// size listings and offline browsing.
    pub all_videos: CategoryData,
}

impl Default for LibraryState {
    fn default() -> Self {
        Self {
            scan_id: None,
            scanned_at: None,
            categories: Vec::new(),
            all_videos: CategoryData::new(CategoryKind::AllVideos, Vec::new()),
        }
    }
}

impl LibraryState {
    pub fn category(&self, kind: CategoryKind) -> Option<&CategoryData> {
        self.categories.iter().find(|c| c.kind == kind)
    }

    /// Items across the cleanup categories. Overlaps (a large video
    /// that is also in a duplicate group) count once per category;
    /// this is a review workload number, not a deduplicated total.
    pub fn total_items(&self) -> usize {
        self.categories.iter().map(|c| c.len()).sum()
    }

    pub fn cleanable_bytes(&self) -> u64 {
        self.categories.iter().map(|c| c.total_bytes()).sum()
    }

    pub fn is_consistent(&self) -> bool {
        self.categories.iter().all(|c| c.is_consistent()) && self.all_videos.is_consistent()
    }
}

/// Broadcast to observers as the pipeline makes progress.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    ScanStarted { scan_id: String },
    /// Stage one is published; categories are readable now.
    ScanCompleted { scan_id: String, total_items: usize },
    /// Stage two patched preview thumbnails into this category.
    PreviewsLoaded { kind: CategoryKind },
    /// Items were pruned from the published state only.
    ItemsRemoved { count: usize },
    /// The store confirmed a bulk delete.
    AssetsDeleted { count: usize, freed_bytes: u64 },
    SnapshotRestored { scan_id: Option<String> },
}

/// What a confirmed bulk delete freed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted: usize,
    pub freed_bytes: u64,
}

pub struct CleanupService {
    store: Arc<dyn MediaStore>,
    fetcher: MetadataFetcher,
    thumbnails: Arc<ThumbnailService>,
    video: Arc<VideoService>,
    state: Arc<RwLock<LibraryState>>,
    events: broadcast::Sender<ScanEvent>,
    snapshot: Option<Arc<dyn SnapshotStore>>,
    preview_count: usize,
}

impl CleanupService {
    pub fn new(store: Arc<dyn MediaStore>, config: PipelineConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            fetcher: MetadataFetcher::new(store.clone()),
            thumbnails: Arc::new(ThumbnailService::new(store.clone(), &config)),
            video: Arc::new(VideoService::new(store.clone(), &config)),
            store,
            state: Arc::new(RwLock::new(LibraryState::default())),
            events,
            snapshot: None,
            preview_count: config.preview_thumbnail_count,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn thumbnails(&self) -> Arc<ThumbnailService> {
        self.thumbnails.clone()
    }

    pub fn video(&self) -> Arc<VideoService> {
        self.video.clone()
    }

    /// Clone of the currently published state.
    pub fn state(&self) -> LibraryState {
        self.state.read().unwrap().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Publish the persisted snapshot, if one exists and still parses.
    /// Returns whether anything was restored.
    pub fn restore_snapshot(&self) -> bool {
        let Some(snapshot) = &self.snapshot else {
            return false;
        };
        match snapshot.load() {
            Ok(Some(restored)) => {
                let scan_id = restored.scan_id.clone();
                {
                    let mut state = self.state.write().unwrap();
                    *state = restored;
                }
                let _ = self.events.send(ScanEvent::SnapshotRestored { scan_id });
                true
            }
            Ok(None) => false,
            Err(e) => {
                log::warn!("Ignoring unreadable snapshot: {}", e);
                false
            }
        }
    }

    /// Full library scan: fetch, group, publish, then warm previews.
    ///
    /// The returned state is the stage-one publication; by the time the
    /// future resolves, stage two has also run and the published state
    /// carries preview thumbnails.
    pub async fn scan(&self) -> Result<LibraryState, StoreError> {
        let scan_id = format!("scan_{}", Uuid::new_v4().simple());
        let _ = self.events.send(ScanEvent::ScanStarted {
            scan_id: scan_id.clone(),
        });

        // Asset classes fetch concurrently; each then groups on its own.
        let (photos, screenshots, videos) = tokio::try_join!(
            self.fetcher.fetch_items(AssetFilter::Photos),
            self.fetcher.fetch_items(AssetFilter::Screenshots),
            self.fetcher.fetch_items(AssetFilter::Videos),
        )?;

        let (_, photo_groups) = group_similar(&photos);
        let (_, video_groups) = group_similar(&videos);
        let (_, screenshot_groups) = group_similar(&screenshots);

        let grouped_photo_ids: HashSet<&str> = photo_groups
            .iter()
            .flat_map(|g| g.items.iter().map(|i| i.id.as_str()))
            .collect();
        let grouped_screenshot_ids: HashSet<&str> = screenshot_groups
            .iter()
            .flat_map(|g| g.items.iter().map(|i| i.id.as_str()))
            .collect();

        // What the duplicate pass didn't claim, in fetch order.
        let unique_screenshots: Vec<MediaItem> = screenshots
            .iter()
            .filter(|i| !grouped_screenshot_ids.contains(i.id.as_str()))
            .cloned()
            .collect();
        let others: Vec<MediaItem> = photos
            .iter()
            .filter(|i| !grouped_photo_ids.contains(i.id.as_str()))
            .cloned()
            .collect();
        let large_videos = select_large_videos(&videos);

        let new_state = LibraryState {
            scan_id: Some(scan_id.clone()),
            scanned_at: Some(Utc::now()),
            categories: vec![
                CategoryData::from_groups(CategoryKind::SimilarPhotos, photo_groups),
                CategoryData::from_groups(CategoryKind::SimilarVideos, video_groups),
                CategoryData::from_groups(CategoryKind::SimilarScreenshots, screenshot_groups),
                CategoryData::new(CategoryKind::Screenshots, unique_screenshots),
                CategoryData::new(CategoryKind::LargeVideos, large_videos),
                CategoryData::new(CategoryKind::Others, others),
            ],
            all_videos: CategoryData::new(CategoryKind::AllVideos, videos),
        };

        // Stage one: publish before any thumbnail work starts.
        {
            let mut state = self.state.write().unwrap();
            *state = new_state.clone();
        }
        let _ = self.events.send(ScanEvent::ScanCompleted {
            scan_id,
            total_items: new_state.total_items(),
        });
        self.persist_current().await;

        // Stage two: warm category previews in parallel and patch them
        // into the published state as each category finishes.
        let mut warmups = JoinSet::new();
        for category in &new_state.categories {
            if category.is_empty() {
                continue;
            }
            let kind = category.kind;
            let mut leading: Vec<MediaItem> = category
                .items
                .iter()
                .take(self.preview_count)
                .cloned()
                .collect();
            let thumbnails = self.thumbnails.clone();
            warmups.spawn(async move {
                thumbnails
                    .load_previews(&mut leading, ThumbnailQuality::Grid)
                    .await;
                (kind, leading)
            });
        }
        while let Some(joined) = warmups.join_next().await {
            let Ok((kind, warmed)) = joined else {
                continue;
            };
            {
                let mut state = self.state.write().unwrap();
                attach_previews(&mut state, kind, warmed);
            }
            let _ = self.events.send(ScanEvent::PreviewsLoaded { kind });
        }

        Ok(new_state)
    }

    /// Delete assets from the store, then resync.
    ///
    /// The store call is transactional; if it fails, the published
    /// state is left exactly as it was and the error propagates. On
    /// success the snapshot is invalidated, per-asset caches dropped,
    /// and a full rescan republishes the library.
    pub async fn delete_assets(&self, ids: &[String]) -> Result<DeleteOutcome, StoreError> {
        if ids.is_empty() {
            return Ok(DeleteOutcome {
                deleted: 0,
                freed_bytes: 0,
            });
        }
        let freed_bytes = self.bytes_for(ids);

        self.store.delete_assets(ids).await?;

        let id_set: HashSet<String> = ids.iter().cloned().collect();
        self.thumbnails.invalidate(&id_set);
        self.video.invalidate(&id_set);
        if let Some(snapshot) = &self.snapshot {
            if let Err(e) = snapshot.invalidate() {
                log::warn!("Failed to invalidate snapshot: {}", e);
            }
        }
        let _ = self.events.send(ScanEvent::AssetsDeleted {
            count: ids.len(),
            freed_bytes,
        });

        self.scan().await?;
        Ok(DeleteOutcome {
            deleted: ids.len(),
            freed_bytes,
        })
    }

    /// Prune items from the published state without touching the store.
    /// Used for optimistic UI updates when assets vanish out from
    /// under us (deleted in another app) or get dismissed from review.
    /// Groups left with fewer than two members dissolve. Returns how
    /// many of the ids were actually present.
    pub fn remove_items_locally(&self, ids: &HashSet<String>) -> usize {
        let removed = {
            let mut state = self.state.write().unwrap();
            let present: HashSet<&String> = state
                .categories
                .iter()
                .chain(std::iter::once(&state.all_videos))
                .flat_map(|c| c.items.iter())
                .map(|i| &i.id)
                .filter(|id| ids.contains(*id))
                .collect();
            let removed = present.len();

            for category in &mut state.categories {
                category.remove_items(ids);
            }
            state.all_videos.remove_items(ids);
            removed
        };
        if removed > 0 {
            let _ = self.events.send(ScanEvent::ItemsRemoved { count: removed });
        }
        removed
    }

    /// Byte total for the given ids, as currently published. Unknown
    /// ids contribute nothing.
    fn bytes_for(&self, ids: &[String]) -> u64 {
        let id_set: HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();
        let state = self.state.read().unwrap();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut total = 0;
        for category in state.categories.iter().chain(std::iter::once(&state.all_videos)) {
            for item in &category.items {
                if id_set.contains(item.id.as_str()) && seen.insert(item.id.as_str()) {
                    total += item.byte_size;
                }
            }
        }
        total
    }

    async fn persist_current(&self) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        let snapshot = snapshot.clone();
        let state = self.state();
        let saved =
            tokio::task::spawn_blocking(move || snapshot.save(&state)).await;
        match saved {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Failed to persist snapshot: {}", e),
            Err(e) => log::warn!("Snapshot writer panicked: {}", e),
        }
    }
}

fn attach_previews(state: &mut LibraryState, kind: CategoryKind, warmed: Vec<MediaItem>) {
    let Some(category) = state.categories.iter_mut().find(|c| c.kind == kind) else {
        return;
    };
    for warmed_item in warmed.into_iter().filter(|i| i.thumbnail.is_some()) {
        for item in category.items.iter_mut() {
            if item.id == warmed_item.id {
                item.thumbnail = warmed_item.thumbnail.clone();
            }
        }
        if let Some(groups) = &mut category.groups {
            for group in groups.iter_mut() {
                for item in group.items.iter_mut() {
                    if item.id == warmed_item.id {
                        item.thumbnail = warmed_item.thumbnail.clone();
                    }
                }
            }
        }
    }
}
