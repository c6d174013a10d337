//! In-memory media store used by tests across the crate.
//!
//! Every backend touch is observable: resource lookups and thumbnail
//! renders are counted, thumbnail concurrency is tracked, video fetches
//! replay per-asset scripts, and deletion can be made to fail without
//! touching the rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::RgbaImage;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::models::{MediaKind, Thumbnail};
use crate::store::{
    AssetFilter, AssetRecord, MediaStore, ResourceInfo, ResourceKind, StoreError,
    ThumbnailQuality, VideoCancelHandle, VideoFetchEvent, VideoHandle, VideoRequest,
};

/// One scripted asset row. Built with the fluent constructors below and
/// handed to [`MemoryMediaStore::insert`].
#[derive(Debug, Clone)]
pub struct MemoryAsset {
    pub id: String,
    pub kind: MediaKind,
    pub capture_time: Option<DateTime<Utc>>,
    pub duration_secs: f64,
    pub is_local: bool,
    pub hidden: bool,
    pub burst_extra: bool,
    pub in_all_photos: bool,
    pub resources: Vec<ResourceInfo>,
}

impl MemoryAsset {
    fn with_kind(id: impl Into<String>, kind: MediaKind) -> Self {
        let original = match kind {
            MediaKind::Video => Some(ResourceKind::Video),
            MediaKind::Audio => None,
            _ => Some(ResourceKind::Photo),
        };
        Self {
            id: id.into(),
            kind,
            capture_time: None,
            duration_secs: 0.0,
            is_local: true,
            hidden: false,
            burst_extra: false,
            in_all_photos: !matches!(kind, MediaKind::Audio),
            resources: original
                .map(|k| vec![ResourceInfo::new(k, None)])
                .unwrap_or_default(),
        }
    }

    pub fn image(id: impl Into<String>) -> Self {
        Self::with_kind(id, MediaKind::Image)
    }

    pub fn video(id: impl Into<String>) -> Self {
        Self::with_kind(id, MediaKind::Video)
    }

    pub fn screenshot(id: impl Into<String>) -> Self {
        Self::with_kind(id, MediaKind::Screenshot)
    }

    pub fn live_photo(id: impl Into<String>) -> Self {
        Self::with_kind(id, MediaKind::LivePhoto)
    }

    pub fn audio(id: impl Into<String>) -> Self {
        Self::with_kind(id, MediaKind::Audio)
    }

    pub fn captured_at(mut self, time: DateTime<Utc>) -> Self {
        self.capture_time = Some(time);
        self
    }

    pub fn duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Give the asset's original resource a reported byte size.
    pub fn sized(mut self, bytes: u64) -> Self {
        for resource in &mut self.resources {
            if resource.kind.is_original_for(self.kind) {
                resource.byte_size = Some(bytes);
            }
        }
        self
    }

    /// Replace the resource list entirely (for exercising size fallbacks).
    pub fn with_resources(mut self, resources: Vec<ResourceInfo>) -> Self {
        self.resources = resources;
        self
    }

    pub fn cloud_only(mut self) -> Self {
        self.is_local = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self.in_all_photos = false;
        self
    }

    pub fn burst_extra(mut self) -> Self {
        self.burst_extra = true;
        self.in_all_photos = false;
        self
    }

    fn record(&self) -> AssetRecord {
        AssetRecord {
            id: self.id.clone(),
            kind: self.kind,
            capture_time: self.capture_time,
            duration_secs: self.duration_secs,
            is_local: self.is_local,
        }
    }

    fn matches(&self, filter: AssetFilter) -> bool {
        match filter {
            AssetFilter::All => true,
            AssetFilter::Hidden => self.hidden,
            AssetFilter::BurstExtras => self.burst_extra,
            AssetFilter::AllPhotosAlbum => self.in_all_photos,
            // Class filters mimic a photo library's defaults: hidden
            // assets and burst extras stay out of normal fetches.
            AssetFilter::Photos => {
                !self.hidden
                    && !self.burst_extra
                    && matches!(self.kind, MediaKind::Image | MediaKind::LivePhoto)
            }
            AssetFilter::Screenshots => {
                !self.hidden && !self.burst_extra && self.kind == MediaKind::Screenshot
            }
            AssetFilter::Videos => {
                !self.hidden && !self.burst_extra && self.kind == MediaKind::Video
            }
            AssetFilter::Audio => self.kind == MediaKind::Audio,
        }
    }
}

/// Steps in a scripted video fetch, replayed in order on `open_video`.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Wait(Duration),
    Progress(f64),
    Finish { degraded: bool },
    Fail(ScriptedFailure),
}

#[derive(Debug, Clone, Copy)]
pub enum ScriptedFailure {
    NotFound,
    Network,
    Download,
    Timeout,
    Other,
}

impl ScriptedFailure {
    fn into_error(self, asset_id: &str) -> StoreError {
        match self {
            ScriptedFailure::NotFound => StoreError::NotFound(asset_id.to_string()),
            ScriptedFailure::Network => StoreError::NetworkUnavailable,
            ScriptedFailure::Download => {
                StoreError::DownloadFailed(format!("scripted failure for {}", asset_id))
            }
            ScriptedFailure::Timeout => StoreError::Timeout,
            ScriptedFailure::Other => StoreError::Other("scripted failure".to_string()),
        }
    }
}

#[derive(Default)]
struct Inner {
    rows: Vec<MemoryAsset>,
    video_scripts: HashMap<String, Vec<ScriptStep>>,
    failing_thumbnails: HashSet<String>,
    failing_resources: HashSet<String>,
    thumbnail_delay: Duration,
    thumbnail_edge: u32,
    delete_error: Option<String>,
    deleted_ids: Vec<String>,
}

pub struct MemoryMediaStore {
    inner: RwLock<Inner>,
    resource_lookups: AtomicUsize,
    thumbnail_renders: AtomicUsize,
    thumbnails_active: AtomicUsize,
    thumbnails_peak: AtomicUsize,
    video_opens: AtomicUsize,
}

impl Default for MemoryMediaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                thumbnail_edge: 8,
                ..Inner::default()
            }),
            resource_lookups: AtomicUsize::new(0),
            thumbnail_renders: AtomicUsize::new(0),
            thumbnails_active: AtomicUsize::new(0),
            thumbnails_peak: AtomicUsize::new(0),
            video_opens: AtomicUsize::new(0),
        }
    }

    pub fn insert(&self, asset: MemoryAsset) {
        let mut inner = self.inner.write().unwrap();
        inner.rows.push(asset);
    }

    /// Script the event sequence `open_video` replays for this asset.
    pub fn script_video(&self, asset_id: impl Into<String>, steps: Vec<ScriptStep>) {
        let mut inner = self.inner.write().unwrap();
        inner.video_scripts.insert(asset_id.into(), steps);
    }

    /// Make thumbnail rendering fail for this asset.
    pub fn fail_thumbnail(&self, asset_id: impl Into<String>) {
        let mut inner = self.inner.write().unwrap();
        inner.failing_thumbnails.insert(asset_id.into());
    }

    /// Make resource lookups fail for this asset.
    pub fn fail_resources(&self, asset_id: impl Into<String>) {
        let mut inner = self.inner.write().unwrap();
        inner.failing_resources.insert(asset_id.into());
    }

    /// Hold every thumbnail render for this long (concurrency tests).
    pub fn set_thumbnail_delay(&self, delay: Duration) {
        let mut inner = self.inner.write().unwrap();
        inner.thumbnail_delay = delay;
    }

    /// Rendered thumbnail edge in pixels (controls cache byte cost).
    pub fn set_thumbnail_edge(&self, edge: u32) {
        let mut inner = self.inner.write().unwrap();
        inner.thumbnail_edge = edge.max(1);
    }

    /// Make the next (and every later) delete fail without removing rows.
    pub fn fail_deletes(&self, message: impl Into<String>) {
        let mut inner = self.inner.write().unwrap();
        inner.delete_error = Some(message.into());
    }

    pub fn resource_lookups(&self) -> usize {
        self.resource_lookups.load(Ordering::SeqCst)
    }

    pub fn thumbnail_renders(&self) -> usize {
        self.thumbnail_renders.load(Ordering::SeqCst)
    }

    /// Highest number of thumbnail renders observed in flight at once.
    pub fn peak_thumbnail_concurrency(&self) -> usize {
        self.thumbnails_peak.load(Ordering::SeqCst)
    }

    pub fn video_opens(&self) -> usize {
        self.video_opens.load(Ordering::SeqCst)
    }

    pub fn contains(&self, asset_id: &str) -> bool {
        let inner = self.inner.read().unwrap();
        inner.rows.iter().any(|row| row.id == asset_id)
    }

    pub fn asset_count(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner.rows.len()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        inner.deleted_ids.clone()
    }

    fn video_handle(&self, row: &MemoryAsset) -> VideoHandle {
        VideoHandle {
            asset_id: row.id.clone(),
            uri: format!("memory://{}", row.id),
            duration_secs: row.duration_secs,
            byte_size: row
                .resources
                .iter()
                .find_map(|r| r.reported_size())
                .unwrap_or(0),
        }
    }
}

#[async_trait]
impl MediaStore for MemoryMediaStore {
    async fn fetch_assets(&self, filter: AssetFilter) -> Result<Vec<AssetRecord>, StoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .rows
            .iter()
            .filter(|row| row.matches(filter))
            .map(|row| row.record())
            .collect())
    }

    async fn fetch_resources(&self, asset_id: &str) -> Result<Vec<ResourceInfo>, StoreError> {
        self.resource_lookups.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.read().unwrap();
        if inner.failing_resources.contains(asset_id) {
            return Err(StoreError::Other(format!(
                "scripted resource failure for {}",
                asset_id
            )));
        }
        inner
            .rows
            .iter()
            .find(|row| row.id == asset_id)
            .map(|row| row.resources.clone())
            .ok_or_else(|| StoreError::NotFound(asset_id.to_string()))
    }

    async fn fetch_thumbnail(
        &self,
        asset_id: &str,
        quality: ThumbnailQuality,
    ) -> Result<Thumbnail, StoreError> {
        let (delay, edge, failing, exists) = {
            let inner = self.inner.read().unwrap();
            (
                inner.thumbnail_delay,
                inner.thumbnail_edge,
                inner.failing_thumbnails.contains(asset_id),
                inner.rows.iter().any(|row| row.id == asset_id),
            )
        };

        let active = self.thumbnails_active.fetch_add(1, Ordering::SeqCst) + 1;
        self.thumbnails_peak.fetch_max(active, Ordering::SeqCst);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.thumbnails_active.fetch_sub(1, Ordering::SeqCst);
        self.thumbnail_renders.fetch_add(1, Ordering::SeqCst);

        if !exists {
            return Err(StoreError::NotFound(asset_id.to_string()));
        }
        if failing {
            return Err(StoreError::Decode(format!(
                "scripted thumbnail failure for {}",
                asset_id
            )));
        }
        // Preview renders come back larger than grid renders so cache
        // byte accounting sees a difference between the two.
        let edge = match quality {
            ThumbnailQuality::Grid => edge,
            ThumbnailQuality::Preview => edge * 2,
        };
        Ok(Thumbnail::new(RgbaImage::new(edge, edge)))
    }

    fn open_video(&self, asset_id: &str) -> VideoRequest {
        self.video_opens.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = VideoCancelHandle::new();

        let (script, handle) = {
            let inner = self.inner.read().unwrap();
            let row = inner.rows.iter().find(|row| row.id == asset_id);
            let script = inner.video_scripts.get(asset_id).cloned().unwrap_or_else(|| {
                if row.is_some() {
                    vec![ScriptStep::Finish { degraded: false }]
                } else {
                    vec![ScriptStep::Fail(ScriptedFailure::NotFound)]
                }
            });
            (script, row.map(|r| self.video_handle(r)))
        };

        let id = asset_id.to_string();
        let watch = cancel.clone();
        tokio::spawn(async move {
            for step in script {
                if watch.is_cancelled() {
                    return;
                }
                match step {
                    ScriptStep::Wait(duration) => tokio::time::sleep(duration).await,
                    ScriptStep::Progress(fraction) => {
                        let _ = tx.send(VideoFetchEvent::Progress(fraction));
                    }
                    ScriptStep::Finish { degraded } => {
                        let Some(handle) = handle.clone() else {
                            let _ = tx.send(VideoFetchEvent::Failed(StoreError::NotFound(
                                id.clone(),
                            )));
                            return;
                        };
                        let _ = tx.send(VideoFetchEvent::Finished { handle, degraded });
                    }
                    ScriptStep::Fail(failure) => {
                        let _ = tx.send(VideoFetchEvent::Failed(failure.into_error(&id)));
                    }
                }
            }
        });

        VideoRequest::new(rx, cancel)
    }

    async fn delete_assets(&self, ids: &[String]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap();
        if let Some(message) = &inner.delete_error {
            return Err(StoreError::Other(message.clone()));
        }
        for id in ids {
            if !inner.rows.iter().any(|row| &row.id == id) {
                return Err(StoreError::NotFound(id.clone()));
            }
        }
        inner.rows.retain(|row| !ids.contains(&row.id));
        inner.deleted_ids.extend(ids.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_filters_respect_hidden_and_burst() {
        let store = MemoryMediaStore::new();
        store.insert(MemoryAsset::image("a"));
        store.insert(MemoryAsset::image("b").hidden());
        store.insert(MemoryAsset::image("c").burst_extra());
        store.insert(MemoryAsset::screenshot("s"));
        store.insert(MemoryAsset::video("v"));
        store.insert(MemoryAsset::audio("m"));

        let photos = store.fetch_assets(AssetFilter::Photos).await.unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].id, "a");

        assert_eq!(store.count_assets(AssetFilter::Screenshots).await.unwrap(), 1);
        assert_eq!(store.count_assets(AssetFilter::Videos).await.unwrap(), 1);
        assert_eq!(store.count_assets(AssetFilter::Audio).await.unwrap(), 1);
        assert_eq!(store.count_assets(AssetFilter::Hidden).await.unwrap(), 1);
        assert_eq!(store.count_assets(AssetFilter::BurstExtras).await.unwrap(), 1);
        assert_eq!(store.count_assets(AssetFilter::All).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_resource_lookups_are_counted() {
        let store = MemoryMediaStore::new();
        store.insert(MemoryAsset::image("a").sized(100));
        store.insert(MemoryAsset::image("b").sized(200));

        store.fetch_resources("a").await.unwrap();
        store.fetch_resources("b").await.unwrap();
        store.fetch_resources("a").await.unwrap();
        assert_eq!(store.resource_lookups(), 3);

        assert!(matches!(
            store.fetch_resources("missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_scripted_video_replay() {
        let store = MemoryMediaStore::new();
        store.insert(
            MemoryAsset::video("v")
                .duration(12.0)
                .sized(5000)
                .captured_at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        );
        store.script_video(
            "v",
            vec![
                ScriptStep::Progress(0.3),
                ScriptStep::Progress(0.9),
                ScriptStep::Finish { degraded: false },
            ],
        );

        let mut request = store.open_video("v");
        let mut progress = Vec::new();
        let mut handle = None;
        while let Some(event) = request.events.recv().await {
            match event {
                VideoFetchEvent::Progress(p) => progress.push(p),
                VideoFetchEvent::Finished { handle: h, .. } => handle = Some(h),
                VideoFetchEvent::Failed(e) => panic!("unexpected failure: {}", e),
            }
        }
        assert_eq!(progress, vec![0.3, 0.9]);
        let handle = handle.unwrap();
        assert_eq!(handle.uri, "memory://v");
        assert_eq!(handle.byte_size, 5000);
    }

    #[tokio::test]
    async fn test_cancel_stops_script_replay() {
        let store = MemoryMediaStore::new();
        store.insert(MemoryAsset::video("v"));
        store.script_video(
            "v",
            vec![
                ScriptStep::Wait(Duration::from_millis(20)),
                ScriptStep::Finish { degraded: false },
            ],
        );

        let mut request = store.open_video("v");
        request.cancel_handle().cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Channel closes without a terminal event once the task bails.
        assert!(request.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_transactional() {
        let store = MemoryMediaStore::new();
        store.insert(MemoryAsset::image("a"));
        store.insert(MemoryAsset::image("b"));

        // One missing id fails the whole batch.
        let err = store
            .delete_assets(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.asset_count(), 2);

        store
            .delete_assets(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(store.asset_count(), 0);
        assert_eq!(store.deleted_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_forced_delete_failure_keeps_rows() {
        let store = MemoryMediaStore::new();
        store.insert(MemoryAsset::image("a"));
        store.fail_deletes("store refused");

        let err = store.delete_assets(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, StoreError::Other(_)));
        assert!(store.contains("a"));
    }

    #[tokio::test]
    async fn test_thumbnail_failure_and_render_count() {
        let store = MemoryMediaStore::new();
        store.insert(MemoryAsset::image("ok"));
        store.insert(MemoryAsset::image("bad"));
        store.fail_thumbnail("bad");

        let thumb = store
            .fetch_thumbnail("ok", ThumbnailQuality::Grid)
            .await
            .unwrap();
        assert_eq!(thumb.width(), 8);

        assert!(matches!(
            store.fetch_thumbnail("bad", ThumbnailQuality::Grid).await,
            Err(StoreError::Decode(_))
        ));
        assert_eq!(store.thumbnail_renders(), 2);
    }
}
