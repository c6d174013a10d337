//! Asset enumeration and byte-size resolution.
//!
//! Stores report sizes unevenly: the original resource usually carries
//! one, cloud-only assets often report nothing, and some backends list
//! only sidecar resources. The fetcher normalizes all of that into a
//! concrete `byte_size` on every item, with one resource lookup per
//! asset and never more.

use std::sync::Arc;

use crate::config::{ESTIMATED_VIDEO_BYTES_PER_SECOND, LARGE_VIDEO_THRESHOLD};
use crate::models::MediaItem;
use crate::store::{AssetFilter, AssetRecord, MediaStore, ResourceInfo, StoreError};

pub struct MetadataFetcher {
    store: Arc<dyn MediaStore>,
}

impl MetadataFetcher {
    pub fn new(store: Arc<dyn MediaStore>) -> Self {
        Self { store }
    }

    /// Fetch all assets matching the filter, newest first, and resolve
    /// each one's byte size. Undated assets sort last; capture-time
    /// ties keep the store's enumeration order. Per-asset resource
    /// failures are logged and resolved through the estimate path; they
    /// never drop the item or abort the fetch.
    pub async fn fetch_items(&self, filter: AssetFilter) -> Result<Vec<MediaItem>, StoreError> {
        let mut records = self.store.fetch_assets(filter).await?;
        // Stable, and None orders below every Some: undated assets end
        // up at the tail instead of masquerading as newest.
        records.sort_by(|a, b| b.capture_time.cmp(&a.capture_time));
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let resources = match self.store.fetch_resources(&record.id).await {
                Ok(resources) => resources,
                Err(e) => {
                    log::warn!("Failed to fetch resources for {}: {}", record.id, e);
                    Vec::new()
                }
            };
            items.push(self.build_item(record, &resources));
        }
        Ok(items)
    }

    /// Videos of at least 10 MiB, largest first. Equal sizes keep their
    /// fetch order.
    pub async fn fetch_large_videos(&self) -> Result<Vec<MediaItem>, StoreError> {
        let videos = self.fetch_items(AssetFilter::Videos).await?;
        Ok(select_large_videos(&videos))
    }

    fn build_item(&self, record: AssetRecord, resources: &[ResourceInfo]) -> MediaItem {
        let byte_size = resolve_byte_size(&record, resources);
        MediaItem {
            id: record.id,
            kind: record.kind,
            capture_time: record.capture_time,
            byte_size,
            duration_secs: record.duration_secs,
            thumbnail: None,
        }
    }
}

/// Filter an already-fetched video list down to the large ones,
/// largest first with stable ties. Shared with the scan pipeline,
/// which reuses its full video fetch instead of fetching twice.
pub fn select_large_videos(videos: &[MediaItem]) -> Vec<MediaItem> {
    let mut large: Vec<MediaItem> = videos
        .iter()
        .filter(|item| item.byte_size >= LARGE_VIDEO_THRESHOLD)
        .cloned()
        .collect();
    large.sort_by(|a, b| b.byte_size.cmp(&a.byte_size));
    large
}

/// Byte-size fallback chain, in order:
///
/// 1. the original full-quality resource for the asset's media kind,
///    when it reports a positive size;
/// 2. the first resource in list order reporting a positive size;
/// 3. for videos with a known duration, duration times an assumed
///    1 MiB/s bitrate;
/// 4. zero.
fn resolve_byte_size(record: &AssetRecord, resources: &[ResourceInfo]) -> u64 {
    if let Some(size) = resources
        .iter()
        .find(|r| r.kind.is_original_for(record.kind))
        .and_then(|r| r.reported_size())
    {
        return size;
    }

    if let Some(size) = resources.iter().find_map(|r| r.reported_size()) {
        return size;
    }

    if record.kind.is_video() && record.duration_secs > 0.0 {
        return (record.duration_secs * ESTIMATED_VIDEO_BYTES_PER_SECOND as f64) as u64;
    }

    0
}
