//! Bounded thumbnail loading.
//!
//! All bulk rendering goes through one counting gate so a scan can
//! never flood the store with decode work; waiters are served in FIFO
//! order. Rendered thumbnails land in a cache bounded two ways, by
//! entry count and by pixel bytes, with least-recently-used entries
//! evicted first once either ceiling is crossed.

use lru::LruCache;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::PipelineConfig;
use crate::models::{MediaItem, Thumbnail};
use crate::store::{MediaStore, ThumbnailQuality};

type CacheKey = (String, ThumbnailQuality);

struct ThumbCache {
    entries: LruCache<CacheKey, Thumbnail>,
    total_bytes: usize,
    max_entries: usize,
    max_bytes: usize,
}

impl ThumbCache {
    fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_bytes: 0,
            max_entries,
            max_bytes,
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<Thumbnail> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: CacheKey, thumbnail: Thumbnail) {
        self.total_bytes += thumbnail.byte_cost();
        if let Some(old) = self.entries.put(key, thumbnail) {
            self.total_bytes -= old.byte_cost();
        }
        self.evict_to_limits();
    }

    fn remove(&mut self, key: &CacheKey) {
        if let Some(old) = self.entries.pop(key) {
            self.total_bytes -= old.byte_cost();
        }
    }

    fn evict_to_limits(&mut self) {
        while (self.entries.len() > self.max_entries || self.total_bytes > self.max_bytes)
            && !self.entries.is_empty()
        {
            if let Some((_, evicted)) = self.entries.pop_lru() {
                self.total_bytes -= evicted.byte_cost();
            }
        }
    }
}

pub struct ThumbnailService {
    store: Arc<dyn MediaStore>,
    gate: Arc<Semaphore>,
    cache: Arc<Mutex<ThumbCache>>,
    preview_count: usize,
    viewport_margin: usize,
}

impl ThumbnailService {
    pub fn new(store: Arc<dyn MediaStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            gate: Arc::new(Semaphore::new(config.thumbnail_gate_width)),
            cache: Arc::new(Mutex::new(ThumbCache::new(
                config.thumbnail_cache_max_entries,
                config.thumbnail_cache_max_bytes,
            ))),
            preview_count: config.preview_thumbnail_count,
            viewport_margin: config.viewport_margin,
        }
    }

    /// Warm the first few items of a category, in parallel, bypassing
    /// both the gate and the cache. This runs right after a scan is
    /// published so category cards have covers before bulk loading
    /// starts queueing.
    pub async fn load_previews(&self, items: &mut [MediaItem], quality: ThumbnailQuality) {
        let mut tasks = JoinSet::new();
        for (index, item) in items.iter().enumerate().take(self.preview_count) {
            if item.thumbnail.is_some() {
                continue;
            }
            let store = self.store.clone();
            let id = item.id.clone();
            tasks.spawn(async move { (index, store.fetch_thumbnail(&id, quality).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            let Ok((index, outcome)) = joined else {
                continue;
            };
            match outcome {
                Ok(thumbnail) => items[index].thumbnail = Some(thumbnail),
                Err(e) => log::warn!("Preview thumbnail failed for {}: {}", items[index].id, e),
            }
        }
    }

    /// Load thumbnails for a whole item list through the gate. Items
    /// that already carry a thumbnail are skipped; cache hits attach
    /// without touching the store. Returns how many were rendered
    /// fresh. Individual failures are logged and leave the item bare.
    pub async fn load_batch(
        &self,
        items: &mut [MediaItem],
        quality: ThumbnailQuality,
    ) -> usize {
        let mut misses = Vec::new();
        {
            let mut cache = self.cache.lock().unwrap();
            for (index, item) in items.iter_mut().enumerate() {
                if item.thumbnail.is_some() {
                    continue;
                }
                match cache.get(&(item.id.clone(), quality)) {
                    Some(thumbnail) => item.thumbnail = Some(thumbnail),
                    None => misses.push(index),
                }
            }
        }

        let mut tasks = JoinSet::new();
        for index in misses {
            let store = self.store.clone();
            let gate = self.gate.clone();
            let cache = self.cache.clone();
            let id = items[index].id.clone();
            tasks.spawn(async move {
                let Ok(_permit) = gate.acquire_owned().await else {
                    return (index, None);
                };
                match store.fetch_thumbnail(&id, quality).await {
                    Ok(thumbnail) => {
                        let mut cache = cache.lock().unwrap();
                        cache.insert((id, quality), thumbnail.clone());
                        (index, Some(thumbnail))
                    }
                    Err(e) => {
                        log::warn!("Thumbnail failed for {}: {}", id, e);
                        (index, None)
                    }
                }
            });
        }

        let mut rendered = 0;
        while let Some(joined) = tasks.join_next().await {
            let Ok((index, thumbnail)) = joined else {
                continue;
            };
            if let Some(thumbnail) = thumbnail {
                items[index].thumbnail = Some(thumbnail);
                rendered += 1;
            }
        }
        rendered
    }

    /// Progressive loading for a scrolling grid: fetch the visible
    /// range plus a margin of rows on either side, delivering each
    /// thumbnail through `on_ready` as it lands (cache hits first,
    /// then store results in completion order). Returns how many
    /// thumbnails were delivered.
    pub async fn load_viewport(
        &self,
        items: &[MediaItem],
        visible: Range<usize>,
        quality: ThumbnailQuality,
        mut on_ready: impl FnMut(usize, Thumbnail),
    ) -> usize {
        if items.is_empty() {
            return 0;
        }
        let start = visible.start.saturating_sub(self.viewport_margin);
        let end = visible.end.saturating_add(self.viewport_margin).min(items.len());
        if start >= end {
            return 0;
        }

        let mut hits = Vec::new();
        let mut misses = Vec::new();
        {
            let mut cache = self.cache.lock().unwrap();
            for index in start..end {
                let item = &items[index];
                if let Some(thumbnail) = item.thumbnail.clone() {
                    hits.push((index, thumbnail));
                } else if let Some(thumbnail) = cache.get(&(item.id.clone(), quality)) {
                    hits.push((index, thumbnail));
                } else {
                    misses.push(index);
                }
            }
        }

        // Callbacks run outside the cache lock.
        let mut delivered = 0;
        for (index, thumbnail) in hits {
            on_ready(index, thumbnail);
            delivered += 1;
        }

        let mut tasks = JoinSet::new();
        for index in misses {
            let store = self.store.clone();
            let gate = self.gate.clone();
            let cache = self.cache.clone();
            let id = items[index].id.clone();
            tasks.spawn(async move {
                let Ok(_permit) = gate.acquire_owned().await else {
                    return (index, None);
                };
                match store.fetch_thumbnail(&id, quality).await {
                    Ok(thumbnail) => {
                        let mut cache = cache.lock().unwrap();
                        cache.insert((id, quality), thumbnail.clone());
                        (index, Some(thumbnail))
                    }
                    Err(e) => {
                        log::warn!("Thumbnail failed for {}: {}", id, e);
                        (index, None)
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let Ok((index, Some(thumbnail))) = joined else {
                continue;
            };
            on_ready(index, thumbnail);
            delivered += 1;
        }
        delivered
    }

    /// Cached thumbnail for an asset, if still resident. Promotes the
    /// entry.
    pub fn cached(&self, asset_id: &str, quality: ThumbnailQuality) -> Option<Thumbnail> {
        let mut cache = self.cache.lock().unwrap();
        cache.get(&(asset_id.to_string(), quality))
    }

    /// Drop cache entries for assets that no longer exist.
    pub fn invalidate(&self, asset_ids: &HashSet<String>) {
        let mut cache = self.cache.lock().unwrap();
        for id in asset_ids {
            cache.remove(&(id.clone(), ThumbnailQuality::Grid));
            cache.remove(&(id.clone(), ThumbnailQuality::Preview));
        }
    }

    pub fn clear_cache(&self) {
        let mut cache = self.cache.lock().unwrap();
        cache.entries.clear();
        cache.total_bytes = 0;
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap().entries.len()
    }

    pub fn cache_bytes(&self) -> usize {
        self.cache.lock().unwrap().total_bytes
    }
}
