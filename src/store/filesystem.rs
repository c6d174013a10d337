//! Directory-backed media store.
//!
//! Treats a folder tree as a photo library: images and videos are
//! classified by extension and name, capture times come from EXIF or a
//! Takeout-style `<file>.json` sidecar, and zero-byte files stand in
//! for cloud placeholders that were never downloaded.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exif::{In, Reader, Tag, Value};
use image::imageops::FilterType;
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::models::{MediaKind, Thumbnail};
use crate::store::{
    AssetFilter, AssetRecord, MediaStore, ResourceInfo, ResourceKind, StoreError,
    ThumbnailQuality, VideoCancelHandle, VideoFetchEvent, VideoHandle, VideoRequest,
};

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "tiff", "tif", "webp", "dng", "gif", "bmp",
];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv", "webm"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "flac", "aac"];

/// Staging directory used to make bulk deletes all-or-nothing.
const TRASH_DIR: &str = ".photosweep-trash";

/// Optional per-file metadata sidecar, named `<file name>.json`.
#[derive(Debug, Deserialize, Default)]
struct SidecarMeta {
    capture_time: Option<DateTime<Utc>>,
    duration_secs: Option<f64>,
}

#[derive(Debug, Clone)]
struct FsEntry {
    id: String,
    path: PathBuf,
    kind: MediaKind,
    hidden: bool,
    burst_extra: bool,
    byte_size: u64,
    paired_video: Option<PathBuf>,
    capture_time: Option<DateTime<Utc>>,
    duration_secs: f64,
}

impl FsEntry {
    fn record(&self) -> AssetRecord {
        AssetRecord {
            id: self.id.clone(),
            kind: self.kind,
            capture_time: self.capture_time,
            duration_secs: self.duration_secs,
            // Zero-byte files are undownloaded placeholders.
            is_local: self.byte_size > 0,
        }
    }

    fn matches(&self, filter: AssetFilter) -> bool {
        match filter {
            AssetFilter::All => true,
            AssetFilter::Hidden => self.hidden,
            AssetFilter::BurstExtras => self.burst_extra,
            AssetFilter::AllPhotosAlbum => {
                !self.hidden && !self.burst_extra && self.kind != MediaKind::Audio
            }
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

/// Media store over a directory tree. Asset ids are root-relative
/// paths, so they stay stable across rescans.
///
/// Each walk leaves its entries indexed by id, so per-asset lookups
/// between walks are a map hit instead of another tree scan. The
/// index is shared across clones and dropped when a delete changes
/// the tree.
#[derive(Clone)]
pub struct FsMediaStore {
    root: PathBuf,
    index: Arc<RwLock<Option<HashMap<String, FsEntry>>>>,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: Arc::new(RwLock::new(None)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, asset_id: &str) -> Result<PathBuf, StoreError> {
        // Ids are relative paths; refuse anything that escapes the root.
        let relative = Path::new(asset_id);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(StoreError::Other(format!("invalid asset id: {}", asset_id)));
        }
        Ok(self.root.join(relative))
    }

    /// Walk the tree and classify every media file. Metadata extraction
    /// for the survivors runs in parallel.
    fn scan_entries(&self) -> Result<Vec<FsEntry>, StoreError> {
        if !self.root.is_dir() {
            return Err(StoreError::Other(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root).follow_links(false).into_iter();
        let walker = walker.filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            if entry.file_type().is_dir() {
                let name = entry.file_name().to_string_lossy();
                return !name.starts_with('.') && name != TRASH_DIR;
            }
            true
        });
        for entry in walker.filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }

        // Pair live photos: an image plus a same-stem .mov in the same
        // directory is one asset, with the movie as its motion part.
        let mut movies: HashMap<(PathBuf, String), PathBuf> = HashMap::new();
        for path in &files {
            if extension_of(path).as_deref() == Some("mov") {
                if let (Some(parent), Some(stem)) = (path.parent(), stem_of(path)) {
                    movies.insert((parent.to_path_buf(), stem.to_lowercase()), path.clone());
                }
            }
        }

        let mut consumed: HashSet<PathBuf> = HashSet::new();
        let mut skeletons = Vec::new();
        for path in &files {
            let Some(ext) = extension_of(path) else {
                continue;
            };
            if ext == "json" {
                continue;
            }
            let name = match path.file_name() {
                Some(name) => name.to_string_lossy().to_string(),
                None => continue,
            };
            let stem = stem_of(path).unwrap_or_default();
            let stem_lower = stem.to_lowercase();

            let kind = if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                if stem_lower.contains("screenshot") {
                    MediaKind::Screenshot
                } else {
                    MediaKind::Image
                }
            } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
                MediaKind::Video
            } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
                MediaKind::Audio
            } else {
                continue;
            };

            let mut paired_video = None;
            let mut kind = kind;
            if kind == MediaKind::Image {
                if let Some(parent) = path.parent() {
                    if let Some(movie) = movies.get(&(parent.to_path_buf(), stem_lower.clone())) {
                        paired_video = Some(movie.clone());
                        consumed.insert(movie.clone());
                        kind = MediaKind::LivePhoto;
                    }
                }
            }

            let relative = match path.strip_prefix(&self.root) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            skeletons.push(FsEntry {
                id: relative.to_string_lossy().replace('\\', "/"),
                path: path.clone(),
                kind,
                hidden: name.starts_with('.'),
                burst_extra: stem_lower.contains("burst") && !stem_lower.ends_with("_cover"),
                byte_size: 0,
                paired_video,
                capture_time: None,
                duration_secs: 0.0,
            });
        }

        // Movies consumed as motion components are not assets themselves.
        skeletons.retain(|entry| !consumed.contains(&entry.path));

        let entries: Vec<FsEntry> = skeletons
            .into_par_iter()
            .filter_map(|mut entry| {
                let metadata = match fs::metadata(&entry.path) {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        log::warn!("Skipping {}: {}", entry.path.display(), e);
                        return None;
                    }
                };
                entry.byte_size = metadata.len();

                let sidecar = read_sidecar(&entry.path);
                entry.capture_time = if entry.kind.is_image() {
                    read_exif_capture_time(&entry.path)
                        .or(sidecar.as_ref().and_then(|s| s.capture_time))
                } else {
                    sidecar.as_ref().and_then(|s| s.capture_time)
                };
                if entry.kind == MediaKind::Video {
                    entry.duration_secs = sidecar
                        .as_ref()
                        .and_then(|s| s.duration_secs)
                        .unwrap_or(0.0);
                }
                Some(entry)
            })
            .collect();

        let indexed = entries
            .iter()
            .map(|entry| (entry.id.clone(), entry.clone()))
            .collect();
        *self.index.write().unwrap() = Some(indexed);

        Ok(entries)
    }

    fn entry_for(&self, asset_id: &str) -> Result<FsEntry, StoreError> {
        {
            let index = self.index.read().unwrap();
            if let Some(entry) = index.as_ref().and_then(|map| map.get(asset_id)) {
                return Ok(entry.clone());
            }
        }
        // Not indexed yet, or a file that appeared after the last
        // walk. One rescan refreshes the index either way.
        let entries = self.scan_entries()?;
        entries
            .into_iter()
            .find(|entry| entry.id == asset_id)
            .ok_or_else(|| StoreError::NotFound(asset_id.to_string()))
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

fn stem_of(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().to_string())
}

fn read_sidecar(path: &Path) -> Option<SidecarMeta> {
    let name = path.file_name()?.to_string_lossy();
    let sidecar = path.with_file_name(format!("{}.json", name));
    let file = File::open(sidecar).ok()?;
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(meta) => Some(meta),
        Err(e) => {
            log::warn!("Ignoring malformed sidecar for {}: {}", path.display(), e);
            None
        }
    }
}

/// EXIF capture time, `DateTimeOriginal` first, plain `DateTime` as a
/// fallback. Unreadable files and files without EXIF yield `None`.
fn read_exif_capture_time(path: &Path) -> Option<DateTime<Utc>> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = Reader::new().read_from_container(&mut reader).ok()?;

    for tag in [Tag::DateTimeOriginal, Tag::DateTime] {
        if let Some(field) = exif.get_field(tag, In::PRIMARY) {
            if let Some(text) = exif_field_to_string(&field.value) {
                if let Some(parsed) = parse_exif_datetime(&text) {
                    return Some(parsed);
                }
            }
        }
    }
    None
}

fn exif_field_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(vec) => vec.first().map(|ascii| {
            String::from_utf8_lossy(ascii)
                .trim_end_matches('\0')
                .to_string()
        }),
        _ => None,
    }
}

/// EXIF datetime format: "YYYY:MM:DD HH:MM:SS".
fn parse_exif_datetime(datetime_str: &str) -> Option<DateTime<Utc>> {
    match chrono::NaiveDateTime::parse_from_str(datetime_str.trim(), "%Y:%m:%d %H:%M:%S") {
        Ok(dt) => Some(dt.and_utc()),
        Err(_) => {
            log::warn!("Failed to parse EXIF datetime: {}", datetime_str);
            None
        }
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn fetch_assets(&self, filter: AssetFilter) -> Result<Vec<AssetRecord>, StoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let entries = store.scan_entries()?;
            Ok(entries
                .iter()
                .filter(|entry| entry.matches(filter))
                .map(|entry| entry.record())
                .collect())
        })
        .await
        .map_err(|e| StoreError::Other(e.to_string()))?
    }

    async fn fetch_resources(&self, asset_id: &str) -> Result<Vec<ResourceInfo>, StoreError> {
        let store = self.clone();
        let id = asset_id.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = store.entry_for(&id)?;
            let mut resources = Vec::new();
            match entry.kind {
                MediaKind::Video => {
                    resources.push(ResourceInfo::new(ResourceKind::Video, Some(entry.byte_size)));
                }
                MediaKind::Audio => {
                    resources.push(ResourceInfo::new(
                        ResourceKind::Auxiliary,
                        Some(entry.byte_size),
                    ));
                }
                _ => {
                    resources.push(ResourceInfo::new(ResourceKind::Photo, Some(entry.byte_size)));
                    if let Some(movie) = &entry.paired_video {
                        let size = fs::metadata(movie).map(|m| m.len()).unwrap_or(0);
                        resources.push(ResourceInfo::new(ResourceKind::PairedVideo, Some(size)));
                    }
                }
            }
            Ok(resources)
        })
        .await
        .map_err(|e| StoreError::Other(e.to_string()))?
    }

    async fn fetch_thumbnail(
        &self,
        asset_id: &str,
        quality: ThumbnailQuality,
    ) -> Result<Thumbnail, StoreError> {
        let path = self.path_for(asset_id)?;
        let ext = extension_of(&path).unwrap_or_default();
        if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(StoreError::Decode(format!(
                "no thumbnail renderer for {}",
                asset_id
            )));
        }

        let edge = quality.target_edge();
        tokio::task::spawn_blocking(move || {
            let img = image::open(&path).map_err(|e| StoreError::Decode(e.to_string()))?;
            let resized = img.resize(edge, edge, FilterType::Lanczos3);
            Ok(Thumbnail::new(resized.to_rgba8()))
        })
        .await
        .map_err(|e| StoreError::Other(e.to_string()))?
    }

    fn open_video(&self, asset_id: &str) -> VideoRequest {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = VideoCancelHandle::new();

        let store = self.clone();
        let id = asset_id.to_string();
        let watch = cancel.clone();
        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || store.entry_for(&id)).await;
            if watch.is_cancelled() {
                return;
            }
            let event = match outcome {
                Ok(Ok(entry)) if entry.kind == MediaKind::Video => {
                    if entry.byte_size == 0 {
                        // Placeholder with no local bytes; nothing to
                        // stream from and nowhere to download from.
                        VideoFetchEvent::Failed(StoreError::NetworkUnavailable)
                    } else {
                        let _ = tx.send(VideoFetchEvent::Progress(1.0));
                        VideoFetchEvent::Finished {
                            handle: VideoHandle {
                                asset_id: entry.id.clone(),
                                uri: entry.path.to_string_lossy().to_string(),
                                duration_secs: entry.duration_secs,
                                byte_size: entry.byte_size,
                            },
                            degraded: false,
                        }
                    }
                }
                Ok(Ok(entry)) => VideoFetchEvent::Failed(StoreError::Other(format!(
                    "{} is not a video",
                    entry.id
                ))),
                Ok(Err(e)) => VideoFetchEvent::Failed(e),
                Err(e) => VideoFetchEvent::Failed(StoreError::Other(e.to_string())),
            };
            let _ = tx.send(event);
        });

        VideoRequest::new(rx, cancel)
    }

    async fn delete_assets(&self, ids: &[String]) -> Result<(), StoreError> {
        let mut paths = Vec::new();
        for id in ids {
            let path = self.path_for(id)?;
            if !path.is_file() {
                return Err(StoreError::NotFound(id.clone()));
            }
            paths.push(path);
        }

        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            // Stage renames first so a mid-batch failure can be rolled
            // back; nothing is unlinked until every rename succeeded.
            let staging = store
                .root
                .join(TRASH_DIR)
                .join(uuid::Uuid::new_v4().simple().to_string());
            fs::create_dir_all(&staging)?;

            let mut moved: Vec<(PathBuf, PathBuf)> = Vec::new();
            for (index, path) in paths.iter().enumerate() {
                let mut batch = vec![path.clone()];
                // Sidecars ride along with their asset.
                if let Some(name) = path.file_name() {
                    let sidecar = path.with_file_name(format!("{}.json", name.to_string_lossy()));
                    if sidecar.is_file() {
                        batch.push(sidecar);
                    }
                }
                // A same-stem movie is a motion component only next to
                // an image; next to a video it is an asset of its own.
                let ext = extension_of(path).unwrap_or_default();
                if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                    if let Some(stem) = stem_of(path) {
                        let movie = path.with_file_name(format!("{}.mov", stem));
                        if movie.is_file() {
                            batch.push(movie);
                        }
                    }
                }

                for (part, source) in batch.into_iter().enumerate() {
                    let target = staging.join(format!("{}_{}", index, part));
                    if let Err(e) = fs::rename(&source, &target) {
                        for (orig, staged) in moved.iter().rev() {
                            if let Err(undo) = fs::rename(staged, orig) {
                                log::warn!(
                                    "Rollback failed for {}: {}",
                                    orig.display(),
                                    undo
                                );
                            }
                        }
                        let _ = fs::remove_dir_all(&staging);
                        return Err(StoreError::Io(e));
                    }
                    moved.push((source, target));
                }
            }

            // Every rename landed; the indexed entries no longer
            // match the tree.
            *store.index.write().unwrap() = None;

            fs::remove_dir_all(&staging)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Other(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::new(width, height).save(&path).unwrap();
        path
    }

    fn write_bytes(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_classification_by_name_and_extension() {
        let temp = TempDir::new().unwrap();
        write_png(temp.path(), "IMG_0001.png", 4, 4);
        write_png(temp.path(), "Screenshot_2024.png", 4, 4);
        write_png(temp.path(), ".hidden.png", 4, 4);
        write_png(temp.path(), "IMG_burst_001.png", 4, 4);
        write_png(temp.path(), "IMG_burst_001_cover.png", 4, 4);
        write_bytes(temp.path(), "clip.mp4", b"not really a video");
        write_bytes(temp.path(), "memo.m4a", b"not really audio");
        write_bytes(temp.path(), "notes.txt", b"ignored");

        let store = FsMediaStore::new(temp.path());
        assert_eq!(store.count_assets(AssetFilter::All).await.unwrap(), 7);
        assert_eq!(store.count_assets(AssetFilter::Screenshots).await.unwrap(), 1);
        assert_eq!(store.count_assets(AssetFilter::Videos).await.unwrap(), 1);
        assert_eq!(store.count_assets(AssetFilter::Audio).await.unwrap(), 1);
        assert_eq!(store.count_assets(AssetFilter::Hidden).await.unwrap(), 1);
        assert_eq!(store.count_assets(AssetFilter::BurstExtras).await.unwrap(), 1);
        // Plain image plus the burst cover.
        assert_eq!(store.count_assets(AssetFilter::Photos).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_live_photo_pairing_folds_motion_file() {
        let temp = TempDir::new().unwrap();
        write_png(temp.path(), "IMG_0002.png", 4, 4);
        write_bytes(temp.path(), "IMG_0002.mov", b"motion component");
        write_bytes(temp.path(), "standalone.mov", b"a real movie");

        let store = FsMediaStore::new(temp.path());
        let photos = store.fetch_assets(AssetFilter::Photos).await.unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].kind, MediaKind::LivePhoto);

        // The paired movie is folded in; the standalone one is a video.
        let videos = store.fetch_assets(AssetFilter::Videos).await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].id, "standalone.mov");

        let resources = store.fetch_resources("IMG_0002.png").await.unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].kind, ResourceKind::Photo);
        assert_eq!(resources[1].kind, ResourceKind::PairedVideo);
    }

    #[tokio::test]
    async fn test_sidecar_supplies_capture_time_and_duration() {
        let temp = TempDir::new().unwrap();
        write_bytes(temp.path(), "clip.mp4", b"....");
        write_bytes(
            temp.path(),
            "clip.mp4.json",
            br#"{"capture_time": "2024-05-01T10:00:40Z", "duration_secs": 12.5}"#,
        );

        let store = FsMediaStore::new(temp.path());
        let videos = store.fetch_assets(AssetFilter::Videos).await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(
            videos[0].capture_time.unwrap().to_rfc3339(),
            "2024-05-01T10:00:40+00:00"
        );
        assert_eq!(videos[0].duration_secs, 12.5);
    }

    #[tokio::test]
    async fn test_zero_byte_file_is_cloud_placeholder() {
        let temp = TempDir::new().unwrap();
        write_bytes(temp.path(), "faraway.jpg", b"");

        let store = FsMediaStore::new(temp.path());
        let photos = store.fetch_assets(AssetFilter::Photos).await.unwrap();
        assert!(!photos[0].is_local);

        let resources = store.fetch_resources("faraway.jpg").await.unwrap();
        assert_eq!(resources[0].reported_size(), None);
    }

    #[tokio::test]
    async fn test_thumbnail_downscales_preserving_aspect() {
        let temp = TempDir::new().unwrap();
        write_png(temp.path(), "wide.png", 512, 300);

        let store = FsMediaStore::new(temp.path());
        let thumb = store
            .fetch_thumbnail("wide.png", ThumbnailQuality::Grid)
            .await
            .unwrap();
        assert_eq!(thumb.width(), 256);
        assert_eq!(thumb.height(), 150);
    }

    #[tokio::test]
    async fn test_thumbnail_for_video_is_a_decode_error() {
        let temp = TempDir::new().unwrap();
        write_bytes(temp.path(), "clip.mp4", b"....");

        let store = FsMediaStore::new(temp.path());
        assert!(matches!(
            store.fetch_thumbnail("clip.mp4", ThumbnailQuality::Grid).await,
            Err(StoreError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_open_video_delivers_local_file() {
        let temp = TempDir::new().unwrap();
        write_bytes(temp.path(), "clip.mp4", b"0123456789");

        let store = FsMediaStore::new(temp.path());
        let mut request = store.open_video("clip.mp4");
        let mut finished = None;
        while let Some(event) = request.events.recv().await {
            if let VideoFetchEvent::Finished { handle, degraded } = event {
                assert!(!degraded);
                finished = Some(handle);
            }
        }
        let handle = finished.unwrap();
        assert_eq!(handle.byte_size, 10);
        assert!(handle.uri.ends_with("clip.mp4"));
    }

    #[tokio::test]
    async fn test_delete_assets_removes_files_and_sidecars() {
        let temp = TempDir::new().unwrap();
        write_png(temp.path(), "a.png", 4, 4);
        write_bytes(temp.path(), "a.png.json", b"{}");
        write_png(temp.path(), "b.png", 4, 4);
        write_bytes(temp.path(), "b.mov", b"motion");

        let store = FsMediaStore::new(temp.path());
        store
            .delete_assets(&["a.png".to_string(), "b.png".to_string()])
            .await
            .unwrap();

        assert!(!temp.path().join("a.png").exists());
        assert!(!temp.path().join("a.png.json").exists());
        assert!(!temp.path().join("b.png").exists());
        assert!(!temp.path().join("b.mov").exists());
    }

    #[tokio::test]
    async fn test_delete_video_spares_same_stem_movie() {
        let temp = TempDir::new().unwrap();
        write_bytes(temp.path(), "clip.mp4", b"main feature");
        write_bytes(temp.path(), "clip.mov", b"different movie");

        let store = FsMediaStore::new(temp.path());
        // Two independent videos; no image means no pairing.
        assert_eq!(store.count_assets(AssetFilter::Videos).await.unwrap(), 2);

        store.delete_assets(&["clip.mp4".to_string()]).await.unwrap();

        assert!(!temp.path().join("clip.mp4").exists());
        assert!(temp.path().join("clip.mov").exists());
        let videos = store.fetch_assets(AssetFilter::Videos).await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].id, "clip.mov");
    }

    #[tokio::test]
    async fn test_delete_with_missing_id_changes_nothing() {
        let temp = TempDir::new().unwrap();
        write_png(temp.path(), "a.png", 4, 4);

        let store = FsMediaStore::new(temp.path());
        let err = store
            .delete_assets(&["a.png".to_string(), "ghost.png".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(temp.path().join("a.png").exists());
    }

    #[tokio::test]
    async fn test_asset_id_escaping_root_is_rejected() {
        let temp = TempDir::new().unwrap();
        let store = FsMediaStore::new(temp.path());
        let err = store
            .delete_assets(&["../outside.png".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Other(_)));
    }

    #[tokio::test]
    async fn test_per_asset_lookups_reuse_the_last_walk() {
        let temp = TempDir::new().unwrap();
        write_png(temp.path(), "a.png", 4, 4);
        write_bytes(temp.path(), "b.mp4", b"....");

        let store = FsMediaStore::new(temp.path());
        store.fetch_assets(AssetFilter::All).await.unwrap();

        // Removing the file behind the store's back does not break the
        // lookup: the indexed entry from the walk still answers.
        fs::remove_file(temp.path().join("b.mp4")).unwrap();
        let resources = store.fetch_resources("b.mp4").await.unwrap();
        assert_eq!(resources[0].kind, ResourceKind::Video);

        // An id the index has never seen triggers one fresh walk.
        write_png(temp.path(), "c.png", 4, 4);
        let fresh = store.fetch_resources("c.png").await.unwrap();
        assert_eq!(fresh[0].kind, ResourceKind::Photo);

        // That walk also noticed the removal.
        let err = store.fetch_resources("b.mp4").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_drops_the_id_index() {
        let temp = TempDir::new().unwrap();
        write_png(temp.path(), "a.png", 4, 4);
        write_png(temp.path(), "keep.png", 4, 4);

        let store = FsMediaStore::new(temp.path());
        store.fetch_assets(AssetFilter::All).await.unwrap();
        store.delete_assets(&["a.png".to_string()]).await.unwrap();

        // The delete emptied the index, so no stale entry answers.
        let err = store.fetch_resources("a.png").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.count_assets(AssetFilter::All).await.unwrap(), 1);
    }
}
