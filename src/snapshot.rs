//! Scan result persistence.
//!
//! A snapshot is the last published [`LibraryState`] serialized to
//! disk, so the next launch can show categories instantly while a real
//! rescan runs. Thumbnails are never persisted; restored items come
//! back bare and are re-warmed like any other.

use std::fs;
use std::path::PathBuf;

use crate::services::cleanup::LibraryState;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Where scan results are parked between runs. Implementations must
/// make `save` all-or-nothing: a crash mid-save may lose the new
/// snapshot but never leaves a torn one behind.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, state: &LibraryState) -> Result<(), SnapshotError>;
    fn load(&self) -> Result<Option<LibraryState>, SnapshotError>;
    fn invalidate(&self) -> Result<(), SnapshotError>;
}

/// Single-file JSON snapshot. Saves write a sibling temp file and
/// rename it over the target, which is atomic on the filesystems we
/// care about.
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "snapshot.json".to_string());
        name.push_str(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn save(&self, state: &LibraryState) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let temp = self.temp_path();
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<LibraryState>, SnapshotError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&json)?))
    }

    fn invalidate(&self) -> Result<(), SnapshotError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryData, CategoryKind, MediaItem, MediaKind, SimilarGroup, Thumbnail};
    use chrono::{TimeZone, Utc};
    use image::RgbaImage;
    use tempfile::TempDir;

    fn sample_state() -> LibraryState {
        let mut a = MediaItem::new("a", MediaKind::Image);
        a.capture_time = Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        a.byte_size = 100;
        // Thumbnails must not survive persistence.
        a.thumbnail = Some(Thumbnail::new(RgbaImage::new(2, 2)));
        let mut b = MediaItem::new("b", MediaKind::Image);
        b.capture_time = Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 30).unwrap());
        b.byte_size = 200;

        let group = SimilarGroup {
            date_key: "2024-05-01 10:00".to_string(),
            items: vec![b, a],
        };
        LibraryState {
            scan_id: Some("scan_test".to_string()),
            scanned_at: Some(Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap()),
            categories: vec![
                CategoryData::from_groups(CategoryKind::SimilarPhotos, vec![group]),
                CategoryData::new(CategoryKind::Screenshots, vec![]),
            ],
            ..LibraryState::default()
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(temp.path().join("snapshot.json"));

        let state = sample_state();
        store.save(&state).unwrap();
        let restored = store.load().unwrap().unwrap();

        assert_eq!(restored.scan_id, state.scan_id);
        assert_eq!(restored.scanned_at, state.scanned_at);
        assert_eq!(restored.categories.len(), 2);
        let similar = &restored.categories[0];
        assert_eq!(similar.len(), 2);
        assert!(similar.is_consistent());
        // Bare after restore.
        assert!(similar.items.iter().all(|i| i.thumbnail.is_none()));
    }

    #[test]
    fn test_load_without_snapshot_is_none() {
        let temp = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(temp.path().join("snapshot.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("snapshot.json");
        let store = JsonSnapshotStore::new(&path);
        store.save(&sample_state()).unwrap();

        assert!(path.exists());
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_invalidate_removes_snapshot_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(temp.path().join("snapshot.json"));
        store.save(&sample_state()).unwrap();

        store.invalidate().unwrap();
        assert!(store.load().unwrap().is_none());
        store.invalidate().unwrap();
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("snapshot.json");
        fs::write(&path, b"{ not json").unwrap();

        let store = JsonSnapshotStore::new(&path);
        assert!(matches!(store.load(), Err(SnapshotError::Serde(_))));
    }
}
