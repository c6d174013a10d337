use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Media type of a library asset as the cleanup pipeline sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Video,
    Screenshot,
    LivePhoto,
    /// Voice memos and the like; counted by diagnostics, never cleaned.
    Audio,
}

impl MediaKind {
    pub fn is_video(&self) -> bool {
        matches!(self, MediaKind::Video)
    }

    /// Screenshots and live photos are still images at the library level.
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            MediaKind::Image | MediaKind::Screenshot | MediaKind::LivePhoto
        )
    }
}

/// A decoded, downsized image owned by the thumbnail layer.
///
/// Cloning is cheap (shared pixel buffer); the byte cost feeds the
/// thumbnail cache's budget accounting.
#[derive(Clone)]
pub struct Thumbnail {
    pixels: Arc<RgbaImage>,
}

impl Thumbnail {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Approximate in-memory cost in bytes (RGBA, 4 bytes per pixel).
    pub fn byte_cost(&self) -> usize {
        self.pixels.width() as usize * self.pixels.height() as usize * 4
    }
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// One photo or video record produced by a scan.
///
/// Identity is the library identifier alone: two items with the same `id`
/// are the same asset regardless of thumbnail state. Items are rebuilt
/// fresh on every full scan and never persisted as mutable objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub kind: MediaKind,
    pub capture_time: Option<DateTime<Utc>>,
    pub byte_size: u64,
    /// Playable length in seconds; 0.0 for still images.
    pub duration_secs: f64,
    #[serde(skip)]
    pub thumbnail: Option<Thumbnail>,
}

impl MediaItem {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
            capture_time: None,
            byte_size: 0,
            duration_secs: 0.0,
            thumbnail: None,
        }
    }

    pub fn formatted_size(&self) -> String {
        format_byte_size(self.byte_size)
    }
}

impl PartialEq for MediaItem {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MediaItem {}

impl Hash for MediaItem {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A near-duplicate cluster: assets captured within the same minute.
///
/// `date_key` doubles as the grouping key and the sort key; `items` are
/// ordered newest-first and there are always at least two of them. A
/// group that would drop below two members is pruned instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarGroup {
    pub date_key: String,
    pub items: Vec<MediaItem>,
}

impl SimilarGroup {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(|i| i.byte_size).sum()
    }
}

/// The fixed set of cleanup categories a scan produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoryKind {
    SimilarPhotos,
    SimilarVideos,
    SimilarScreenshots,
    Screenshots,
    AllVideos,
    LargeVideos,
    Others,
}

impl CategoryKind {
    /// Categories that carry per-minute duplicate groups alongside the
    /// flat item list.
    pub fn has_similar_groups(&self) -> bool {
        matches!(
            self,
            CategoryKind::SimilarPhotos
                | CategoryKind::SimilarVideos
                | CategoryKind::SimilarScreenshots
        )
    }

    pub fn title(&self) -> &'static str {
        match self {
            CategoryKind::SimilarPhotos => "Similar Photos",
            CategoryKind::SimilarVideos => "Similar Videos",
            CategoryKind::SimilarScreenshots => "Similar Screenshots",
            CategoryKind::Screenshots => "Screenshots",
            CategoryKind::AllVideos => "All Videos",
            CategoryKind::LargeVideos => "Large Videos",
            CategoryKind::Others => "Others",
        }
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// One category's worth of scan results.
///
/// For group-bearing kinds, `items` is always the order-preserving
/// flatten of `groups`; every mutation goes through methods that keep
/// the two in lockstep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryData {
    pub kind: CategoryKind,
    pub items: Vec<MediaItem>,
    pub groups: Option<Vec<SimilarGroup>>,
}

impl CategoryData {
    pub fn new(kind: CategoryKind, items: Vec<MediaItem>) -> Self {
        Self {
            kind,
            items,
            groups: None,
        }
    }

    /// Build a group-bearing category; the flat item list is derived
    /// from the groups, preserving group order.
    pub fn from_groups(kind: CategoryKind, groups: Vec<SimilarGroup>) -> Self {
        let items = groups
            .iter()
            .flat_map(|g| g.items.iter().cloned())
            .collect();
        Self {
            kind,
            items,
            groups: Some(groups),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(|i| i.byte_size).sum()
    }

    /// Remove the given assets from both the flat list and any groups,
    /// pruning groups that fall below two members. Returns how many
    /// items were removed from the flat list.
    pub fn remove_items(&mut self, ids: &HashSet<String>) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !ids.contains(&item.id));

        if let Some(groups) = &mut self.groups {
            for group in groups.iter_mut() {
                group.items.retain(|item| !ids.contains(&item.id));
            }
            groups.retain(|g| g.items.len() >= 2);
            // Items orphaned by group pruning leave the flat list too.
            let surviving: HashSet<&str> = groups
                .iter()
                .flat_map(|g| g.items.iter().map(|i| i.id.as_str()))
                .collect();
            self.items.retain(|item| surviving.contains(item.id.as_str()));
        }

        before - self.items.len()
    }

    /// True when the flat list mirrors the flattened groups exactly.
    /// Non-grouped categories are trivially consistent.
    pub fn is_consistent(&self) -> bool {
        match &self.groups {
            None => true,
            Some(groups) => {
                let flattened: Vec<&str> = groups
                    .iter()
                    .flat_map(|g| g.items.iter().map(|i| i.id.as_str()))
                    .collect();
                let items: Vec<&str> = self.items.iter().map(|i| i.id.as_str()).collect();
                flattened == items && groups.iter().all(|g| g.items.len() >= 2)
            }
        }
    }
}

/// Library-wide counts taken at a single point in time.
///
/// `local_estimate`/`cloud_estimate` come from sampling, not a full
/// enumeration: they are the sampled ratio times the asset total,
/// nothing stronger. Never mutated; a new scan replaces the whole value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub total_assets: usize,
    pub images: usize,
    pub videos: usize,
    pub audio: usize,
    pub hidden: usize,
    pub burst_extras: usize,
    pub all_photos_album: usize,
    pub local_estimate: usize,
    pub cloud_estimate: usize,
    /// How many assets the local/cloud split actually inspected.
    pub sampled: usize,
}

/// Render a byte count in 1024-based units, one decimal from KB up.
/// Deterministic so large-file labels stay stable across scans.
pub fn format_byte_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{:.1} {}", value, unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(id: &str, kind: MediaKind) -> MediaItem {
        MediaItem::new(id, kind)
    }

    fn group(key: &str, ids: &[&str]) -> SimilarGroup {
        SimilarGroup {
            date_key: key.to_string(),
            items: ids.iter().map(|id| item(id, MediaKind::Image)).collect(),
        }
    }

    #[test]
    fn test_identity_is_by_id_alone() {
        let mut a = item("ast_1", MediaKind::Image);
        let mut b = item("ast_1", MediaKind::Image);
        a.byte_size = 100;
        b.byte_size = 999;
        b.thumbnail = Some(Thumbnail::new(RgbaImage::new(2, 2)));

        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_from_groups_flattens_in_order() {
        let data = CategoryData::from_groups(
            CategoryKind::SimilarPhotos,
            vec![group("2024-05-01 12:00", &["c", "d"]), group("2024-05-01 10:00", &["a", "b", "e"])],
        );

        let ids: Vec<&str> = data.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d", "a", "b", "e"]);
        assert!(data.is_consistent());
    }

    #[test]
    fn test_remove_items_prunes_thin_groups() {
        let mut data = CategoryData::from_groups(
            CategoryKind::SimilarPhotos,
            vec![group("12:00", &["a", "b"]), group("10:00", &["c", "d", "e"])],
        );

        // Dropping "a" leaves its group with one member; the group goes
        // away and "b" leaves the flat list with it.
        let ids: HashSet<String> = ["a".to_string()].into_iter().collect();
        data.remove_items(&ids);

        assert_eq!(data.groups.as_ref().unwrap().len(), 1);
        let flat: Vec<&str> = data.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(flat, vec!["c", "d", "e"]);
        assert!(data.is_consistent());
    }

    #[test]
    fn test_remove_items_from_flat_category() {
        let mut data = CategoryData::new(
            CategoryKind::Screenshots,
            vec![item("a", MediaKind::Screenshot), item("b", MediaKind::Screenshot)],
        );
        let ids: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(data.remove_items(&ids), 1);
        assert_eq!(data.len(), 1);
        assert!(data.is_consistent());
    }

    #[test]
    fn test_capture_time_survives_serde() {
        let mut original = item("ast_9", MediaKind::Video);
        original.capture_time = Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 40).unwrap());
        original.byte_size = 1234;

        let json = serde_json::to_string(&original).unwrap();
        let restored: MediaItem = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
        assert_eq!(restored.capture_time, original.capture_time);
        assert!(restored.thumbnail.is_none());
    }

    #[test]
    fn test_format_byte_size() {
        assert_eq!(format_byte_size(0), "0 B");
        assert_eq!(format_byte_size(512), "512 B");
        assert_eq!(format_byte_size(2048), "2.0 KB");
        assert_eq!(format_byte_size(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(format_byte_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
