//! Minute-bucket duplicate grouping.
//!
//! Pure functions over already-fetched items: no store access, no
//! clocks, same input always gives the same output. Assets shot within
//! the same calendar minute (UTC) land in one group; anything without a
//! capture time is left out entirely.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::models::{MediaItem, SimilarGroup};

/// Grouping key: the capture time truncated to the minute, rendered
/// with a fixed numeric format. Zero-padded fields make the
/// lexicographic order of keys match chronological order, and the
/// format never varies with locale or a 12-hour clock setting.
pub fn minute_key(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M").to_string()
}

/// Bucket items by capture minute and keep only buckets with at least
/// two members.
///
/// Returns the flattened item list and the groups it was derived from.
/// Groups are ordered newest minute first; within a group items are
/// newest first, with input order preserved for equal timestamps.
pub fn group_similar(items: &[MediaItem]) -> (Vec<MediaItem>, Vec<SimilarGroup>) {
    let mut buckets: BTreeMap<String, Vec<MediaItem>> = BTreeMap::new();
    for item in items {
        let Some(time) = item.capture_time else {
            continue;
        };
        buckets.entry(minute_key(&time)).or_default().push(item.clone());
    }

    let mut groups = Vec::new();
    for (date_key, mut members) in buckets.into_iter().rev() {
        if members.len() < 2 {
            continue;
        }
        // Stable sort: ties keep their fetch order.
        members.sort_by(|a, b| b.capture_time.cmp(&a.capture_time));
        groups.push(SimilarGroup {
            date_key,
            items: members,
        });
    }

    let flattened = groups
        .iter()
        .flat_map(|g| g.items.iter().cloned())
        .collect();
    (flattened, groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaKind;
    use chrono::TimeZone;

    fn shot(id: &str, h: u32, m: u32, s: u32) -> MediaItem {
        let mut item = MediaItem::new(id, MediaKind::Image);
        item.capture_time = Some(Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap());
        item
    }

    #[test]
    fn test_burst_of_five_groups_as_three_plus_two() {
        let items = vec![
            shot("p1", 10, 0, 0),
            shot("p2", 10, 0, 10),
            shot("p3", 10, 0, 40),
            shot("p4", 12, 0, 0),
            shot("p5", 12, 0, 5),
        ];

        let (flattened, groups) = group_similar(&items);

        assert_eq!(groups.len(), 2);
        // Newest minute first.
        assert_eq!(groups[0].date_key, "2024-05-01 12:00");
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].date_key, "2024-05-01 10:00");
        assert_eq!(groups[1].len(), 3);
        assert_eq!(flattened.len(), 5);

        // Flat list mirrors group order exactly.
        let ids: Vec<&str> = flattened.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["p5", "p4", "p3", "p2", "p1"]);
    }

    #[test]
    fn test_items_without_capture_time_are_excluded() {
        let mut undated = MediaItem::new("undated", MediaKind::Image);
        undated.capture_time = None;
        let items = vec![shot("a", 9, 30, 0), undated, shot("b", 9, 30, 59)];

        let (flattened, groups) = group_similar(&items);
        assert_eq!(groups.len(), 1);
        assert_eq!(flattened.len(), 2);
        assert!(flattened.iter().all(|i| i.id != "undated"));
    }

    #[test]
    fn test_singletons_are_dropped() {
        let items = vec![shot("lone", 8, 0, 0), shot("a", 9, 0, 1), shot("b", 9, 0, 2)];

        let (flattened, groups) = group_similar(&items);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].date_key, "2024-05-01 09:00");
        assert_eq!(flattened.len(), 2);
    }

    #[test]
    fn test_newest_first_within_group_with_stable_ties() {
        // Same second: input order must survive the sort.
        let items = vec![
            shot("first", 10, 0, 5),
            shot("second", 10, 0, 5),
            shot("newest", 10, 0, 30),
        ];

        let (_, groups) = group_similar(&items);
        let ids: Vec<&str> = groups[0].items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["newest", "first", "second"]);
    }

    #[test]
    fn test_boundary_seconds_split_into_different_minutes() {
        // 10:00:59 and 10:01:00 are 1s apart but never group together.
        let items = vec![
            shot("x", 10, 0, 59),
            shot("y", 10, 1, 0),
            shot("z", 10, 1, 30),
        ];

        let (_, groups) = group_similar(&items);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].date_key, "2024-05-01 10:01");
    }

    #[test]
    fn test_minute_key_is_fixed_format() {
        // Afternoon times must render on a 24-hour clock, no AM/PM.
        let key = minute_key(&Utc.with_ymd_and_hms(2024, 5, 1, 23, 7, 59).unwrap());
        assert_eq!(key, "2024-05-01 23:07");
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let items = vec![shot("a", 10, 0, 0), shot("b", 10, 0, 1), shot("c", 11, 0, 0)];
        let first = group_similar(&items);
        let second = group_similar(&items);
        assert_eq!(first.0, second.0);
        assert_eq!(
            first.1.iter().map(|g| &g.date_key).collect::<Vec<_>>(),
            second.1.iter().map(|g| &g.date_key).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_regrouping_flattened_output_reproduces_groups() {
        let items = vec![
            shot("p1", 10, 0, 0),
            shot("p2", 10, 0, 10),
            shot("lone", 11, 0, 0),
            shot("p4", 12, 0, 0),
            shot("p5", 12, 0, 5),
        ];

        // The flat list is a fixed point: it is already sorted the way
        // the grouper sorts, and every member belongs to some group.
        let (flattened, groups) = group_similar(&items);
        let (reflattened, regroups) = group_similar(&flattened);
        assert_eq!(reflattened, flattened);
        assert_eq!(regroups, groups);
    }
}
