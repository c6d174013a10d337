//! Core pipeline for photo-library cleanup: asset metadata fetching,
//! minute-bucket duplicate grouping, bounded thumbnail loading, video
//! load orchestration, and the scan/delete lifecycle that ties them
//! together.
//!
//! The crate is UI-agnostic. A frontend drives [`CleanupService`] (or
//! the narrower services directly) against any [`MediaStore`]; a
//! filesystem-backed store and a scriptable in-memory store ship in
//! [`store`].

pub mod config;
pub mod models;
pub mod services;
pub mod snapshot;
pub mod store;

pub use config::PipelineConfig;
pub use models::{
    CategoryData, CategoryKind, Diagnostics, MediaItem, MediaKind, SimilarGroup, Thumbnail,
};
pub use services::{
    CleanupService, DiagnosticsService, LibraryState, MetadataFetcher, ScanEvent, ThumbnailService,
    VideoLoadState, VideoService,
};
pub use snapshot::{JsonSnapshotStore, SnapshotStore};
pub use store::{
    AssetFilter, FsMediaStore, MediaStore, MemoryMediaStore, StoreError, ThumbnailQuality,
};
