pub mod cleanup;
pub mod diagnostics;
pub mod fetcher;
pub mod grouping;
pub mod thumbnails;
pub mod video;

pub use cleanup::{CleanupService, LibraryState, ScanEvent};
pub use diagnostics::DiagnosticsService;
pub use fetcher::MetadataFetcher;
pub use thumbnails::ThumbnailService;
pub use video::{VideoError, VideoLoadState, VideoPlayer, VideoService};
