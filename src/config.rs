use std::time::Duration;

/// Byte threshold above which a video counts as "large" (10 MiB).
pub const LARGE_VIDEO_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Assumed bitrate for videos whose resources report no byte size:
/// 1 MiB per second of footage.
pub const ESTIMATED_VIDEO_BYTES_PER_SECOND: u64 = 1_048_576;

/// Tunables for the scan and loading pipeline.
///
/// Defaults match production behavior; tests narrow them to provoke
/// eviction and timeout paths quickly.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum thumbnail generation requests in flight at once.
    pub thumbnail_gate_width: usize,
    /// Thumbnail cache entry ceiling.
    pub thumbnail_cache_max_entries: usize,
    /// Thumbnail cache byte ceiling.
    pub thumbnail_cache_max_bytes: usize,
    /// How many leading items each category warms eagerly after a scan.
    pub preview_thumbnail_count: usize,
    /// Extra rows fetched on either side of the visible range.
    pub viewport_margin: usize,
    /// Decoded video handles kept hot, least-recently-used out.
    pub video_handle_cache_size: usize,
    /// How long a video load may run before it is abandoned.
    pub video_load_timeout: Duration,
    /// Upper bound on assets inspected for the local/cloud estimate.
    pub diagnostics_sample_cap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thumbnail_gate_width: 6,
            thumbnail_cache_max_entries: 200,
            thumbnail_cache_max_bytes: 50 * 1024 * 1024,
            preview_thumbnail_count: 3,
            viewport_margin: 10,
            video_handle_cache_size: 5,
            video_load_timeout: Duration::from_secs(60),
            diagnostics_sample_cap: 100,
        }
    }
}

impl PipelineConfig {
    pub fn with_thumbnail_gate_width(mut self, width: usize) -> Self {
        self.thumbnail_gate_width = width;
        self
    }

    pub fn with_thumbnail_cache_limits(mut self, max_entries: usize, max_bytes: usize) -> Self {
        self.thumbnail_cache_max_entries = max_entries;
        self.thumbnail_cache_max_bytes = max_bytes;
        self
    }

    pub fn with_preview_thumbnail_count(mut self, count: usize) -> Self {
        self.preview_thumbnail_count = count;
        self
    }

    pub fn with_viewport_margin(mut self, margin: usize) -> Self {
        self.viewport_margin = margin;
        self
    }

    pub fn with_video_handle_cache_size(mut self, size: usize) -> Self {
        self.video_handle_cache_size = size;
        self
    }

    pub fn with_video_load_timeout(mut self, timeout: Duration) -> Self {
        self.video_load_timeout = timeout;
        self
    }

    pub fn with_diagnostics_sample_cap(mut self, cap: usize) -> Self {
        self.diagnostics_sample_cap = cap;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.thumbnail_gate_width, 6);
        assert_eq!(config.thumbnail_cache_max_entries, 200);
        assert_eq!(config.thumbnail_cache_max_bytes, 50 * 1024 * 1024);
        assert_eq!(config.preview_thumbnail_count, 3);
        assert_eq!(config.viewport_margin, 10);
        assert_eq!(config.video_handle_cache_size, 5);
        assert_eq!(config.video_load_timeout, Duration::from_secs(60));
        assert_eq!(config.diagnostics_sample_cap, 100);
    }

    #[test]
    fn test_builder_overrides() {
        let config = PipelineConfig::default()
            .with_thumbnail_gate_width(2)
            .with_video_load_timeout(Duration::from_millis(50))
            .with_thumbnail_cache_limits(4, 1024);
        assert_eq!(config.thumbnail_gate_width, 2);
        assert_eq!(config.video_load_timeout, Duration::from_millis(50));
        assert_eq!(config.thumbnail_cache_max_entries, 4);
        assert_eq!(config.thumbnail_cache_max_bytes, 1024);
    }

    #[test]
    fn test_large_video_threshold() {
        assert_eq!(LARGE_VIDEO_THRESHOLD, 10_485_760);
    }
}
