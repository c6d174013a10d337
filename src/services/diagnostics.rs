//! Library census.
//!
//! Counts per asset class are exact, taken in one pass over the store's
//! counters. The local-versus-cloud split is not: inspecting download
//! state is per-asset work, so it is measured on a bounded sample and
//! extrapolated. The result carries the sample size so callers can
//! label the numbers as estimates.

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::models::Diagnostics;
use crate::store::{AssetFilter, MediaStore, StoreError};

pub struct DiagnosticsService {
    store: Arc<dyn MediaStore>,
    sample_cap: usize,
}

impl DiagnosticsService {
    pub fn new(store: Arc<dyn MediaStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            sample_cap: config.diagnostics_sample_cap,
        }
    }

    pub async fn run(&self) -> Result<Diagnostics, StoreError> {
        let total_assets = self.store.count_assets(AssetFilter::All).await?;
        // "Images" means every still image the library shows by
        // default, so screenshots count too.
        let images = self.store.count_assets(AssetFilter::Photos).await?
            + self.store.count_assets(AssetFilter::Screenshots).await?;
        let videos = self.store.count_assets(AssetFilter::Videos).await?;
        let audio = self.store.count_assets(AssetFilter::Audio).await?;
        let hidden = self.store.count_assets(AssetFilter::Hidden).await?;
        let burst_extras = self.store.count_assets(AssetFilter::BurstExtras).await?;
        let all_photos_album = self.store.count_assets(AssetFilter::AllPhotosAlbum).await?;

        let (local_estimate, cloud_estimate, sampled) = self.estimate_local_split(total_assets).await?;

        Ok(Diagnostics {
            total_assets,
            images,
            videos,
            audio,
            hidden,
            burst_extras,
            all_photos_album,
            local_estimate,
            cloud_estimate,
            sampled,
        })
    }

    /// Inspect the first `sample_cap` assets in enumeration order and
    /// scale the observed local ratio up to the whole library. First-N
    /// keeps the sample deterministic for a given store state.
    async fn estimate_local_split(
        &self,
        total_assets: usize,
    ) -> Result<(usize, usize, usize), StoreError> {
        if total_assets == 0 || self.sample_cap == 0 {
            return Ok((0, 0, 0));
        }

        let records = self.store.fetch_assets(AssetFilter::All).await?;
        let sampled = records.len().min(self.sample_cap);
        if sampled == 0 {
            return Ok((0, 0, 0));
        }

        let local_in_sample = records[..sampled].iter().filter(|r| r.is_local).count();
        let ratio = local_in_sample as f64 / sampled as f64;
        let local_estimate = ((total_assets as f64) * ratio).round() as usize;
        let cloud_estimate = total_assets.saturating_sub(local_estimate);
        Ok((local_estimate, cloud_estimate, sampled))
    }
}
