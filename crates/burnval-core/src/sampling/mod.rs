//! Sampling design for the validation tiles.
//!
//! Exposes the sub-modules and the top-level [`SamplingDesign`] pipeline:
//! stratify → filter → allocate → summarize.

pub mod allocate;
pub mod params;
pub mod stratify;

pub use allocate::{allocate, summarize, StratumAllocation, StratumSummary};
pub use params::{biome_code, biome_code_label, AllocationParams, BaProduct, BIOME_CODES, FIRST_YEAR};
pub use stratify::{filter_eligible, fire_activity_thresholds, quantile, stratify, FireActivity, StratifiedTile, TileRecord};

use crate::error::AllocationError;
use crate::units::StratumPopulation;

/// All outputs of the sampling pipeline for one year.
#[derive(Debug, Clone)]
pub struct SamplingDesign {
    /// Every candidate tile with its stratum.
    pub stratified: Vec<StratifiedTile>,
    /// Tiles passing the land and cloud filters.
    pub eligible: Vec<StratifiedTile>,
    pub allocation: Vec<StratumAllocation>,
    pub summary: Vec<StratumSummary>,
}

impl SamplingDesign {
    pub fn build(tiles: &[TileRecord], params: &AllocationParams) -> Result<Self, AllocationError> {
        let stratified = stratify(tiles, params)?;
        let eligible = filter_eligible(&stratified, params);
        tracing::info!(
            year = params.year,
            product = %params.product,
            candidates = stratified.len(),
            eligible = eligible.len(),
            "stratified tiles"
        );
        let allocation = allocate(&eligible, params)?;
        let summary = summarize(&eligible, &allocation);
        Ok(Self { stratified, eligible, allocation, summary })
    }

    /// Population counts keyed by stratum id, ready for the estimator.
    pub fn population(&self) -> Vec<StratumPopulation> {
        self.summary.iter().map(StratumSummary::to_population).collect()
    }

    pub fn sample_size(&self) -> usize {
        self.summary.iter().map(|s| s.n).sum()
    }
}
