//! Sample-size allocation across strata.
//!
//! Allocation is proportional to N_h · sqrt(BA_h), where N_h is the number of
//! eligible tiles in the stratum and BA_h their mean burned percentage. The
//! rescaled allocation is nudged to hit the requested total, every stratum
//! receives at least `min_per_stratum` units and none receives more than it
//! holds.
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::AllocationError;
use crate::sampling::params::{biome_code_label, AllocationParams};
use crate::sampling::stratify::{FireActivity, StratifiedTile};
use crate::units::StratumPopulation;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StratumAllocation {
    pub stratum: String,
    /// Eligible tiles in the stratum.
    pub n_pop: usize,
    pub ba_mean: f64,
    /// Allocation before capping at `n_pop`.
    pub allocated: usize,
    /// Units that can actually be selected.
    pub n: usize,
}

/// One row of the sampling summary, keyed by stratum id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StratumSummary {
    #[serde(rename = "Stratum")]
    pub index: usize,
    #[serde(rename = "strata")]
    pub id_stratum: String,
    pub biome_group: String,
    pub biome: String,
    pub ba: FireActivity,
    #[serde(rename = "Nh")]
    pub n_pop: usize,
    #[serde(rename = "nh")]
    pub n: usize,
}

impl StratumSummary {
    pub fn to_population(&self) -> StratumPopulation {
        StratumPopulation::new(self.id_stratum.clone(), self.n_pop as f64)
    }
}

/// Strata with `k` largest allocations, ties broken by stratum order.
fn largest(alloc: &[i64], k: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..alloc.len()).collect();
    idx.sort_by_key(|&i| Reverse(alloc[i]));
    idx.truncate(k);
    idx
}

pub fn allocate(
    eligible: &[StratifiedTile],
    params: &AllocationParams,
) -> Result<Vec<StratumAllocation>, AllocationError> {
    if eligible.is_empty() {
        return Err(AllocationError::NoEligibleTiles);
    }

    // (tiles, tiles with burned area, burned-area sum); NaN values count
    // towards N_h but not towards the mean.
    let mut groups: BTreeMap<&str, (usize, usize, f64)> = BTreeMap::new();
    for t in eligible {
        let g = groups.entry(t.stratum.as_str()).or_default();
        g.0 += 1;
        if !t.tile.burned_perc.is_nan() {
            g.1 += 1;
            g.2 += t.tile.burned_perc;
        }
    }
    let strata: Vec<(&str, usize, f64)> = groups
        .into_iter()
        .map(|(s, (n, valid, sum))| (s, n, if valid > 0 { sum / valid as f64 } else { f64::NAN }))
        .collect();

    let raw: Vec<i64> = strata
        .iter()
        .map(|&(_, n, ba)| if ba.is_nan() { 0 } else { (n as f64 * ba.sqrt()).round_ties_even() as i64 })
        .collect();
    let raw_total: i64 = raw.iter().sum();
    if raw_total == 0 {
        return Err(AllocationError::NoFireActivity);
    }

    let total = params.total_sample_size as i64;
    let mut alloc: Vec<i64> = raw
        .iter()
        .map(|&r| (r as f64 / raw_total as f64 * total as f64).round_ties_even() as i64)
        .collect();

    let difference = total - alloc.iter().sum::<i64>();
    let floor = params.min_per_stratum as i64;
    if difference > 0 {
        for i in largest(&alloc, difference as usize) {
            alloc[i] += 1;
        }
    } else if difference < 0 {
        for i in largest(&alloc, difference.unsigned_abs() as usize) {
            if alloc[i] > floor {
                alloc[i] -= 1;
            }
        }
    }
    for a in alloc.iter_mut() {
        *a = (*a).max(floor);
    }

    let out: Vec<StratumAllocation> = strata
        .iter()
        .zip(&alloc)
        .map(|(&(stratum, n_pop, ba_mean), &a)| {
            let allocated = a as usize;
            StratumAllocation {
                stratum: stratum.to_string(),
                n_pop,
                ba_mean,
                allocated,
                n: allocated.min(n_pop),
            }
        })
        .collect();

    tracing::debug!(
        strata = out.len(),
        requested = params.total_sample_size,
        allocated = out.iter().map(|a| a.n).sum::<usize>(),
        "sample allocation"
    );
    Ok(out)
}

/// Summarize eligible tiles and their allocation per stratum id.
pub fn summarize(eligible: &[StratifiedTile], allocation: &[StratumAllocation]) -> Vec<StratumSummary> {
    let selected: BTreeMap<&str, usize> =
        allocation.iter().map(|a| (a.stratum.as_str(), a.n)).collect();

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut by_id: BTreeMap<&str, (&StratifiedTile, usize, usize)> = BTreeMap::new();
    for t in eligible {
        let e = by_id.entry(t.id_stratum.as_str()).or_insert((t, 0, 0));
        e.1 += 1;
        // Unknown biomes share an id; their strata pool selections.
        if seen.insert(t.stratum.as_str()) {
            e.2 += selected.get(t.stratum.as_str()).copied().unwrap_or(0);
        }
    }

    by_id
        .into_iter()
        .enumerate()
        .map(|(i, (id, (first, n_pop, n)))| StratumSummary {
            index: i + 1,
            id_stratum: id.to_string(),
            biome_group: first.tile.biome.clone(),
            biome: biome_code_label(&first.tile.biome),
            ba: first.activity,
            n_pop,
            n,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::stratify::{filter_eligible, stratify, TileRecord};
    use approx::assert_relative_eq;

    fn tiles(biome: &str, burned: &[f64]) -> Vec<TileRecord> {
        burned
            .iter()
            .enumerate()
            .map(|(i, &b)| TileRecord {
                name: format!("{biome}-{i}"),
                biome: biome.to_string(),
                burned_perc: b,
                land_perc: 100.0,
                nocloudy_interval: Some(1.0),
            })
            .collect()
    }

    fn eligible(params: &AllocationParams) -> Vec<StratifiedTile> {
        let mut all = tiles("Tropical Savanna", &[0.0, 1.0, 2.0, 4.0, 9.0, 16.0, 25.0, 36.0, 49.0, 64.0]);
        all.extend(tiles("Boreal Forest", &[0.0, 0.0, 0.0, 1.0, 1.0, 4.0]));
        let strat = stratify(&all, params).unwrap();
        filter_eligible(&strat, params)
    }

    #[test]
    fn allocation_hits_total_and_floor() {
        let params = AllocationParams { total_sample_size: 20, ..Default::default() };
        let alloc = allocate(&eligible(&params), &params).unwrap();
        assert_eq!(alloc.len(), 4);
        assert!(alloc.iter().all(|a| a.n >= 2 || a.n == a.n_pop));
        assert!(alloc.iter().all(|a| a.n <= a.n_pop));
        let names: Vec<&str> = alloc.iter().map(|a| a.stratum.as_str()).collect();
        assert_eq!(
            names,
            ["Boreal Forest_high", "Boreal Forest_low", "Tropical Savanna_high", "Tropical Savanna_low"]
        );
        // Savanna high: 2 tiles (49, 64) → capped at N_h.
        assert_eq!(alloc[2].n_pop, 2);
        assert_eq!(alloc[2].n, 2);
    }

    #[test]
    fn rounding_difference_goes_to_largest_strata() {
        let params = AllocationParams { total_sample_size: 7, ..Default::default() };
        let alloc = allocate(&eligible(&params), &params).unwrap();
        // Rescaled [0, 0, 2, 4] sums to 6; the missing unit goes to the
        // largest stratum before the floor lifts the small ones.
        let allocated: Vec<usize> = alloc.iter().map(|a| a.allocated).collect();
        assert_eq!(allocated, [2, 2, 2, 5]);
        assert_eq!(alloc[0].n, 1);
    }

    #[test]
    fn rescaled_allocation_sums_to_total() {
        let params = AllocationParams { total_sample_size: 40, ..Default::default() };
        let tiles = tiles("Tropical Savanna", &[0.0, 1.0, 2.0, 4.0, 9.0, 16.0, 25.0, 36.0, 49.0, 64.0]);
        let strat = stratify(&tiles, &params).unwrap();
        let alloc = allocate(&strat, &params).unwrap();
        // Raw weights 15 and 27 rescale to 14.3 and 25.7.
        let allocated: Vec<usize> = alloc.iter().map(|a| a.allocated).collect();
        assert_eq!(allocated, [14, 26]);
        assert_eq!(alloc[0].n, 2);
        assert_eq!(alloc[1].n, 8);
    }

    #[test]
    fn missing_burned_area_counts_in_population_not_mean() {
        let params = AllocationParams { total_sample_size: 10, ..Default::default() };
        let mut all = tiles("Tundra", &[0.0, 4.0, 4.0, 16.0, 100.0]);
        all[0].burned_perc = f64::NAN;
        let strat = stratify(&all, &params).unwrap();
        let alloc = allocate(&strat, &params).unwrap();
        // Threshold over [4, 4, 16, 100] is 49.6: low holds the NaN tile
        // plus 4, 4, 16 with mean 8.
        let low = alloc.iter().find(|a| a.stratum == "Tundra_low").unwrap();
        assert_eq!(low.n_pop, 4);
        assert_relative_eq!(low.ba_mean, 8.0);
    }

    #[test]
    fn no_fire_is_an_error() {
        let params = AllocationParams::default();
        let strat = stratify(&tiles("Tundra", &[0.0, 0.0, 0.0]), &params).unwrap();
        assert_eq!(allocate(&strat, &params), Err(AllocationError::NoFireActivity));
        assert_eq!(allocate(&[], &params), Err(AllocationError::NoEligibleTiles));
    }

    #[test]
    fn summary_feeds_population_table() {
        let params = AllocationParams { year: 2020, total_sample_size: 20, ..Default::default() };
        let eligible = eligible(&params);
        let alloc = allocate(&eligible, &params).unwrap();
        let summary = summarize(&eligible, &alloc);

        let ids: Vec<&str> = summary.iter().map(|s| s.id_stratum.as_str()).collect();
        assert_eq!(ids, ["2020_3_0", "2020_3_1", "2020_4_0", "2020_4_1"]);
        assert_eq!(summary[0].index, 1);
        assert_eq!(summary[0].biome_group, "Boreal Forest");
        assert_eq!(summary.iter().map(|s| s.n_pop).sum::<usize>(), 16);
        let by_stratum: usize = alloc.iter().map(|a| a.n).sum();
        assert_eq!(summary.iter().map(|s| s.n).sum::<usize>(), by_stratum);

        let pop = summary[3].to_population();
        assert_eq!(pop, StratumPopulation::new("2020_4_1", 2.0));
    }
}
