//! Biome × fire-activity stratification of candidate tiles.
//!
//! A tile is "high" activity when its burned percentage exceeds the
//! per-biome quantile (0.8 by default), otherwise "low".
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AllocationError;
use crate::sampling::params::{biome_code_label, AllocationParams, FIRST_YEAR};

/// Candidate tile attributes for one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub name: String,
    pub biome: String,
    /// Burned percentage from the selected BA product; NaN when the product
    /// has no value for the tile.
    pub burned_perc: f64,
    pub land_perc: f64,
    /// Median days between cloud-free images within the fire season.
    pub nocloudy_interval: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FireActivity {
    High,
    Low,
}

impl FireActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            FireActivity::High => "high",
            FireActivity::Low => "low",
        }
    }

    fn flag(self) -> u8 {
        match self {
            FireActivity::High => 1,
            FireActivity::Low => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StratifiedTile {
    #[serde(flatten)]
    pub tile: TileRecord,
    pub threshold: f64,
    pub activity: FireActivity,
    /// `"{biome}_{activity}"`.
    pub stratum: String,
    /// `"{year}_{biome code}_{1|0}"`.
    pub id_stratum: String,
}

/// Quantile with linear interpolation between order statistics. NaNs are
/// ignored; an empty input yields NaN.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (v.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(v.len() - 1);
    v[lo] + (pos - lo as f64) * (v[hi] - v[lo])
}

/// Per-biome activity threshold.
pub fn fire_activity_thresholds(tiles: &[TileRecord], q: f64) -> BTreeMap<String, f64> {
    let mut by_biome: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for t in tiles {
        by_biome.entry(t.biome.as_str()).or_default().push(t.burned_perc);
    }
    by_biome.into_iter().map(|(b, v)| (b.to_string(), quantile(&v, q))).collect()
}

fn check_percentage(t: &TileRecord, field: &'static str, value: f64) -> Result<(), AllocationError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(AllocationError::InvalidPercentage { name: t.name.clone(), field, value })
    }
}

/// Assign every tile to its stratum.
pub fn stratify(tiles: &[TileRecord], params: &AllocationParams) -> Result<Vec<StratifiedTile>, AllocationError> {
    if params.year < FIRST_YEAR {
        return Err(AllocationError::YearOutOfRange(params.year));
    }
    for t in tiles {
        // NaN burned area is skipped by the thresholds and ranks as low.
        if !t.burned_perc.is_nan() {
            check_percentage(t, "burned_perc", t.burned_perc)?;
        }
        check_percentage(t, "land_perc", t.land_perc)?;
    }

    let thresholds = fire_activity_thresholds(tiles, params.activity_quantile);
    let out = tiles
        .iter()
        .map(|t| {
            let threshold = thresholds[&t.biome];
            let activity =
                if t.burned_perc > threshold { FireActivity::High } else { FireActivity::Low };
            StratifiedTile {
                stratum: format!("{}_{}", t.biome, activity.as_str()),
                id_stratum: format!("{}_{}_{}", params.year, biome_code_label(&t.biome), activity.flag()),
                tile: t.clone(),
                threshold,
                activity,
            }
        })
        .collect();
    Ok(out)
}

/// Keep tiles with enough land and frequent cloud-free observations.
pub fn filter_eligible(tiles: &[StratifiedTile], params: &AllocationParams) -> Vec<StratifiedTile> {
    tiles
        .iter()
        .filter(|t| {
            t.tile.land_perc >= params.land_perc_min
                && t.tile
                    .nocloudy_interval
                    .is_some_and(|d| d <= params.nocloudy_interval_max)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tile(name: &str, biome: &str, burned: f64, land: f64, interval: Option<f64>) -> TileRecord {
        TileRecord {
            name: name.to_string(),
            biome: biome.to_string(),
            burned_perc: burned,
            land_perc: land,
            nocloudy_interval: interval,
        }
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(quantile(&v, 0.8), 4.2, epsilon = 1e-12);
        assert_relative_eq!(quantile(&v, 0.0), 1.0);
        assert_relative_eq!(quantile(&v, 1.0), 5.0);
        assert_relative_eq!(quantile(&[7.0, f64::NAN], 0.5), 7.0);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn thresholds_and_strata_per_biome() {
        let tiles: Vec<_> = (1..=5)
            .map(|i| tile(&format!("s{i}"), "Tropical Savanna", i as f64, 90.0, Some(3.0)))
            .chain([tile("x", "Atlantis", 0.0, 90.0, None)])
            .collect();
        let params = AllocationParams { year: 2021, ..Default::default() };
        let out = stratify(&tiles, &params).unwrap();

        assert_relative_eq!(out[0].threshold, 4.2, epsilon = 1e-12);
        assert_eq!(out[4].activity, FireActivity::High);
        assert_eq!(out[4].stratum, "Tropical Savanna_high");
        assert_eq!(out[4].id_stratum, "2021_4_1");
        assert_eq!(out[3].id_stratum, "2021_4_0");
        // Ties with the threshold stay low.
        assert_eq!(out[5].activity, FireActivity::Low);
        assert_eq!(out[5].id_stratum, "2021_XX_0");
    }

    #[test]
    fn missing_burned_area_ranks_low_and_skips_threshold() {
        let tiles: Vec<_> = (1..=5)
            .map(|i| tile(&format!("s{i}"), "Tropical Savanna", i as f64, 90.0, Some(3.0)))
            .chain([tile("gap", "Tropical Savanna", f64::NAN, 90.0, Some(3.0))])
            .collect();
        let out = stratify(&tiles, &AllocationParams::default()).unwrap();
        assert_relative_eq!(out[5].threshold, 4.2, epsilon = 1e-12);
        assert_eq!(out[5].activity, FireActivity::Low);
        assert_eq!(out[5].stratum, "Tropical Savanna_low");
    }

    #[test]
    fn early_years_and_bad_percentages_rejected() {
        let tiles = vec![tile("a", "Tundra", 1.0, 50.0, Some(1.0))];
        let params = AllocationParams { year: 2015, ..Default::default() };
        assert_eq!(stratify(&tiles, &params), Err(AllocationError::YearOutOfRange(2015)));

        let bad = vec![tile("b", "Tundra", 120.0, 50.0, Some(1.0))];
        assert!(matches!(
            stratify(&bad, &AllocationParams::default()),
            Err(AllocationError::InvalidPercentage { field: "burned_perc", .. })
        ));
    }

    #[test]
    fn eligibility_filter() {
        let tiles = vec![
            tile("keep", "Tundra", 1.0, 50.0, Some(10.0)),
            tile("low_land", "Tundra", 1.0, 49.9, Some(2.0)),
            tile("cloudy", "Tundra", 1.0, 80.0, Some(10.5)),
            tile("no_obs", "Tundra", 1.0, 80.0, None),
        ];
        let params = AllocationParams::default();
        let strat = stratify(&tiles, &params).unwrap();
        let kept = filter_eligible(&strat, &params);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].tile.name, "keep");
    }
}
