use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Burned-area product used to rank tiles by fire activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaProduct {
    FireCci51,
    Mcd64a1,
    Vnp64a1,
}

impl BaProduct {
    pub fn as_str(self) -> &'static str {
        match self {
            BaProduct::FireCci51 => "firecci51",
            BaProduct::Mcd64a1 => "mcd64a1",
            BaProduct::Vnp64a1 => "vnp64a1",
        }
    }

    /// Name of the per-tile burned-percentage attribute for this product.
    pub fn burned_perc_column(self) -> String {
        format!("{}_burned_perc", self.as_str())
    }
}

impl fmt::Display for BaProduct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaProduct {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firecci51" => Ok(BaProduct::FireCci51),
            "mcd64a1" => Ok(BaProduct::Mcd64a1),
            "vnp64a1" => Ok(BaProduct::Vnp64a1),
            other => Err(format!("unknown BA product '{other}'")),
        }
    }
}

/// Biome names of the validation grid and their numeric codes.
pub const BIOME_CODES: [(&str, u8); 8] = [
    ("Tropical Forest", 1),
    ("Temperate Forest", 2),
    ("Boreal Forest", 3),
    ("Tropical Savanna", 4),
    ("Temperate Savanna", 5),
    ("Mediterranean", 6),
    ("Deserts & Xeric Shrublands", 7),
    ("Tundra", 8),
];

pub fn biome_code(biome: &str) -> Option<u8> {
    BIOME_CODES.iter().find(|(name, _)| *name == biome).map(|&(_, c)| c)
}

/// Code as written into stratum ids; unknown biomes become `XX`.
pub fn biome_code_label(biome: &str) -> String {
    biome_code(biome).map_or_else(|| "XX".to_string(), |c| c.to_string())
}

/// First year with the sampling grid's annual layers.
pub const FIRST_YEAR: u32 = 2016;

/// Sampling-design parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationParams {
    pub year: u32,
    pub product: BaProduct,
    /// Total number of units to allocate across strata.
    pub total_sample_size: usize,
    /// Minimum land percentage of an eligible tile (0-100).
    pub land_perc_min: f64,
    /// Maximum median days between cloud-free observations in the fire season.
    pub nocloudy_interval_max: f64,
    /// Per-biome quantile of burned percentage splitting high from low activity.
    pub activity_quantile: f64,
    /// Floor on any stratum's allocation.
    pub min_per_stratum: usize,
}

impl Default for AllocationParams {
    fn default() -> Self {
        Self {
            year: 2019,
            product: BaProduct::FireCci51,
            total_sample_size: 100,
            land_perc_min: 50.0,
            nocloudy_interval_max: 10.0,
            activity_quantile: 0.8,
            min_per_stratum: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn biome_codes() {
        assert_eq!(biome_code("Mediterranean"), Some(6));
        assert_eq!(biome_code_label("Tundra"), "8");
        assert_eq!(biome_code_label("Ice"), "XX");
    }

    #[test]
    fn product_names() {
        assert_eq!("mcd64a1".parse::<BaProduct>().unwrap(), BaProduct::Mcd64a1);
        assert_eq!(BaProduct::FireCci51.burned_perc_column(), "firecci51_burned_perc");
        assert!("modis".parse::<BaProduct>().is_err());
    }
}
