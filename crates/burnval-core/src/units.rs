use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{EstimationError, Result};

/// Error-matrix areas of one sampling unit, in m².
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorMatrix {
    /// Burned in both product and reference.
    pub tb: f64,
    /// Burned in the product only.
    pub ce: f64,
    /// Burned in the reference only.
    pub oe: f64,
    /// Unburned in both.
    pub tub: f64,
}

impl ErrorMatrix {
    pub fn new(tb: f64, ce: f64, oe: f64, tub: f64) -> Self {
        Self { tb, ce, oe, tub }
    }

    /// Total mapped area of the unit.
    #[inline]
    pub fn total(&self) -> f64 {
        self.tb + self.ce + self.oe + self.tub
    }

    pub fn components(&self) -> [(&'static str, f64); 4] {
        [("tb", self.tb), ("ce", self.ce), ("oe", self.oe), ("tub", self.tub)]
    }

    /// Reject negative or non-finite components.
    pub fn validate(&self, unit_id: &str) -> Result<()> {
        for (component, value) in self.components() {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(EstimationError::NegativeArea {
                    unit_id: unit_id.to_string(),
                    component,
                    value,
                });
            }
        }
        Ok(())
    }
}

/// One sampled unit (a reference tile) with its design attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingUnit {
    pub unit_id: String,
    pub stratum: String,
    /// Domain label, filled from a [`BiomeLookup`].
    pub biome: Option<String>,
    /// Cluster size M (e.g. tile area).
    pub size_weight: f64,
    /// Realized measured quantity m.
    pub m: f64,
    pub matrix: ErrorMatrix,
}

impl SamplingUnit {
    /// Build a unit whose measured quantity is the error-matrix total.
    pub fn new(unit_id: impl Into<String>, stratum: impl Into<String>, size_weight: f64, matrix: ErrorMatrix) -> Self {
        Self {
            unit_id: unit_id.into(),
            stratum: stratum.into(),
            biome: None,
            size_weight,
            m: matrix.total(),
            matrix,
        }
    }

    pub fn with_m(mut self, m: f64) -> Self {
        self.m = m;
        self
    }

    pub fn with_biome(mut self, biome: impl Into<String>) -> Self {
        self.biome = Some(biome.into());
        self
    }

    /// Reject a negative or non-finite size weight M.
    pub fn validate_weight(&self) -> Result<()> {
        if self.size_weight >= 0.0 && self.size_weight.is_finite() {
            Ok(())
        } else {
            Err(EstimationError::InvalidWeight { unit_id: self.unit_id.clone(), value: self.size_weight })
        }
    }

    /// A unit carries signal only when its measured quantity is positive.
    #[inline]
    pub fn is_measured(&self) -> bool {
        self.m > 0.0 && self.m.is_finite()
    }
}

/// Population size of one stratum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumPopulation {
    pub stratum: String,
    #[serde(rename = "N")]
    pub n_pop: f64,
}

impl StratumPopulation {
    pub fn new(stratum: impl Into<String>, n_pop: f64) -> Self {
        Self { stratum: stratum.into(), n_pop }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_pop >= 0.0 && self.n_pop.is_finite() {
            Ok(())
        } else {
            Err(EstimationError::InvalidPopulation { stratum: self.stratum.clone(), value: self.n_pop })
        }
    }
}

/// Stratum → biome mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BiomeLookup {
    map: HashMap<String, String>,
}

impl BiomeLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stratum: impl Into<String>, biome: impl Into<String>) {
        self.map.insert(stratum.into(), biome.into());
    }

    pub fn biome_of(&self, stratum: &str) -> Option<&str> {
        self.map.get(stratum).map(String::as_str)
    }

    /// Distinct biomes in sorted order.
    pub fn biomes(&self) -> Vec<String> {
        self.map.values().cloned().collect::<BTreeSet<_>>().into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Return copies of `units` labelled with their biome. Units whose
    /// stratum is not in the lookup keep their existing label.
    pub fn label(&self, units: &[SamplingUnit]) -> Vec<SamplingUnit> {
        units
            .iter()
            .map(|u| {
                let mut u = u.clone();
                if let Some(b) = self.biome_of(&u.stratum) {
                    u.biome = Some(b.to_string());
                }
                u
            })
            .collect()
    }
}

impl<S: Into<String>, B: Into<String>> FromIterator<(S, B)> for BiomeLookup {
    fn from_iter<I: IntoIterator<Item = (S, B)>>(iter: I) -> Self {
        let mut lookup = Self::new();
        for (s, b) in iter {
            lookup.insert(s, b);
        }
        lookup
    }
}
