//! Fixed catalogue of burned-area accuracy metrics.
//!
//! Every metric is a ratio of two totals, y / x, or a plain total when it has
//! no denominator. Ratios here are per unit; the estimator turns them into
//! combined ratio estimates.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EstimationError;
use crate::units::ErrorMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Commission error: ce / (tb + ce).
    Ce,
    /// Omission error: oe / (tb + oe).
    Oe,
    /// Dice coefficient: 2tb / (2tb + ce + oe).
    DC,
    /// Signed area bias ce − oe.
    Bias,
    /// Bias relative to reference burned area.
    RelB,
    /// Bias relative to the total unit area.
    B,
    /// Reference burned area tb + oe.
    BaRef,
    /// Product burned area tb + ce.
    BaProd,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::Ce,
        Metric::Oe,
        Metric::DC,
        Metric::Bias,
        Metric::RelB,
        Metric::B,
        Metric::BaRef,
        Metric::BaProd,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Ce => "Ce",
            Metric::Oe => "Oe",
            Metric::DC => "DC",
            Metric::Bias => "bias",
            Metric::RelB => "relB",
            Metric::B => "B",
            Metric::BaRef => "BAref",
            Metric::BaProd => "BAprod",
        }
    }

    /// Whether the metric carries a denominator column.
    pub fn is_ratio(self) -> bool {
        !matches!(self, Metric::Bias | Metric::BaRef | Metric::BaProd)
    }

    /// Numerator for one unit.
    pub fn numerator(self, e: &ErrorMatrix) -> f64 {
        match self {
            Metric::Ce => e.ce,
            Metric::Oe => e.oe,
            Metric::DC => 2.0 * e.tb,
            Metric::Bias | Metric::RelB | Metric::B => e.ce - e.oe,
            Metric::BaRef => e.tb + e.oe,
            Metric::BaProd => e.tb + e.ce,
        }
    }

    /// Denominator for one unit; `None` for plain totals.
    pub fn denominator(self, e: &ErrorMatrix) -> Option<f64> {
        match self {
            Metric::Ce => Some(e.tb + e.ce),
            Metric::Oe | Metric::RelB => Some(e.tb + e.oe),
            Metric::DC => Some(2.0 * e.tb + e.ce + e.oe),
            Metric::B => Some(e.total()),
            Metric::Bias | Metric::BaRef | Metric::BaProd => None,
        }
    }

    /// Parse a comma-separated metric list, e.g. `"Ce,Oe,DC"`.
    pub fn parse_list(s: &str) -> Result<Vec<Metric>, EstimationError> {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = EstimationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| EstimationError::UnknownMetric(s.to_string()))
    }
}
