use serde::Serialize;

use crate::error::EstimationWarning;

/// Degraded-result markers attached to one metric estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFlag {
    /// X was undefined and replaced with 1; R equals Y.
    DenominatorSubstituted,
    /// X was zero; R is NaN.
    ZeroDenominator,
    /// Some stratum has fewer than two units; sdR is NaN.
    VarianceUndefined,
    /// Some stratum has N < n; sdR is NaN.
    PopulationBelowSample,
    /// No usable units.
    NoData,
}

/// Per-stratum diagnostics for one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StratumDetail {
    pub stratum: String,
    pub n_pop: f64,
    pub n: usize,
    /// Stratum mean of M·y/m.
    pub y_mean: f64,
    pub x_mean: Option<f64>,
    /// Standard deviations of the linearized residual, y density and x density.
    pub su: f64,
    pub sy: f64,
    pub sx: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDetail {
    pub y_total: f64,
    /// 1 for plain totals and for substituted denominators.
    pub x_total: f64,
    pub strata: Vec<StratumDetail>,
    /// Normalized residual u/m of each retained unit.
    pub residuals: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub metric: String,
    pub r: f64,
    pub sd_r: f64,
    pub flags: Vec<MetricFlag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<MetricDetail>,
}

impl Estimate {
    pub(crate) fn no_data(metric: &str) -> Self {
        Self {
            metric: metric.to_string(),
            r: f64::NAN,
            sd_r: f64::NAN,
            flags: vec![MetricFlag::NoData],
            detail: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.flags.is_empty()
    }
}

/// Retained unit and its effective stratum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitAssignment {
    pub unit_id: String,
    pub stratum: String,
}

/// Result of one estimator call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimation {
    pub estimates: Vec<Estimate>,
    pub warnings: Vec<EstimationWarning>,
    /// Original strata merged into the synthetic stratum.
    pub collapsed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<Vec<UnitAssignment>>,
}

impl Estimation {
    pub fn get(&self, metric: &str) -> Option<&Estimate> {
        self.estimates.iter().find(|e| e.metric == metric)
    }

    pub fn log_warnings(&self, domain: &str) {
        for w in &self.warnings {
            w.log(domain);
        }
    }

    pub fn to_table(&self) -> AccuracyTable {
        AccuracyTable {
            metrics: self.estimates.iter().map(|e| e.metric.clone()).collect(),
            r: self.estimates.iter().map(|e| e.r).collect(),
            sd_r: self.estimates.iter().map(|e| e.sd_r).collect(),
        }
    }
}

/// Two-row output table: `R` and `sdR`, one column per metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyTable {
    pub metrics: Vec<String>,
    pub r: Vec<f64>,
    pub sd_r: Vec<f64>,
}

impl AccuracyTable {
    pub const ROW_LABELS: [&'static str; 2] = ["R", "sdR"];

    /// NaN-filled table for a domain whose estimation failed.
    pub fn missing<S: AsRef<str>>(metrics: &[S]) -> Self {
        Self {
            metrics: metrics.iter().map(|m| m.as_ref().to_string()).collect(),
            r: vec![f64::NAN; metrics.len()],
            sd_r: vec![f64::NAN; metrics.len()],
        }
    }

    /// `(label, values)` rows in output order.
    pub fn rows(&self) -> [(&'static str, &[f64]); 2] {
        [(Self::ROW_LABELS[0], self.r.as_slice()), (Self::ROW_LABELS[1], self.sd_r.as_slice())]
    }
}
