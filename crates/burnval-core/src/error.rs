//! Error and warning types shared by the estimator and the sampling design.
use serde::Serialize;
use thiserror::Error;

/// Fatal failures of composition or estimation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EstimationError {
    #[error("metric '{metric}' is missing column '{column}'")]
    InputShape { metric: String, column: String },

    #[error("column '{column}' has {found} rows, expected {expected}")]
    RowMismatch { column: String, expected: usize, found: usize },

    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("unit '{unit_id}': component {component} = {value} is negative or undefined")]
    NegativeArea { unit_id: String, component: &'static str, value: f64 },

    #[error("stratum '{stratum}': population size N = {value} is negative or undefined")]
    InvalidPopulation { stratum: String, value: f64 },

    #[error("unit '{unit_id}': size weight M = {value} is negative or undefined")]
    InvalidWeight { unit_id: String, value: f64 },

    #[error("invalid estimator options: {0}")]
    Options(String),
}

/// Fatal failures of the sampling design.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AllocationError {
    #[error("year must be 2016 or later, got {0}")]
    YearOutOfRange(u32),

    #[error("no tiles left after eligibility filtering")]
    NoEligibleTiles,

    #[error("total raw allocation is zero (no fire activity in any stratum)")]
    NoFireActivity,

    #[error("tile '{name}': {field} = {value} is not a valid percentage")]
    InvalidPercentage { name: String, field: &'static str, value: f64 },
}

/// Recoverable conditions. The estimate is still produced; callers decide
/// how loudly to report them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimationWarning {
    /// Stratum had fewer than the minimum unit count and was merged.
    DegenerateStratum { stratum: String, n: usize, n_pop: f64 },
    /// Units whose stratum has no population row; they were excluded.
    UnknownStratum { stratum: String, units: usize },
    /// Denominator total was undefined and replaced with 1.
    UndefinedRatio { metric: String },
    /// Denominator total was exactly zero; ratio reported as NaN.
    ZeroDenominator { metric: String },
    /// A stratum still holds fewer than two units; variance is NaN.
    InsufficientSample { stratum: String, n: usize },
    /// Population size is smaller than the sample count; sdR is NaN.
    PopulationBelowSample { stratum: String, n: usize, n_pop: f64 },
    /// No units survived filtering; every metric is NaN.
    EmptyDomain,
}

impl EstimationWarning {
    /// Emit the warning through `tracing`, tagged with the domain label.
    pub fn log(&self, domain: &str) {
        match self {
            Self::DegenerateStratum { stratum, n, n_pop } => tracing::warn!(
                domain,
                stratum = stratum.as_str(),
                n,
                n_pop,
                "stratum collapsed into mixed"
            ),
            Self::UnknownStratum { stratum, units } => tracing::warn!(
                domain,
                stratum = stratum.as_str(),
                units,
                "stratum missing from population table; units excluded"
            ),
            Self::UndefinedRatio { metric } => tracing::warn!(
                domain,
                metric = metric.as_str(),
                "denominator total undefined, substituted with 1"
            ),
            Self::ZeroDenominator { metric } => tracing::warn!(
                domain,
                metric = metric.as_str(),
                "denominator total is zero, ratio undefined"
            ),
            Self::InsufficientSample { stratum, n } => tracing::warn!(
                domain,
                stratum = stratum.as_str(),
                n,
                "fewer than two units after collapsing, variance undefined"
            ),
            Self::PopulationBelowSample { stratum, n, n_pop } => tracing::warn!(
                domain,
                stratum = stratum.as_str(),
                n,
                n_pop,
                "population smaller than sample"
            ),
            Self::EmptyDomain => tracing::warn!(domain, "no usable units"),
        }
    }
}

pub type Result<T, E = EstimationError> = std::result::Result<T, E>;
