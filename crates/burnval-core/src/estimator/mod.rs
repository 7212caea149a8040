//! Combined ratio estimation under stratified sampling with unequal cluster
//! sizes.
//!
//! For a metric defined by per-unit numerator y and denominator x, each unit
//! contributes densities y/m and x/m scaled by its cluster size M. Stratum
//! means of M·y/m are expanded by the stratum population N_h into totals Y
//! and X, and the estimate is R = Y / X. The variance uses the linearized
//! residual u = y − R·x (u = y for plain totals):
//!
//! ```text
//! Su²_h = Σ M_i² (u_i/m_i − Ū_h)² / (n_h − 1),   Ū_h = Σ M_i u_i/m_i / Σ M_i
//! var R = X⁻² Σ_h N_h (N_h − n_h) Su²_h / n_h
//! ```
//!
//! Degenerate strata are merged first (see [`collapse`]). A stratum that is
//! still below two units gives a NaN variance with a warning; the point
//! estimate is kept.
pub mod collapse;
pub mod domain;
pub mod options;
pub mod result;

use std::collections::{BTreeMap, HashMap};

pub use collapse::{collapse_strata, CollapsedDesign};
pub use domain::{estimate_domains, DomainReport};
pub use options::EstimatorOptions;
pub use result::{
    AccuracyTable, Estimate, Estimation, MetricDetail, MetricFlag, StratumDetail, UnitAssignment,
};

use crate::error::{EstimationError, EstimationWarning, Result};
use crate::metrics::{MetricColumns, MetricTable};
use crate::units::{SamplingUnit, StratumPopulation};

/// A post-collapse stratum with the positions of its units in the design.
struct Stratum {
    name: String,
    n_pop: f64,
    members: Vec<usize>,
}

impl Stratum {
    fn n(&self) -> usize {
        self.members.len()
    }
}

fn group_strata(design: &CollapsedDesign) -> Vec<Stratum> {
    let n_pop: HashMap<&str, f64> =
        design.population.iter().map(|p| (p.stratum.as_str(), p.n_pop)).collect();
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (k, u) in design.units.iter().enumerate() {
        groups.entry(u.stratum.as_str()).or_default().push(k);
    }
    groups
        .into_iter()
        .map(|(name, members)| Stratum {
            name: name.to_string(),
            n_pop: n_pop.get(name).copied().unwrap_or(f64::NAN),
            members,
        })
        .collect()
}

/// Size-weighted spread Σ M²(v − V̄)² / (n − 1) around the M-weighted mean.
/// NaN below two values.
fn size_weighted_variance(weights: &[f64], values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let sum_w: f64 = weights.iter().sum();
    let mean = weights.iter().zip(values).map(|(w, v)| w * v).sum::<f64>() / sum_w;
    weights
        .iter()
        .zip(values)
        .map(|(w, v)| (w * (v - mean)).powi(2))
        .sum::<f64>()
        / (n - 1) as f64
}

/// Estimate R and sdR for every metric in `metrics`.
///
/// `table` must be row-aligned with `units`. Missing metric columns are a
/// fatal [`EstimationError::InputShape`]; everything else degrades into
/// flags and warnings on the returned [`Estimation`].
pub fn estimate<S: AsRef<str>>(
    units: &[SamplingUnit],
    table: &MetricTable,
    population: &[StratumPopulation],
    metrics: &[S],
    options: &EstimatorOptions,
) -> Result<Estimation> {
    options.validate()?;
    for p in population {
        p.validate()?;
    }
    for u in units {
        u.validate_weight()?;
    }
    if table.rows() != units.len() {
        return Err(EstimationError::RowMismatch {
            column: "units".to_string(),
            expected: units.len(),
            found: table.rows(),
        });
    }
    let columns = metrics
        .iter()
        .map(|m| table.require(m.as_ref()).map(|c| (m.as_ref(), c)))
        .collect::<Result<Vec<_>>>()?;

    let design = collapse_strata(units, population, options);
    let mut warnings = design.warnings.clone();

    if design.units.is_empty() {
        warnings.push(EstimationWarning::EmptyDomain);
        return Ok(Estimation {
            estimates: columns.iter().map(|(name, _)| Estimate::no_data(name)).collect(),
            warnings,
            collapsed: design.collapsed,
            units: None,
        });
    }

    let strata = group_strata(&design);
    for s in &strata {
        if s.n() < 2 {
            warnings.push(EstimationWarning::InsufficientSample { stratum: s.name.clone(), n: s.n() });
        }
        if s.n_pop < s.n() as f64 {
            warnings.push(EstimationWarning::PopulationBelowSample {
                stratum: s.name.clone(),
                n: s.n(),
                n_pop: s.n_pop,
            });
        }
    }

    let estimates: Vec<Estimate> = columns
        .iter()
        .map(|(name, cols)| estimate_metric(name, cols, &design, &strata, options.detail))
        .collect();

    for e in &estimates {
        if e.flags.contains(&MetricFlag::DenominatorSubstituted) {
            warnings.push(EstimationWarning::UndefinedRatio { metric: e.metric.clone() });
        }
        if e.flags.contains(&MetricFlag::ZeroDenominator) {
            warnings.push(EstimationWarning::ZeroDenominator { metric: e.metric.clone() });
        }
    }

    tracing::debug!(
        units = design.units.len(),
        strata = strata.len(),
        collapsed = design.collapsed.len(),
        metrics = estimates.len(),
        "stratified ratio estimation done"
    );

    let assignments = options.detail.then(|| {
        design
            .units
            .iter()
            .map(|u| UnitAssignment { unit_id: u.unit_id.clone(), stratum: u.stratum.clone() })
            .collect()
    });

    Ok(Estimation { estimates, warnings, collapsed: design.collapsed, units: assignments })
}

fn estimate_metric(
    name: &str,
    cols: &MetricColumns,
    design: &CollapsedDesign,
    strata: &[Stratum],
    detail: bool,
) -> Estimate {
    let units = &design.units;
    let raw = |v: &[f64]| design.rows.iter().map(|&i| v[i]).collect::<Vec<f64>>();
    let y = raw(&cols.y);
    let x = cols.x.as_deref().map(raw);
    let density = |v: &[f64]| v.iter().zip(units).map(|(a, u)| a / u.m).collect::<Vec<f64>>();
    let y_ = density(&y);
    let x_ = x.as_deref().map(density);

    let mean_of = |v: &[f64], s: &Stratum| {
        s.members.iter().map(|&k| units[k].size_weight * v[k]).sum::<f64>() / s.n() as f64
    };
    let y_means: Vec<f64> = strata.iter().map(|s| mean_of(&y_, s)).collect();
    let x_means: Option<Vec<f64>> =
        x_.as_deref().map(|xd| strata.iter().map(|s| mean_of(xd, s)).collect());

    let mut flags = Vec::new();
    let y_total: f64 = strata.iter().zip(&y_means).map(|(s, m)| s.n_pop * m).sum();
    let mut x_total = match &x_means {
        Some(xm) => strata.iter().zip(xm).map(|(s, m)| s.n_pop * m).sum::<f64>(),
        None => 1.0,
    };
    if x_total.is_nan() {
        x_total = 1.0;
        flags.push(MetricFlag::DenominatorSubstituted);
    }
    let r = if x_total == 0.0 {
        flags.push(MetricFlag::ZeroDenominator);
        f64::NAN
    } else {
        y_total / x_total
    };

    // Linearized residual, normalized by m.
    let u_: Vec<f64> = match &x {
        Some(x) => y
            .iter()
            .zip(x)
            .zip(units)
            .map(|((yi, xi), u)| (yi - r * xi) / u.m)
            .collect(),
        None => y_.clone(),
    };

    let spread = |v: &[f64], s: &Stratum| {
        let w: Vec<f64> = s.members.iter().map(|&k| units[k].size_weight).collect();
        let vals: Vec<f64> = s.members.iter().map(|&k| v[k]).collect();
        size_weighted_variance(&w, &vals)
    };
    let su2: Vec<f64> = strata.iter().map(|s| spread(&u_, s)).collect();
    let var_sum: f64 = strata
        .iter()
        .zip(&su2)
        .map(|(s, v)| {
            let n = s.n() as f64;
            s.n_pop * (s.n_pop - n) * v / n
        })
        .sum();
    let undersized = strata.iter().any(|s| s.n_pop < s.n() as f64);
    let sd_r = if r.is_nan() || undersized {
        f64::NAN
    } else {
        (var_sum / (x_total * x_total)).sqrt()
    };
    if strata.iter().any(|s| s.n() < 2) {
        flags.push(MetricFlag::VarianceUndefined);
    }
    if undersized {
        flags.push(MetricFlag::PopulationBelowSample);
    }

    let detail = detail.then(|| MetricDetail {
        y_total,
        x_total,
        strata: strata
            .iter()
            .enumerate()
            .map(|(h, s)| StratumDetail {
                stratum: s.name.clone(),
                n_pop: s.n_pop,
                n: s.n(),
                y_mean: y_means[h],
                x_mean: x_means.as_ref().map(|xm| xm[h]),
                su: su2[h].sqrt(),
                sy: spread(&y_, s).sqrt(),
                sx: x_.as_deref().map(|xd| spread(xd, s).sqrt()),
            })
            .collect(),
        residuals: u_.clone(),
    });

    Estimate { metric: name.to_string(), r, sd_r, flags, detail }
}
