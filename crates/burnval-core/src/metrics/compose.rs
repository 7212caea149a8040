//! Per-unit metric composition from error-matrix components.
use crate::error::Result;
use crate::metrics::catalogue::Metric;
use crate::metrics::table::MetricTable;
use crate::units::SamplingUnit;

/// Pass-through diagnostic columns, stored as y-only metrics.
pub const RAW_COMPONENTS: [&str; 4] = ["tb", "ce", "oe", "tub"];

/// Build the metric table for `units`, one row per unit.
///
/// Every unit's components are validated first; a negative or non-finite
/// area aborts composition. The raw `tb`/`ce`/`oe`/`tub` columns are always
/// included alongside the requested metrics.
pub fn compose(units: &[SamplingUnit], metrics: &[Metric]) -> Result<MetricTable> {
    for u in units {
        u.matrix.validate(&u.unit_id)?;
    }

    let mut table = MetricTable::new(units.len());
    for &metric in metrics {
        let y = units.iter().map(|u| metric.numerator(&u.matrix)).collect();
        let x = metric
            .is_ratio()
            .then(|| units.iter().filter_map(|u| metric.denominator(&u.matrix)).collect());
        table.insert(metric.name(), y, x)?;
    }

    for (i, name) in RAW_COMPONENTS.iter().enumerate() {
        let y = units.iter().map(|u| u.matrix.components()[i].1).collect();
        table.insert(*name, y, None)?;
    }

    tracing::debug!(units = units.len(), metrics = metrics.len(), "composed metric table");
    Ok(table)
}

/// Compose the full catalogue.
pub fn compose_all(units: &[SamplingUnit]) -> Result<MetricTable> {
    compose(units, &Metric::ALL)
}
