//! Row-aligned columnar table of per-unit metric numerators/denominators.
use std::collections::HashMap;

use serde::Serialize;

use crate::error::{EstimationError, Result};
use crate::metrics::catalogue::Metric;

/// The `y` column and optional `x` column of one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricColumns {
    pub y: Vec<f64>,
    pub x: Option<Vec<f64>>,
}

impl MetricColumns {
    pub fn is_ratio(&self) -> bool {
        self.x.is_some()
    }
}

/// Named metric columns, one row per sampling unit. Column names follow the
/// `<metric>.y` / `<metric>.x` convention.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricTable {
    rows: usize,
    names: Vec<String>,
    columns: HashMap<String, MetricColumns>,
}

impl MetricTable {
    pub fn new(rows: usize) -> Self {
        Self { rows, names: Vec::new(), columns: HashMap::new() }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Metric names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Insert or replace a metric. Both columns must have `rows` entries.
    pub fn insert(&mut self, name: impl Into<String>, y: Vec<f64>, x: Option<Vec<f64>>) -> Result<()> {
        let name = name.into();
        self.check_len(&format!("{name}.y"), y.len())?;
        if let Some(x) = &x {
            self.check_len(&format!("{name}.x"), x.len())?;
        }
        if !self.columns.contains_key(&name) {
            self.names.push(name.clone());
        }
        self.columns.insert(name, MetricColumns { y, x });
        Ok(())
    }

    fn check_len(&self, column: &str, found: usize) -> Result<()> {
        if found != self.rows {
            return Err(EstimationError::RowMismatch {
                column: column.to_string(),
                expected: self.rows,
                found,
            });
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MetricColumns> {
        self.columns.get(name)
    }

    /// Look up a metric that the estimator is about to use. Catalogue ratio
    /// metrics must carry their `x` column.
    pub fn require(&self, name: &str) -> Result<&MetricColumns> {
        let cols = self.columns.get(name).ok_or_else(|| EstimationError::InputShape {
            metric: name.to_string(),
            column: format!("{name}.y"),
        })?;
        let declared_ratio = name.parse::<Metric>().map(Metric::is_ratio).unwrap_or(false);
        if declared_ratio && cols.x.is_none() {
            return Err(EstimationError::InputShape {
                metric: name.to_string(),
                column: format!("{name}.x"),
            });
        }
        Ok(cols)
    }

    /// Look up a single column by its dotted name, e.g. `"DC.x"`.
    pub fn column(&self, dotted: &str) -> Option<&[f64]> {
        let (name, part) = dotted.rsplit_once('.')?;
        let cols = self.columns.get(name)?;
        match part {
            "y" => Some(&cols.y),
            "x" => cols.x.as_deref(),
            _ => None,
        }
    }

    /// All column names in `<metric>.y`, `<metric>.x` order.
    pub fn column_names(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.names.len() * 2);
        for name in &self.names {
            out.push(format!("{name}.y"));
            if self.columns[name].is_ratio() {
                out.push(format!("{name}.x"));
            }
        }
        out
    }

    /// New table holding only the given rows, in the given order.
    pub fn select(&self, rows: &[usize]) -> MetricTable {
        let pick = |v: &[f64]| rows.iter().map(|&i| v[i]).collect::<Vec<_>>();
        let columns = self
            .columns
            .iter()
            .map(|(name, c)| {
                let cols = MetricColumns { y: pick(&c.y), x: c.x.as_deref().map(pick) };
                (name.clone(), cols)
            })
            .collect();
        MetricTable { rows: rows.len(), names: self.names.clone(), columns }
    }
}
