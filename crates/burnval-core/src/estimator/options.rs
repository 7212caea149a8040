use serde::{Deserialize, Serialize};

use crate::error::{EstimationError, Result};

/// Knobs of the stratified ratio estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorOptions {
    /// Collect per-stratum and per-unit diagnostics.
    pub detail: bool,
    /// Label of the synthetic stratum that absorbs degenerate strata.
    pub mixed_label: String,
    /// Strata with fewer retained units than this are collapsed.
    pub min_stratum_units: usize,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            detail: false,
            mixed_label: "mixed".to_string(),
            min_stratum_units: 2,
        }
    }
}

impl EstimatorOptions {
    pub fn with_detail(mut self, detail: bool) -> Self {
        self.detail = detail;
        self
    }

    /// Parse options from JSON; missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        let opts: Self =
            serde_json::from_str(s).map_err(|e| EstimationError::Options(e.to_string()))?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mixed_label.is_empty() {
            return Err(EstimationError::Options("mixed_label must not be empty".into()));
        }
        if self.min_stratum_units < 2 {
            return Err(EstimationError::Options(format!(
                "min_stratum_units must be at least 2, got {}",
                self.min_stratum_units
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_defaults() {
        let o = EstimatorOptions::from_json(r#"{"detail": true}"#).unwrap();
        assert!(o.detail);
        assert_eq!(o.mixed_label, "mixed");
        assert_eq!(o.min_stratum_units, 2);
    }

    #[test]
    fn json_rejects_bad_values() {
        assert!(EstimatorOptions::from_json(r#"{"min_stratum_units": 1}"#).is_err());
        assert!(EstimatorOptions::from_json(r#"{"mixed_label": ""}"#).is_err());
        assert!(EstimatorOptions::from_json("not json").is_err());
    }
}
