//! Accuracy assessment of burned-area products from stratified reference
//! samples.
//!
//! [`metrics`] turns per-unit error matrices into numerator/denominator
//! columns, [`estimator`] computes ratio estimates with their standard
//! deviations globally and per biome, and [`sampling`] builds the stratified
//! design the reference units are drawn from.

pub mod error;
pub mod estimator;
pub mod metrics;
pub mod sampling;
pub mod units;

pub use error::{AllocationError, EstimationError, EstimationWarning};
pub use estimator::{estimate, estimate_domains, DomainReport, Estimation, EstimatorOptions};
pub use metrics::{compose, Metric, MetricTable};
pub use units::{BiomeLookup, ErrorMatrix, SamplingUnit, StratumPopulation};
