//! Global and per-biome estimation.
//!
//! Each domain is an independent estimator call over the units of one
//! biome; strata are collapsed within the domain only. A failing domain
//! never affects the global estimate or its siblings.
#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::error::{EstimationError, Result};
use crate::estimator::estimate;
use crate::estimator::options::EstimatorOptions;
use crate::estimator::result::{AccuracyTable, Estimation};
use crate::metrics::MetricTable;
use crate::units::{BiomeLookup, SamplingUnit, StratumPopulation};

#[derive(Debug)]
pub struct DomainReport {
    pub metrics: Vec<String>,
    pub global: Result<Estimation>,
    /// One entry per biome, sorted by biome name.
    pub domains: Vec<(String, Result<Estimation>)>,
}

impl DomainReport {
    pub fn domain(&self, biome: &str) -> Option<&Result<Estimation>> {
        self.domains.iter().find(|(b, _)| b == biome).map(|(_, r)| r)
    }

    pub fn global_table(&self) -> AccuracyTable {
        table_or_missing(&self.global, &self.metrics)
    }

    /// Per-biome tables; failed domains are NaN-filled rather than dropped.
    pub fn domain_tables(&self) -> Vec<(String, AccuracyTable)> {
        self.domains
            .iter()
            .map(|(b, r)| (b.clone(), table_or_missing(r, &self.metrics)))
            .collect()
    }

    /// Number of domains whose estimation returned an error.
    pub fn failures(&self) -> usize {
        self.domains.iter().filter(|(_, r)| r.is_err()).count() + usize::from(self.global.is_err())
    }
}

fn table_or_missing(res: &Result<Estimation>, metrics: &[String]) -> AccuracyTable {
    match res {
        Ok(e) => e.to_table(),
        Err(_) => AccuracyTable::missing(metrics),
    }
}

/// Estimate once over all units and once per biome of `lookup`.
pub fn estimate_domains<S: AsRef<str> + Sync>(
    units: &[SamplingUnit],
    table: &MetricTable,
    population: &[StratumPopulation],
    lookup: &BiomeLookup,
    metrics: &[S],
    options: &EstimatorOptions,
) -> DomainReport {
    let labelled = lookup.label(units);

    let global = estimate(&labelled, table, population, metrics, options);
    report("global", &global);

    let aligned = table.rows() == labelled.len();
    let run_domain = |biome: &String| -> (String, Result<Estimation>) {
        if !aligned {
            let err = EstimationError::RowMismatch {
                column: "units".to_string(),
                expected: labelled.len(),
                found: table.rows(),
            };
            return (biome.clone(), Err(err));
        }
        let rows: Vec<usize> = (0..labelled.len())
            .filter(|&i| labelled[i].biome.as_deref() == Some(biome.as_str()))
            .collect();
        let sub_units: Vec<SamplingUnit> = rows.iter().map(|&i| labelled[i].clone()).collect();
        let sub_table = table.select(&rows);
        let res = estimate(&sub_units, &sub_table, population, metrics, options);
        report(biome, &res);
        (biome.clone(), res)
    };

    let biomes = lookup.biomes();
    #[cfg(feature = "threading")]
    let domains: Vec<_> = biomes.par_iter().map(run_domain).collect();
    #[cfg(not(feature = "threading"))]
    let domains: Vec<_> = biomes.iter().map(run_domain).collect();

    DomainReport {
        metrics: metrics.iter().map(|m| m.as_ref().to_string()).collect(),
        global,
        domains,
    }
}

fn report(domain: &str, res: &Result<Estimation>) {
    match res {
        Ok(e) => e.log_warnings(domain),
        Err(err) => tracing::error!(domain, error = %err, "domain estimation failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EstimationWarning;
    use crate::estimator::result::MetricFlag;
    use crate::metrics::compose_all;
    use crate::units::ErrorMatrix;
    use approx::assert_relative_eq;

    fn unit(id: &str, stratum: &str, e: [f64; 4]) -> SamplingUnit {
        SamplingUnit::new(id, stratum, 100.0, ErrorMatrix::new(e[0], e[1], e[2], e[3]))
    }

    fn fixture() -> (Vec<SamplingUnit>, Vec<StratumPopulation>, BiomeLookup) {
        let units = vec![
            unit("1", "T_high", [30.0, 5.0, 2.0, 63.0]),
            unit("2", "T_high", [20.0, 1.0, 8.0, 71.0]),
            unit("3", "T_low", [1.0, 0.0, 0.0, 99.0]),
            unit("4", "T_low", [0.0, 2.0, 1.0, 97.0]),
            unit("5", "B_high", [12.0, 3.0, 3.0, 82.0]),
            unit("6", "B_high", [9.0, 0.0, 4.0, 87.0]),
            unit("7", "B_low", [0.0, 0.0, 2.0, 98.0]),
            unit("8", "B_low", [2.0, 1.0, 0.0, 97.0]),
        ];
        let population = vec![
            StratumPopulation::new("T_high", 40.0),
            StratumPopulation::new("T_low", 160.0),
            StratumPopulation::new("B_high", 25.0),
            StratumPopulation::new("B_low", 110.0),
        ];
        let lookup: BiomeLookup = [
            ("T_high", "Tropical Savanna"),
            ("T_low", "Tropical Savanna"),
            ("B_high", "Boreal Forest"),
            ("B_low", "Boreal Forest"),
        ]
        .into_iter()
        .collect();
        (units, population, lookup)
    }

    fn y_total(e: &Estimation, metric: &str) -> f64 {
        e.get(metric).unwrap().detail.as_ref().unwrap().y_total
    }

    #[test]
    fn area_totals_add_up_across_biomes() {
        let (units, population, lookup) = fixture();
        let table = compose_all(&units).unwrap();
        let opts = EstimatorOptions::default().with_detail(true);
        let report =
            estimate_domains(&units, &table, &population, &lookup, &["BAref", "BAprod", "DC"], &opts);

        assert_eq!(report.domains.len(), 2);
        assert_eq!(report.domains[0].0, "Boreal Forest");
        let global = report.global.as_ref().unwrap();
        for metric in ["BAref", "BAprod"] {
            let sum: f64 = report
                .domains
                .iter()
                .map(|(_, r)| y_total(r.as_ref().unwrap(), metric))
                .sum();
            assert_relative_eq!(sum, y_total(global, metric), max_relative = 1e-12);
            assert_relative_eq!(sum, global.get(metric).unwrap().r, max_relative = 1e-12);
        }
        assert_eq!(report.failures(), 0);
    }

    #[test]
    fn sparse_domain_degrades_without_affecting_others() {
        let (mut units, population, mut lookup) = fixture();
        lookup.insert("Z_high", "Tundra");
        units.push(unit("9", "Z_high", [0.0; 4]));
        let table = compose_all(&units).unwrap();
        let report = estimate_domains(
            &units,
            &table,
            &population,
            &lookup,
            &["DC"],
            &EstimatorOptions::default(),
        );
        let tables = report.domain_tables();
        let (name, tundra) = &tables[2];
        assert_eq!(name, "Tundra");
        assert!(tundra.r[0].is_nan() && tundra.sd_r[0].is_nan());
        assert!(report.global_table().r[0].is_finite());
        assert!(tables[0].1.r[0].is_finite());
    }

    #[test]
    fn lone_unit_domain_keeps_ratio_and_drops_variance() {
        let (units, mut population, mut lookup) = fixture();
        let opts = EstimatorOptions::default();
        let metrics = ["DC", "BAref"];
        let baseline = estimate_domains(
            &units,
            &compose_all(&units).unwrap(),
            &population,
            &lookup,
            &metrics,
            &opts,
        );

        let mut sparse = units.clone();
        sparse.push(unit("9", "Z_high", [4.0, 1.0, 2.0, 93.0]));
        population.push(StratumPopulation::new("Z_high", 12.0));
        lookup.insert("Z_high", "Tundra");
        let table = compose_all(&sparse).unwrap();
        let report = estimate_domains(&sparse, &table, &population, &lookup, &metrics, &opts);

        assert_eq!(report.failures(), 0);
        let tundra = report.domain("Tundra").unwrap().as_ref().unwrap();
        for e in &tundra.estimates {
            assert!(e.r.is_finite(), "{} R = {}", e.metric, e.r);
            assert!(e.sd_r.is_nan());
            assert!(e.flags.contains(&MetricFlag::VarianceUndefined));
        }
        assert!(tundra
            .warnings
            .contains(&EstimationWarning::InsufficientSample { stratum: "mixed".into(), n: 1 }));

        let tables = report.domain_tables();
        let before = baseline.domain_tables();
        assert_eq!(tables[0], before[0]);
        assert_eq!(tables[1], before[1]);
        assert!(report.global_table().r.iter().all(|r| r.is_finite()));
    }

    #[test]
    fn failed_domain_renders_nan_row() {
        let (units, population, lookup) = fixture();
        let table = compose_all(&units[..3]).unwrap();
        let report = estimate_domains(
            &units,
            &table,
            &population,
            &lookup,
            &["DC", "Ce"],
            &EstimatorOptions::default(),
        );
        assert!(report.global.is_err());
        assert_eq!(report.failures(), 3);
        let boreal = report.domain_tables().remove(0).1;
        assert_eq!(boreal.metrics, vec!["DC", "Ce"]);
        assert!(boreal.r.iter().chain(&boreal.sd_r).all(|v| v.is_nan()));
        assert!(report.domain("Tundra").is_none());
    }
}
