//! Stratum collapsing: degenerate strata are merged into one synthetic
//! stratum before estimation.
//!
//! Counting happens twice, once over every unit with a known stratum and
//! once after unmeasured units (m ≤ 0) are dropped. A stratum that falls
//! below the minimum at either point is merged; the merged stratum's
//! population is the sum of its members' populations.
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::EstimationWarning;
use crate::estimator::options::EstimatorOptions;
use crate::units::{SamplingUnit, StratumPopulation};

/// Design after collapsing. `units[k]` came from input row `rows[k]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CollapsedDesign {
    /// Retained units, re-keyed to their effective stratum.
    pub units: Vec<SamplingUnit>,
    /// Source row of each retained unit.
    pub rows: Vec<usize>,
    pub population: Vec<StratumPopulation>,
    /// Original strata merged into the synthetic stratum.
    pub collapsed: Vec<String>,
    pub warnings: Vec<EstimationWarning>,
}

pub fn collapse_strata(
    units: &[SamplingUnit],
    population: &[StratumPopulation],
    options: &EstimatorOptions,
) -> CollapsedDesign {
    let min = options.min_stratum_units;
    let mixed = options.mixed_label.as_str();
    let n_pop: HashMap<&str, f64> =
        population.iter().map(|p| (p.stratum.as_str(), p.n_pop)).collect();
    let mut warnings = Vec::new();

    // Units in strata without a population row cannot be weighted.
    let mut unknown: BTreeMap<&str, usize> = BTreeMap::new();
    let known: Vec<usize> = (0..units.len())
        .filter(|&i| {
            let s = units[i].stratum.as_str();
            let ok = n_pop.contains_key(s);
            if !ok {
                *unknown.entry(s).or_default() += 1;
            }
            ok
        })
        .collect();
    for (stratum, n) in unknown {
        warnings.push(EstimationWarning::UnknownStratum { stratum: stratum.to_string(), units: n });
    }

    let count = |idx: &[usize]| {
        let mut c: BTreeMap<&str, usize> = BTreeMap::new();
        for &i in idx {
            *c.entry(units[i].stratum.as_str()).or_default() += 1;
        }
        c
    };
    let before = count(&known);
    let measured: Vec<usize> = known.iter().copied().filter(|&i| units[i].is_measured()).collect();
    let after = count(&measured);

    let marked: BTreeSet<&str> = before
        .iter()
        .filter(|(s, &n)| n < min || after.get(*s).copied().unwrap_or(0) < min)
        .map(|(s, _)| *s)
        .collect();

    let mut new_population: Vec<StratumPopulation> = Vec::with_capacity(population.len());
    if marked.is_empty() {
        new_population.extend(population.iter().cloned());
    } else {
        let mut mixed_n = 0.0;
        for &s in &marked {
            let n = after.get(s).copied().unwrap_or(0);
            warnings.push(EstimationWarning::DegenerateStratum {
                stratum: s.to_string(),
                n,
                n_pop: n_pop[s],
            });
            mixed_n += n_pop[s];
        }
        if !marked.contains(mixed) {
            mixed_n += n_pop.get(mixed).copied().unwrap_or(0.0);
        }
        new_population.extend(
            population
                .iter()
                .filter(|p| !marked.contains(p.stratum.as_str()) && p.stratum != mixed)
                .cloned(),
        );
        new_population.push(StratumPopulation::new(mixed, mixed_n));
    }

    let retained = measured
        .iter()
        .map(|&i| {
            let mut u = units[i].clone();
            if marked.contains(u.stratum.as_str()) {
                u.stratum = mixed.to_string();
            }
            u
        })
        .collect();

    CollapsedDesign {
        units: retained,
        rows: measured,
        population: new_population,
        collapsed: marked.iter().map(|s| s.to_string()).collect(),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::ErrorMatrix;

    fn unit(id: &str, stratum: &str, m: f64) -> SamplingUnit {
        SamplingUnit::new(id, stratum, 1.0, ErrorMatrix::new(1.0, 0.0, 0.0, 1.0)).with_m(m)
    }

    fn pop() -> Vec<StratumPopulation> {
        vec![
            StratumPopulation::new("A", 10.0),
            StratumPopulation::new("B", 20.0),
            StratumPopulation::new("C", 30.0),
        ]
    }

    #[test]
    fn singleton_strata_merge_into_mixed() {
        let units = vec![unit("1", "A", 2.0), unit("2", "B", 2.0), unit("3", "C", 2.0), unit("4", "C", 2.0)];
        let d = collapse_strata(&units, &pop(), &EstimatorOptions::default());
        assert_eq!(d.collapsed, vec!["A", "B"]);
        assert_eq!(d.rows, vec![0, 1, 2, 3]);
        let strata: Vec<&str> = d.units.iter().map(|u| u.stratum.as_str()).collect();
        assert_eq!(strata, vec!["mixed", "mixed", "C", "C"]);
        assert_eq!(
            d.population,
            vec![StratumPopulation::new("C", 30.0), StratumPopulation::new("mixed", 30.0)]
        );
        assert_eq!(d.warnings.len(), 2);
    }

    #[test]
    fn unmeasured_units_drop_and_can_trigger_collapse() {
        let units = vec![unit("1", "A", 2.0), unit("2", "A", 0.0), unit("3", "C", 2.0), unit("4", "C", 5.0)];
        let d = collapse_strata(&units, &pop(), &EstimatorOptions::default());
        assert_eq!(d.rows, vec![0, 2, 3]);
        assert_eq!(d.collapsed, vec!["A"]);
        assert_eq!(d.units[0].stratum, "mixed");
        assert!(d.population.contains(&StratumPopulation::new("mixed", 10.0)));
        assert!(matches!(
            d.warnings[0],
            EstimationWarning::DegenerateStratum { n: 1, .. }
        ));
    }

    #[test]
    fn healthy_design_is_untouched() {
        let units = vec![unit("1", "A", 2.0), unit("2", "A", 3.0)];
        let d = collapse_strata(&units, &pop(), &EstimatorOptions::default());
        assert!(d.collapsed.is_empty());
        assert!(d.warnings.is_empty());
        assert_eq!(d.population, pop());
        assert_eq!(d.units, units);
    }

    #[test]
    fn unknown_strata_are_excluded_with_warning() {
        let units = vec![unit("1", "A", 2.0), unit("2", "A", 3.0), unit("3", "Q", 3.0)];
        let d = collapse_strata(&units, &pop(), &EstimatorOptions::default());
        assert_eq!(d.rows, vec![0, 1]);
        assert_eq!(
            d.warnings,
            vec![EstimationWarning::UnknownStratum { stratum: "Q".into(), units: 1 }]
        );
    }

    #[test]
    fn existing_mixed_row_is_absorbed() {
        let mut population = pop();
        population.push(StratumPopulation::new("mixed", 5.0));
        let units = vec![unit("1", "A", 2.0), unit("2", "mixed", 2.0), unit("3", "mixed", 1.0)];
        let d = collapse_strata(&units, &population, &EstimatorOptions::default());
        let mixed: Vec<_> = d.population.iter().filter(|p| p.stratum == "mixed").collect();
        assert_eq!(mixed.len(), 1);
        assert_eq!(mixed[0].n_pop, 15.0);
    }
}
