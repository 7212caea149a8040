//! Accuracy assessment of a burned-area product from reference units.
//! Reads per-unit error matrices, stratum populations and an optional
//! stratum → biome table, and writes R / sdR tables for the whole sample and
//! for every biome.  Output: accuracy_global.csv, accuracy_biomes.csv and,
//! with --detail, accuracy_detail.json.

use anyhow::{bail, Context, Result};
use burnval_core::estimator::{estimate_domains, AccuracyTable, DomainReport, Estimation, EstimatorOptions};
use burnval_core::metrics::{compose, Metric};
use burnval_core::units::{BiomeLookup, ErrorMatrix, SamplingUnit, StratumPopulation};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "accuracy", about = "Estimate burned-area accuracy metrics from stratified reference units")]
struct Args {
    /// Reference units CSV: unit_id, stratum, M, tb, ce, oe, tub[, m].
    #[arg(short, long)]
    units: PathBuf,

    /// Stratum populations CSV: stratum, N.
    #[arg(short, long)]
    population: PathBuf,

    /// Stratum → biome CSV: stratum, biome.  Without it only the global table is written.
    #[arg(short, long)]
    biomes: Option<PathBuf>,

    /// Comma-separated metric names (Ce, Oe, DC, bias, relB, B, BAref, BAprod).
    #[arg(short, long, default_value = "Ce,Oe,DC,bias,relB,B,BAref,BAprod")]
    metrics: String,

    /// Estimator options JSON.
    #[arg(long)]
    options: Option<PathBuf>,

    /// Write per-stratum detail and unit assignments to accuracy_detail.json
    /// (also enabled by `"detail": true` in the options file).
    #[arg(long)]
    detail: bool,

    /// Output directory.
    #[arg(short, long, default_value = "data/accuracy")]
    output: PathBuf,
}

// ── Input rows ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UnitRow {
    unit_id: String,
    stratum: String,
    #[serde(rename = "M")]
    size_weight: f64,
    tb: f64,
    ce: f64,
    oe: f64,
    tub: f64,
    #[serde(default)]
    m: Option<f64>,
}

impl UnitRow {
    fn into_unit(self) -> SamplingUnit {
        let matrix = ErrorMatrix::new(self.tb, self.ce, self.oe, self.tub);
        let unit = SamplingUnit::new(self.unit_id, self.stratum, self.size_weight, matrix);
        match self.m {
            Some(m) => unit.with_m(m),
            None => unit,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BiomeRow {
    stratum: String,
    biome: String,
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Cannot open {}", path.display()))?;
    reader
        .deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("{}: bad record {}", path.display(), i + 1)))
        .collect()
}

fn load_options(path: Option<&Path>, detail: bool) -> Result<EstimatorOptions> {
    let opts = match path {
        Some(p) => {
            let text = fs::read_to_string(p).with_context(|| format!("Cannot read {}", p.display()))?;
            EstimatorOptions::from_json(&text).with_context(|| format!("Invalid options in {}", p.display()))?
        }
        None => EstimatorOptions::default(),
    };
    Ok(if detail { opts.with_detail(true) } else { opts })
}

// ── Output ────────────────────────────────────────────────────────────────────

fn write_global<W: Write>(out: W, table: &AccuracyTable) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    let mut header = vec![String::new()];
    header.extend(table.metrics.iter().cloned());
    w.write_record(&header)?;
    for (label, values) in table.rows() {
        let mut record = vec![label.to_string()];
        record.extend(values.iter().map(f64::to_string));
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}

fn write_biomes<W: Write>(out: W, metrics: &[String], tables: &[(String, AccuracyTable)]) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    let mut header = vec!["biome".to_string(), "stat".to_string()];
    header.extend(metrics.iter().cloned());
    w.write_record(&header)?;
    for (biome, table) in tables {
        for (label, values) in table.rows() {
            let mut record = vec![biome.clone(), label.to_string()];
            record.extend(values.iter().map(f64::to_string));
            w.write_record(&record)?;
        }
    }
    w.flush()?;
    Ok(())
}

#[derive(Serialize)]
#[serde(untagged)]
enum DomainDetail<'a> {
    Estimated(&'a Estimation),
    Failed { error: String },
}

impl<'a> DomainDetail<'a> {
    fn from_result(res: &'a burnval_core::error::Result<Estimation>) -> Self {
        match res {
            Ok(e) => DomainDetail::Estimated(e),
            Err(err) => DomainDetail::Failed { error: err.to_string() },
        }
    }
}

#[derive(Serialize)]
struct DetailFile<'a> {
    metrics: &'a [String],
    global: DomainDetail<'a>,
    biomes: Vec<(&'a str, DomainDetail<'a>)>,
}

fn detail_json(report: &DomainReport) -> Result<String> {
    let file = DetailFile {
        metrics: &report.metrics,
        global: DomainDetail::from_result(&report.global),
        biomes: report
            .domains
            .iter()
            .map(|(b, r)| (b.as_str(), DomainDetail::from_result(r)))
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&file)?)
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let metrics = Metric::parse_list(&args.metrics)?;
    if metrics.is_empty() {
        bail!("No metrics requested");
    }
    let names: Vec<&str> = metrics.iter().map(|m| m.name()).collect();
    let options = load_options(args.options.as_deref(), args.detail)?;

    let units: Vec<SamplingUnit> = read_rows::<UnitRow>(&args.units)?
        .into_iter()
        .map(UnitRow::into_unit)
        .collect();
    let population: Vec<StratumPopulation> = read_rows(&args.population)?;
    let lookup: BiomeLookup = match &args.biomes {
        Some(p) => read_rows::<BiomeRow>(p)?.into_iter().map(|r| (r.stratum, r.biome)).collect(),
        None => BiomeLookup::new(),
    };
    tracing::info!(
        units = units.len(),
        strata = population.len(),
        biomes = lookup.biomes().len(),
        "loaded inputs"
    );

    let table = compose(&units, &metrics)?;
    let report = estimate_domains(&units, &table, &population, &lookup, &names, &options);
    if let Err(err) = &report.global {
        bail!("Global estimation failed: {err}");
    }

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;

    let global_path = args.output.join("accuracy_global.csv");
    write_global(fs::File::create(&global_path)?, &report.global_table())?;
    tracing::info!(path = %global_path.display(), "wrote global table");

    if !lookup.is_empty() {
        let biomes_path = args.output.join("accuracy_biomes.csv");
        write_biomes(fs::File::create(&biomes_path)?, &report.metrics, &report.domain_tables())?;
        tracing::info!(path = %biomes_path.display(), domains = report.domains.len(), "wrote biome table");
    }

    if options.detail {
        let detail_path = args.output.join("accuracy_detail.json");
        fs::write(&detail_path, detail_json(&report)?)
            .with_context(|| format!("Cannot write {}", detail_path.display()))?;
        tracing::info!(path = %detail_path.display(), "wrote detail");
    }

    if report.failures() > 0 {
        tracing::warn!(failed = report.failures(), "some biome domains could not be estimated");
    }
    Ok(())
}
