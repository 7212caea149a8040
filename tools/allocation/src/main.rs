//! Stratified sampling design for one year of validation tiles.
//! Reads per-tile attributes, stratifies by biome × fire activity, filters
//! on land cover and cloud-free frequency, and allocates the sample across
//! strata.  Output: stratification_{year}.csv, filtered_{year}.csv and
//! sampling_summary_{product}_{year}.csv.

use anyhow::{anyhow, bail, Context, Result};
use burnval_core::sampling::{AllocationParams, BaProduct, SamplingDesign, StratifiedTile, TileRecord};
use clap::Parser;
use serde::Serialize;
use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "allocation", about = "Stratify validation tiles and allocate the reference sample")]
struct Args {
    /// Tile attributes CSV for the year (Name, biome, <product>_burned_perc, land_perc,
    /// median_days_interval_fireseason_nocloudy).
    #[arg(short, long)]
    tiles: PathBuf,

    /// Reference year (2016 or later).
    #[arg(short, long)]
    year: u32,

    /// Burned-area product used to rank fire activity.
    #[arg(short = 'b', long, default_value = "firecci51")]
    ba_data: BaProduct,

    /// Total sample size to allocate.
    #[arg(short = 'n', long, default_value_t = 100)]
    total_sample_size: usize,

    /// Minimum land percentage of an eligible tile (0-100).
    #[arg(long, default_value_t = 50.0)]
    land_perc_filter: f64,

    /// Maximum median days between cloud-free images in the fire season.
    #[arg(long, default_value_t = 10.0)]
    nocloudy_interval_filter: f64,

    /// Output directory.
    #[arg(short, long, default_value = "data/sampling")]
    output: PathBuf,
}

impl Args {
    fn params(&self) -> AllocationParams {
        AllocationParams {
            year: self.year,
            product: self.ba_data,
            total_sample_size: self.total_sample_size,
            land_perc_min: self.land_perc_filter,
            nocloudy_interval_max: self.nocloudy_interval_filter,
            ..Default::default()
        }
    }
}

// ── Tile input ────────────────────────────────────────────────────────────────

const NOCLOUDY_COLUMN: &str = "median_days_interval_fireseason_nocloudy";

fn column(headers: &csv::StringRecord, names: &[&str]) -> Result<usize> {
    names
        .iter()
        .find_map(|n| headers.iter().position(|h| h == *n))
        .ok_or_else(|| anyhow!("Missing column '{}'", names[0]))
}

fn parse_f64(record: &csv::StringRecord, idx: usize, name: &str, line: usize) -> Result<Option<f64>> {
    let raw = record.get(idx).unwrap_or("").trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .with_context(|| format!("Line {line}: invalid {name} value '{raw}'"))
}

/// Read tile records, picking the burned percentage of `product`.
fn read_tiles<R: Read>(input: R, product: BaProduct) -> Result<Vec<TileRecord>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let headers = reader.headers()?.clone();
    let burned_name = product.burned_perc_column();
    let name_col = column(&headers, &["Name", "name"])?;
    let biome_col = column(&headers, &["biome"])?;
    let burned_col = column(&headers, &[burned_name.as_str()])?;
    let land_col = column(&headers, &["land_perc"])?;
    let cloud_col = column(&headers, &[NOCLOUDY_COLUMN])?;

    let mut tiles = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i + 2;
        let required = |idx: usize, name: &str| -> Result<f64> {
            parse_f64(&record, idx, name, line)?.ok_or_else(|| anyhow!("Line {line}: missing {name}"))
        };
        tiles.push(TileRecord {
            name: record.get(name_col).unwrap_or("").to_string(),
            biome: record.get(biome_col).unwrap_or("").to_string(),
            burned_perc: parse_f64(&record, burned_col, &burned_name, line)?.unwrap_or(f64::NAN),
            land_perc: required(land_col, "land_perc")?,
            nocloudy_interval: parse_f64(&record, cloud_col, NOCLOUDY_COLUMN, line)?,
        });
    }
    Ok(tiles)
}

// ── Output ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TileRow<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    biome: &'a str,
    burned_perc: f64,
    land_perc: f64,
    nocloudy_interval: Option<f64>,
    threshold: f64,
    fire_activity: &'static str,
    stratum: &'a str,
    id_stratum: &'a str,
}

impl<'a> From<&'a StratifiedTile> for TileRow<'a> {
    fn from(t: &'a StratifiedTile) -> Self {
        Self {
            name: &t.tile.name,
            biome: &t.tile.biome,
            burned_perc: t.tile.burned_perc,
            land_perc: t.tile.land_perc,
            nocloudy_interval: t.tile.nocloudy_interval,
            threshold: t.threshold,
            fire_activity: t.activity.as_str(),
            stratum: &t.stratum,
            id_stratum: &t.id_stratum,
        }
    }
}

fn write_rows<W: Write, T: Serialize>(out: W, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    for row in rows {
        w.serialize(row)?;
    }
    w.flush()?;
    Ok(())
}

fn write_file<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    write_rows(file, rows)?;
    tracing::info!(path = %path.display(), "wrote");
    Ok(())
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
    let params = args.params();

    let file = fs::File::open(&args.tiles)
        .with_context(|| format!("Cannot open {}", args.tiles.display()))?;
    let tiles = read_tiles(file, params.product)
        .with_context(|| format!("Failed to read tiles from {}", args.tiles.display()))?;
    if tiles.is_empty() {
        bail!("No tiles in {}", args.tiles.display());
    }
    tracing::info!(tiles = tiles.len(), year = params.year, product = %params.product, "loaded tiles");

    let design = SamplingDesign::build(&tiles, &params)?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;
    let year = params.year;
    write_file(
        &args.output.join(format!("stratification_{year}.csv")),
        design.stratified.iter().map(TileRow::from),
    )?;
    write_file(
        &args.output.join(format!("filtered_{year}.csv")),
        design.eligible.iter().map(TileRow::from),
    )?;
    write_file(
        &args.output.join(format!("sampling_summary_{}_{year}.csv", params.product)),
        &design.summary,
    )?;

    for a in &design.allocation {
        tracing::info!(stratum = %a.stratum, n_pop = a.n_pop, n = a.n, ba_mean = a.ba_mean, "allocation");
    }
    tracing::info!(
        strata = design.summary.len(),
        sample_size = design.sample_size(),
        requested = params.total_sample_size,
        "sampling design complete"
    );
    Ok(())
}
