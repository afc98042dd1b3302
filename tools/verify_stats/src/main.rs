//! Recompute summary statistics from a written difference raster and check
//! them against the statistics CSV written alongside it.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{error::ErrorKind, Parser};
use rasterdiff_core::mask::sentinel;
use rasterdiff_core::{geotiff, report, DiffStats};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "verify_stats",
    about = "Check a statistics CSV against its difference raster",
    allow_negative_numbers = true
)]
struct Args {
    /// The `<stem>_diff.tif` raster.
    diff_tif: PathBuf,

    /// The `<stem>_stats.csv` written with it.
    stats_csv: PathBuf,

    /// No-data value [default: the raster's GDAL_NODATA tag].
    #[arg(short, long)]
    nodata: Option<f64>,

    /// Largest accepted absolute difference per statistic.
    #[arg(short, long, default_value_t = 1e-6)]
    tolerance: f64,
}

const CHECKED: [&str; 4] = ["mean", "median", "min", "max"];

#[derive(Debug)]
struct Check {
    name: &'static str,
    csv: f64,
    raster: f64,
}

impl Check {
    fn passes(&self, tolerance: f64) -> bool {
        (self.csv.is_nan() && self.raster.is_nan()) || (self.csv - self.raster).abs() <= tolerance
    }
}

fn checks(recomputed: &DiffStats, csv: &[(String, String)]) -> Result<Vec<Check>> {
    CHECKED
        .iter()
        .map(|&name| -> Result<Check> {
            let raw = csv
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v)
                .ok_or_else(|| anyhow!("column {name} missing from CSV"))?;
            let csv_value: f64 = raw.parse().with_context(|| format!("column {name}: {raw:?}"))?;
            let raster = match name {
                "mean" => recomputed.mean,
                "median" => recomputed.median,
                "min" => recomputed.min,
                _ => recomputed.max,
            };
            Ok(Check { name, csv: csv_value, raster })
        })
        .collect()
}

fn verify(args: &Args) -> Result<bool> {
    let raster = geotiff::read_band1(&args.diff_tif)?;
    let nodata = args
        .nodata
        .or(raster.nodata)
        .ok_or_else(|| anyhow!("{} has no no-data tag; pass --nodata", args.diff_tif.display()))?;
    let s = sentinel(nodata);

    let recomputed = DiffStats::compute(raster.data.iter().filter(|&&v| v != s).map(|&v| v as f32));
    let csv = report::read_stats_csv(&args.stats_csv)?;

    let mut ok = true;
    for check in checks(&recomputed, &csv)? {
        if check.passes(args.tolerance) {
            info!("  ✓ {:<7} {}", check.name, check.csv);
        } else {
            error!("  ✗ {:<7} CSV {} vs raster {}", check.name, check.csv, check.raster);
            ok = false;
        }
    }
    Ok(ok)
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match verify(&args) {
        Ok(true) => {
            info!("{} matches {}", args.stats_csv.display(), args.diff_tif.display());
            ExitCode::SUCCESS
        }
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
