//! Compare a truth raster against a test raster, or every pair in two
//! directory trees, writing difference rasters, histograms and statistics.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{error::ErrorKind, Parser, ValueEnum};
use rasterdiff_core::dispatch::{self, PairingMode};
use rasterdiff_core::histogram::DEFAULT_BINS;
use rasterdiff_core::{DiffOptions, PairJob};
use tracing::{error, info, warn};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "simple_diff",
    version,
    about = "Difference a test raster against a truth raster",
    allow_negative_numbers = true
)]
struct Args {
    /// Truth raster, or a directory of `<scene>/<file>` truth rasters.
    truth: PathBuf,

    /// Test raster, or a directory laid out like the truth directory.
    test: PathBuf,

    /// No-data value; compared after truncation to an integer.
    nodata_value: f64,

    /// Truth file extension including the dot (e.g. .tif).
    truth_ext: String,

    /// Test file extension including the dot.
    test_ext: String,

    /// Directory the per-pair outputs are written to.
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Worker threads for batch mode [default: processors - 1].
    #[arg(short, long)]
    jobs: Option<usize>,

    /// How truth and test files are matched in batch mode.
    #[arg(short, long, value_enum, default_value_t = Pairing::Index)]
    pairing: Pairing,

    /// Histogram bin count.
    #[arg(short, long, default_value_t = DEFAULT_BINS)]
    bins: usize,

    /// Write a JSON summary of every job to this file.
    #[arg(short, long)]
    summary: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pairing {
    /// Zip sorted file lists by position.
    Index,
    /// Match on scene directory and band id.
    BandId,
}

impl From<Pairing> for PairingMode {
    fn from(p: Pairing) -> Self {
        match p {
            Pairing::Index => PairingMode::Index,
            Pairing::BandId => PairingMode::BandId,
        }
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────

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

    let level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating output directory {}", args.out_dir.display()))?;

    let opts = DiffOptions::new(args.nodata_value, &args.truth_ext, &args.test_ext)
        .with_out_dir(&args.out_dir)
        .with_hist_bins(args.bins);

    let (jobs, workers) = if args.truth.is_dir() {
        let truths = dispatch::discover(&args.truth, &opts.truth_ext)?;
        let tests = dispatch::discover(&args.test, &opts.test_ext)?;
        info!(
            "Found {} truth and {} test files under {} and {}",
            truths.len(),
            tests.len(),
            args.truth.display(),
            args.test.display()
        );
        if truths.is_empty() || tests.is_empty() {
            warn!("Nothing to compare");
        }

        let jobs = dispatch::pair(&truths, &tests, args.pairing.into(), &opts);
        for stem in dispatch::duplicate_stems(&jobs) {
            warn!("Output stem {stem} appears more than once; later pairs overwrite earlier ones");
        }
        (jobs, args.jobs.unwrap_or_else(dispatch::default_workers))
    } else {
        (vec![PairJob::new(&args.truth, &args.test)], 1)
    };

    let summary = dispatch::run_batch(&jobs, &opts, workers).context("running comparisons")?;

    if let Some(path) = &args.summary {
        summary.write_json(path)?;
        info!("Summary written to {}", path.display());
    }
    Ok(())
}
