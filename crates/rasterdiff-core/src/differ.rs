//! The per-pair comparison: band check → clip → read → mask → diff →
//! stats → histogram (best effort) → difference raster → statistics CSV.
//!
//! Every call is independent: it owns its buffers, writes only files named
//! after its own truth stem, and reports back through [`PairOutcome`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clip;
use crate::error::{DiffError, Result};
use crate::geotiff::{self, SampleType};
use crate::histogram::{self, Annotation, Histogram};
use crate::mask::{sentinel, DiffGrid, NoDataMask};
use crate::naming::{self, OutputNames};
use crate::options::DiffOptions;
use crate::raster::Raster;
use crate::report::{self, StatsRecord};
use crate::stats::DiffStats;

/// One truth/test pair to compare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairJob {
    pub truth: PathBuf,
    pub test: PathBuf,
}

impl PairJob {
    pub fn new(truth: impl Into<PathBuf>, test: impl Into<PathBuf>) -> Self {
        Self { truth: truth.into(), test: test.into() }
    }
}

/// Files produced by a completed comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairArtifacts {
    pub diff_raster: PathBuf,
    /// `None` when the histogram could not be built.
    pub histogram: Option<PathBuf>,
    pub stats_csv: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairReport {
    pub stem: String,
    pub record: StatsRecord,
    pub artifacts: PairArtifacts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairOutcome {
    Done(PairReport),
    /// Band ids differ; nothing was written.
    Skipped { truth_band: String, test_band: String },
    /// Grids could not be subtracted; only the empty marker was written.
    Aborted { marker: PathBuf, reason: String },
}

impl PairOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            PairOutcome::Done(_) => "done",
            PairOutcome::Skipped { .. } => "skipped",
            PairOutcome::Aborted { .. } => "aborted",
        }
    }
}

/// Compare one pair and write its artifacts into `opts.out_dir`.
///
/// Band mismatches and shape mismatches are outcomes, not errors. `Err` is
/// reserved for I/O and decoding failures.
pub fn diff_pair(job: &PairJob, opts: &DiffOptions) -> Result<PairOutcome> {
    let started = Instant::now();

    let truth_band = naming::band_id(&job.truth, &opts.truth_ext);
    let test_band = naming::band_id(&job.test, &opts.test_ext);
    if truth_band != test_band {
        info!("Bands {truth_band} and {test_band} are not a match, skipping");
        return Ok(PairOutcome::Skipped { truth_band, test_band });
    }

    let names = OutputNames::for_truth(&job.truth);
    info!(
        "Testing {} (truth) against {} (test)",
        job.truth.display(),
        job.test.display()
    );

    let truth = geotiff::read_band1(&job.truth)?;
    let extent = truth.extent();
    debug!(?extent, "truth extent");

    let nodata = sentinel(opts.nodata);
    let temp_clip = clip::clip_to_file(&job.test, &extent, nodata, &opts.out_dir)?;
    let test = geotiff::read_band1(temp_clip.path())?;

    let diff = match NoDataMask::build(&truth, &test, nodata)
        .and_then(|mask| DiffGrid::compute(&truth, &test, mask))
    {
        Ok(diff) => diff,
        Err(e) if e.is_shape_mismatch() => {
            let marker = opts.out_dir.join(names.abort_marker());
            warn!("{e}; writing {}", marker.display());
            report::write_marker(&marker)?;
            return Ok(PairOutcome::Aborted { marker, reason: e.to_string() });
        }
        Err(e) => return Err(e),
    };

    let stats = DiffStats::compute(diff.valid());
    debug!(npix_total = stats.npix_total, npix_diff = stats.npix_diff, "stats done");

    let histogram = write_histogram(&diff, &stats, &names, opts)?;
    let diff_raster = write_diff_raster(&diff, &truth, &names, opts)?;

    let stats_csv = opts.out_dir.join(names.stats_csv());
    let record = StatsRecord {
        truth_id: naming::file_name(&job.truth),
        truth_band,
        test_file: naming::file_name(&job.test),
        test_band,
        stats,
    };
    report::write_stats_csv(&stats_csv, &record)?;

    info!(
        "{}: {} of {} pixels differ ({}%), done in {:.3} s",
        names.stem,
        stats.npix_diff,
        stats.npix_total,
        stats.pct_diff,
        started.elapsed().as_secs_f64()
    );

    Ok(PairOutcome::Done(PairReport {
        stem: names.stem,
        record,
        artifacts: PairArtifacts { diff_raster, histogram, stats_csv },
    }))
}

/// Histogram failures caused by the data are swallowed; I/O failures are not.
fn write_histogram(
    diff: &DiffGrid,
    stats: &DiffStats,
    names: &OutputNames,
    opts: &DiffOptions,
) -> Result<Option<PathBuf>> {
    let values: Vec<f64> = diff.valid().map(f64::from).collect();
    let path = opts.out_dir.join(names.histogram());
    let built = Histogram::build(&values, opts.hist_bins).and_then(|hist| {
        let note = Annotation::from_stats(&names.stem, stats);
        histogram::write_png(&path, &hist, &note)
    });
    match built {
        Ok(()) => Ok(Some(path)),
        Err(DiffError::Histogram(reason)) => {
            debug!("{}: histogram skipped: {reason}", names.stem);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn write_diff_raster(
    diff: &DiffGrid,
    truth: &Raster,
    names: &OutputNames,
    opts: &DiffOptions,
) -> Result<PathBuf> {
    let nodata = sentinel(opts.nodata);
    let out = Raster {
        data: diff.filled(nodata),
        cols: truth.cols,
        rows: truth.rows,
        transform: truth.transform,
        geo_keys: truth.geo_keys.clone(),
        nodata: Some(nodata),
    };
    let path = opts.out_dir.join(names.diff_raster());
    geotiff::write_raster(&path, &out, SampleType::Float32)?;
    Ok(path)
}

/// Convenience for callers that only have paths and the shared options.
pub fn diff_paths(truth: &Path, test: &Path, opts: &DiffOptions) -> Result<PairOutcome> {
    diff_pair(&PairJob::new(truth, test), opts)
}
