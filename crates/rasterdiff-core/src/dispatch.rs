//! Batch mode: discover truth/test files in two directory trees, pair them,
//! and run every pair on a fixed-size worker pool.
//!
//! Index pairing zips the two sorted lists by position and so assumes both
//! trees sort identically; band-id pairing matches on parent directory name
//! plus band id instead. Index pairing stays the default.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::differ::{diff_pair, PairJob, PairOutcome};
use crate::error::{DiffError, Result};
use crate::naming;
use crate::options::DiffOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairingMode {
    /// Zip both sorted lists by position.
    #[default]
    Index,
    /// Match on (parent directory name, band id).
    BandId,
}

/// Files two levels below `dir` whose names end in `ext`, sorted lexically.
pub fn discover(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{escaped}/*/*{}", glob::Pattern::escape(ext));
    let paths = glob::glob(&pattern).map_err(|source| DiffError::Pattern {
        pattern: pattern.clone(),
        source,
    })?;

    let mut found = Vec::new();
    for entry in paths {
        match entry {
            Ok(p) if p.is_file() => found.push(p),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable path: {e}"),
        }
    }
    found.sort();
    Ok(found)
}

/// Positional pairing; extra files in the longer list are dropped.
pub fn pair_by_index(truths: &[PathBuf], tests: &[PathBuf]) -> Vec<PairJob> {
    if truths.len() != tests.len() {
        warn!(
            "Truth tree has {} files, test tree has {}; pairing the first {}",
            truths.len(),
            tests.len(),
            truths.len().min(tests.len())
        );
    }
    truths
        .iter()
        .zip(tests)
        .map(|(t, s)| PairJob::new(t, s))
        .collect()
}

fn pairing_key(path: &Path, ext: &str) -> (String, String) {
    let parent = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (parent, naming::band_id(path, ext))
}

/// Pair files sharing a parent directory name and band id, in truth order.
pub fn pair_by_band_id(truths: &[PathBuf], tests: &[PathBuf], truth_ext: &str, test_ext: &str) -> Vec<PairJob> {
    let mut by_key: HashMap<(String, String), &PathBuf> = HashMap::new();
    for test in tests {
        if let Some(prev) = by_key.insert(pairing_key(test, test_ext), test) {
            warn!("Duplicate test key for {} and {}", prev.display(), test.display());
        }
    }

    let mut jobs = Vec::new();
    for truth in truths {
        match by_key.remove(&pairing_key(truth, truth_ext)) {
            Some(test) => jobs.push(PairJob::new(truth, test)),
            None => warn!("No test file matches {}", truth.display()),
        }
    }
    for test in by_key.values() {
        warn!("No truth file matches {}", test.display());
    }
    jobs
}

pub fn pair(truths: &[PathBuf], tests: &[PathBuf], mode: PairingMode, opts: &DiffOptions) -> Vec<PairJob> {
    match mode {
        PairingMode::Index => pair_by_index(truths, tests),
        PairingMode::BandId => pair_by_band_id(truths, tests, &opts.truth_ext, &opts.test_ext),
    }
}

/// Output stems must be unique within a batch or pairs overwrite each other.
pub fn duplicate_stems(jobs: &[PairJob]) -> Vec<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for job in jobs {
        *counts.entry(naming::OutputNames::for_truth(&job.truth).stem).or_default() += 1;
    }
    counts.into_iter().filter(|&(_, n)| n > 1).map(|(s, _)| s).collect()
}

/// Available processors minus one, never below one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

// ── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobResult {
    Finished { outcome: PairOutcome },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job: PairJob,
    #[serde(flatten)]
    pub result: JobResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub options: Option<DiffOptions>,
    pub workers: usize,
    pub done: usize,
    pub skipped: usize,
    pub aborted: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
    pub jobs: Vec<JobRecord>,
}

impl BatchSummary {
    fn tally(options: &DiffOptions, workers: usize, jobs: Vec<JobRecord>, elapsed_secs: f64) -> Self {
        let mut summary = Self {
            options: Some(options.clone()),
            workers,
            elapsed_secs,
            ..Self::default()
        };
        for record in &jobs {
            match &record.result {
                JobResult::Finished { outcome: PairOutcome::Done(_) } => summary.done += 1,
                JobResult::Finished { outcome: PairOutcome::Skipped { .. } } => summary.skipped += 1,
                JobResult::Finished { outcome: PairOutcome::Aborted { .. } } => summary.aborted += 1,
                JobResult::Failed { .. } => summary.failed += 1,
            }
        }
        summary.jobs = jobs;
        summary
    }

    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|source| DiffError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|e| DiffError::io(path, e))
    }
}

fn run_one(job: &PairJob, opts: &DiffOptions) -> JobRecord {
    let result = match diff_pair(job, opts) {
        Ok(outcome) => {
            debug!("{} vs {}: {}", job.truth.display(), job.test.display(), outcome.label());
            JobResult::Finished { outcome }
        }
        Err(e) => {
            error!("{} vs {} failed: {e}", job.truth.display(), job.test.display());
            JobResult::Failed { error: e.to_string() }
        }
    };
    JobRecord { job: job.clone(), result }
}

/// Run every job on a pool of `workers` threads. One failing pair never stops
/// the others; records come back in job order.
pub fn run_batch(jobs: &[PairJob], opts: &DiffOptions, workers: usize) -> Result<BatchSummary> {
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;

    let started = Instant::now();
    info!("Dispatching {} pairs on {} workers", jobs.len(), workers);
    let records: Vec<JobRecord> = pool.install(|| jobs.par_iter().map(|job| run_one(job, opts)).collect());

    let summary = BatchSummary::tally(opts, workers, records, started.elapsed().as_secs_f64());
    info!(
        "Batch finished: {} done, {} skipped, {} aborted, {} failed in {:.1} s",
        summary.done, summary.skipped, summary.aborted, summary.failed, summary.elapsed_secs
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(&p, b"").unwrap();
        p
    }

    #[test]
    fn discover_is_two_levels_deep_and_sorted() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "s2/s2_sr_band1.tif");
        touch(dir.path(), "s1/s1_sr_band2.tif");
        touch(dir.path(), "s1/s1_sr_band1.tif");
        touch(dir.path(), "top_level.tif");
        touch(dir.path(), "s1/deeper/s1_x_y.tif");
        touch(dir.path(), "s1/s1_sr_band1.img");

        let found = discover(dir.path(), ".tif").unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["s1/s1_sr_band1.tif", "s1/s1_sr_band2.tif", "s2/s2_sr_band1.tif"]);
    }

    #[test]
    fn index_pairing_trusts_sort_order() {
        let truths = vec![PathBuf::from("m/a/a_sr_band1.tif"), PathBuf::from("m/a/a_sr_band2.tif")];
        // Test tree sorts differently: band2 comes first.
        let tests = vec![PathBuf::from("t/a/a_sr_band2.tif"), PathBuf::from("t/a/b_sr_band1.tif")];

        let jobs = pair_by_index(&truths, &tests);
        assert_eq!(jobs[0], PairJob::new("m/a/a_sr_band1.tif", "t/a/a_sr_band2.tif"));
        assert_eq!(jobs[1], PairJob::new("m/a/a_sr_band2.tif", "t/a/b_sr_band1.tif"));
    }

    #[test]
    fn band_id_pairing_matches_on_parent_and_band() {
        let truths = vec![PathBuf::from("m/a/a_sr_band1.tif"), PathBuf::from("m/a/a_sr_band2.tif")];
        let tests = vec![PathBuf::from("t/a/a_sr_band2.img"), PathBuf::from("t/a/b_sr_band1.img")];

        let jobs = pair_by_band_id(&truths, &tests, ".tif", ".img");
        assert_eq!(
            jobs,
            vec![
                PairJob::new("m/a/a_sr_band1.tif", "t/a/b_sr_band1.img"),
                PairJob::new("m/a/a_sr_band2.tif", "t/a/a_sr_band2.img"),
            ]
        );
    }

    #[test]
    fn index_pairing_truncates_to_shorter_list() {
        let truths = vec![PathBuf::from("a_b_c.tif"); 3];
        let tests = vec![PathBuf::from("d_b_c.tif"); 2];
        assert_eq!(pair_by_index(&truths, &tests).len(), 2);
    }

    #[test]
    fn duplicate_stems_are_reported() {
        let jobs = vec![
            PairJob::new("m/a/x_B1.tif", "t/a/x_B1.tif"),
            PairJob::new("m/b/x_B1.tif", "t/b/x_B1.tif"),
            PairJob::new("m/b/y_B1.tif", "t/b/y_B1.tif"),
        ];
        assert_eq!(duplicate_stems(&jobs), vec!["x_B1.tif".to_string()]);
    }

    #[test]
    fn default_workers_is_at_least_one() {
        assert!(default_workers() >= 1);
    }

    #[test]
    fn failures_are_recorded_not_fatal() {
        let dir = tempdir().unwrap();
        let opts = DiffOptions::new(0.0, ".tif", ".tif").with_out_dir(dir.path());
        let jobs = vec![
            PairJob::new(dir.path().join("a_x_B1.tif"), dir.path().join("b_x_B1.tif")),
            PairJob::new("x_B1.tif", "x_B2.tif"),
        ];
        let summary = run_batch(&jobs, &opts, 2).unwrap();
        assert_eq!(summary.total(), 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(matches!(summary.jobs[0].result, JobResult::Failed { .. }));
    }
}
