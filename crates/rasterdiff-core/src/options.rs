use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::histogram::DEFAULT_BINS;

/// Per-run settings shared by every pair. Built from the command line and
/// echoed into the batch summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffOptions {
    /// No-data sentinel; compared and written as its integer truncation.
    pub nodata: f64,
    /// Extension of truth files, including the dot (e.g. ".tif").
    pub truth_ext: String,
    /// Extension of test files, including the dot.
    pub test_ext: String,
    /// Where the per-pair artifacts (and the temporary clip) are written.
    pub out_dir: PathBuf,
    pub hist_bins: usize,
}

impl DiffOptions {
    pub fn new(nodata: f64, truth_ext: impl Into<String>, test_ext: impl Into<String>) -> Self {
        Self {
            nodata,
            truth_ext: truth_ext.into(),
            test_ext: test_ext.into(),
            out_dir: PathBuf::from("."),
            hist_bins: DEFAULT_BINS,
        }
    }

    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    pub fn with_hist_bins(mut self, bins: usize) -> Self {
        self.hist_bins = bins;
        self
    }
}
