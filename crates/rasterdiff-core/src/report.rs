//! Statistics CSV and the empty "did not do analysis" marker.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DiffError, Result};
use crate::stats::DiffStats;

pub const CSV_HEADER: [&str; 16] = [
    "scene_id_mast",
    "file_id_mast",
    "scene_id_test",
    "file_id_test",
    "npix_diff",
    "npix_total",
    "pct_diff",
    "mean",
    "abs_mean",
    "median",
    "min",
    "max",
    "std_dev",
    "25_pctile",
    "75_pctile",
    "iqr",
];

/// One row of the statistics CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub truth_id: String,
    pub truth_band: String,
    pub test_file: String,
    pub test_band: String,
    pub stats: DiffStats,
}

impl StatsRecord {
    pub fn fields(&self) -> [String; 16] {
        let s = &self.stats;
        [
            self.truth_id.clone(),
            self.truth_band.clone(),
            self.test_file.clone(),
            self.test_band.clone(),
            s.npix_diff.to_string(),
            s.npix_total.to_string(),
            s.pct_diff.to_string(),
            s.mean.to_string(),
            s.abs_mean.to_string(),
            s.median.to_string(),
            s.min.to_string(),
            s.max.to_string(),
            s.std_dev.to_string(),
            s.p25.to_string(),
            s.p75.to_string(),
            s.iqr.to_string(),
        ]
    }
}

fn needs_quoting(field: &str) -> bool {
    field.contains([',', '"', '\n', '\r'])
}

/// Write the header and the single data row, comma-separated and unquoted.
/// A field that would need quoting is an error and nothing is written.
pub fn write_stats_csv(path: &Path, record: &StatsRecord) -> Result<()> {
    let fields = record.fields();
    if let Some(bad) = fields.iter().find(|f| needs_quoting(f)) {
        return Err(DiffError::UnquotableField {
            path: path.to_path_buf(),
            field: bad.clone(),
        });
    }

    let file = File::create(path).map_err(|e| DiffError::io(path, e))?;
    let mut w = BufWriter::new(file);
    writeln!(w, "{}", CSV_HEADER.join(","))
        .and_then(|_| writeln!(w, "{}", fields.join(",")))
        .and_then(|_| w.flush())
        .map_err(|e| DiffError::io(path, e))
}

/// Create (or truncate) the empty marker left when a pair could not be analysed.
pub fn write_marker(path: &Path) -> Result<()> {
    fs::write(path, b"").map_err(|e| DiffError::io(path, e))
}

/// Parse a file written by [`write_stats_csv`] back into header → value pairs.
pub fn read_stats_csv(path: &Path) -> Result<Vec<(String, String)>> {
    let text = fs::read_to_string(path).map_err(|e| DiffError::io(path, e))?;
    let mut lines = text.lines();
    let header = lines.next().unwrap_or_default();
    let row = lines.next().unwrap_or_default();
    Ok(header
        .split(',')
        .zip(row.split(','))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect())
}
