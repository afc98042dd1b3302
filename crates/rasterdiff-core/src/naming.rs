//! Filename conventions: band ids and output stems.
//!
//! Landsat-style products end in `..._<product>_<band>.<ext>`, e.g.
//! `LC08_L1TP_034032_20160901_sr_band4.tif` → band id `sr_band4`.

use std::path::Path;

/// File name of `path` with `ext` removed when it is a suffix, otherwise the
/// plain file stem.
pub fn strip_ext(path: &Path, ext: &str) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !ext.is_empty() {
        if let Some(stripped) = name.strip_suffix(ext) {
            if !stripped.is_empty() {
                return stripped.to_string();
            }
        }
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(name)
}

/// The last two underscore-separated tokens of the stem, joined with `_`.
/// Stems with fewer than two tokens are their own id.
pub fn band_id(path: &Path, ext: &str) -> String {
    let stem = strip_ext(path, ext);
    let tokens: Vec<&str> = stem.split('_').collect();
    if tokens.len() < 2 {
        return stem;
    }
    tokens[tokens.len() - 2..].join("_")
}

/// Bare file name, used verbatim in the statistics record.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Output file names for one pair. The stem is the full truth file name,
/// extension included: `scene_sr_band4.tif` → `scene_sr_band4.tif_diff.tif`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    pub stem: String,
}

impl OutputNames {
    pub fn for_truth(truth: &Path) -> Self {
        Self { stem: file_name(truth) }
    }

    pub fn diff_raster(&self) -> String {
        format!("{}_diff.tif", self.stem)
    }

    pub fn histogram(&self) -> String {
        format!("{}_diff_hist.png", self.stem)
    }

    pub fn stats_csv(&self) -> String {
        format!("{}_stats.csv", self.stem)
    }

    pub fn abort_marker(&self) -> String {
        format!("{}_did_not_do_analysis.csv", self.stem)
    }
}
