//! Error type shared by every stage of a pair comparison.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiffError>;

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TIFF error in {path}: {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("PNG encoding failed for {path}: {source}")]
    Png {
        path: PathBuf,
        #[source]
        source: png::EncodingError,
    },

    /// The decoder produced a sample type we cannot widen to f64.
    #[error("Unsupported sample format in {path}: {detail}")]
    UnsupportedFormat { path: PathBuf, detail: String },

    /// Truth and clipped test grids cannot be subtracted.
    #[error("Shape mismatch: truth is {truth_cols}x{truth_rows}, test is {test_cols}x{test_rows}")]
    ShapeMismatch {
        truth_cols: usize,
        truth_rows: usize,
        test_cols: usize,
        test_rows: usize,
    },

    /// A CSV field holds a delimiter, quote or line break and cannot be written unquoted.
    #[error("Cannot write {field:?} unquoted to {path}")]
    UnquotableField { path: PathBuf, field: String },

    #[error("Histogram unavailable: {0}")]
    Histogram(String),

    #[error("Invalid glob pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Could not write JSON to {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl DiffError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DiffError::Io { path: path.into(), source }
    }

    pub(crate) fn tiff(path: impl Into<PathBuf>, source: tiff::TiffError) -> Self {
        DiffError::Tiff { path: path.into(), source }
    }

    /// Shape mismatches abort a single pair; everything else is a failure.
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(self, DiffError::ShapeMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_mismatch_message_names_both_grids() {
        let err = DiffError::ShapeMismatch {
            truth_cols: 100,
            truth_rows: 100,
            test_cols: 50,
            test_rows: 50,
        };
        assert!(err.is_shape_mismatch());
        assert_eq!(
            err.to_string(),
            "Shape mismatch: truth is 100x100, test is 50x50"
        );
    }

    #[test]
    fn io_error_keeps_path() {
        let err = DiffError::io(
            "/tmp/missing.tif",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(!err.is_shape_mismatch());
        assert!(err.to_string().contains("/tmp/missing.tif"));
    }
}
