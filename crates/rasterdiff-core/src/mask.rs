//! No-data masking and the truth − test difference grid.

use crate::error::{DiffError, Result};
use crate::raster::Raster;

/// The sentinel as the comparisons see it: truncated to an integer.
#[inline]
pub fn sentinel(nodata: f64) -> f64 {
    nodata.trunc()
}

fn check_shapes(truth: &Raster, test: &Raster) -> Result<()> {
    if truth.shape() != test.shape() {
        return Err(DiffError::ShapeMismatch {
            truth_cols: truth.cols,
            truth_rows: truth.rows,
            test_cols: test.cols,
            test_rows: test.rows,
        });
    }
    Ok(())
}

/// True wherever truth or test holds the sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct NoDataMask {
    pub cells: Vec<bool>,
    pub cols: usize,
    pub rows: usize,
}

impl NoDataMask {
    pub fn build(truth: &Raster, test: &Raster, nodata: f64) -> Result<Self> {
        check_shapes(truth, test)?;
        let s = sentinel(nodata);
        let cells = truth
            .data
            .iter()
            .zip(&test.data)
            .map(|(&a, &b)| a == s || b == s)
            .collect();
        Ok(Self { cells, cols: truth.cols, rows: truth.rows })
    }

    pub fn valid_count(&self) -> usize {
        self.cells.iter().filter(|&&m| !m).count()
    }
}

/// `truth - test` as f32, paired with the mask that decides which cells count.
#[derive(Debug, Clone)]
pub struct DiffGrid {
    pub values: Vec<f32>,
    pub mask: NoDataMask,
}

impl DiffGrid {
    pub fn compute(truth: &Raster, test: &Raster, mask: NoDataMask) -> Result<Self> {
        check_shapes(truth, test)?;
        let values = truth
            .data
            .iter()
            .zip(&test.data)
            .map(|(&a, &b)| (a - b) as f32)
            .collect();
        Ok(Self { values, mask })
    }

    /// Differences at unmasked cells, in row-major order.
    pub fn valid(&self) -> impl Iterator<Item = f32> + '_ {
        self.values
            .iter()
            .zip(&self.mask.cells)
            .filter(|&(_, &m)| !m)
            .map(|(&v, _)| v)
    }

    /// Output samples: masked cells carry the sentinel instead of a computed value.
    pub fn filled(&self, nodata: f64) -> Vec<f64> {
        let s = sentinel(nodata);
        self.values
            .iter()
            .zip(&self.mask.cells)
            .map(|(&v, &m)| if m { s } else { f64::from(v) })
            .collect()
    }
}
