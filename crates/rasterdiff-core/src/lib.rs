//! Difference analysis for pairs of co-registered single-band rasters.
//!
//! A pair is a "truth" raster and a "test" raster of the same band. The test
//! raster is clipped to the truth extent, both are masked where either holds
//! the no-data sentinel, and `truth - test` is summarised into a difference
//! GeoTIFF, a histogram PNG and a one-row statistics CSV.

pub mod clip;
pub mod differ;
pub mod dispatch;
pub mod error;
pub mod geotiff;
pub mod histogram;
pub mod mask;
pub mod naming;
pub mod options;
pub mod raster;
pub mod report;
pub mod stats;

pub use differ::{diff_pair, diff_paths, PairJob, PairOutcome, PairReport};
pub use dispatch::{discover, pair, run_batch, BatchSummary, PairingMode};
pub use error::{DiffError, Result};
pub use options::DiffOptions;
pub use raster::{Extent, GeoTransform, Raster};
pub use stats::DiffStats;
