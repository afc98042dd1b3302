//! Clip a raster to another raster's bounding box.
//!
//! Same semantics as `gdal_translate -projwin ulx uly lrx lry`: the window is
//! snapped to the nearest source pixel edges and keeps the source pixel size,
//! so a test raster at a different resolution than truth comes out at a
//! different shape. Window cells outside the source are filled.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{DiffError, Result};
use crate::geotiff::{self, SampleType};
use crate::raster::{Extent, GeoTransform, Raster};

/// Source-pixel window covering a target extent. Offsets may be negative or
/// run past the source edge when the extents only partly overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipWindow {
    pub col_off: i64,
    pub row_off: i64,
    pub cols: usize,
    pub rows: usize,
}

impl ClipWindow {
    pub fn for_extent(target: &Extent, source: &GeoTransform) -> Self {
        let (ox, oy) = (source.origin_x(), source.origin_y());
        let (pw, ph) = (source.pixel_width(), source.pixel_height());
        if pw == 0.0 || ph == 0.0 {
            return Self { col_off: 0, row_off: 0, cols: 0, rows: 0 };
        }

        let col_off = ((target.ulx - ox) / pw).round() as i64;
        let row_off = ((target.uly - oy) / ph).round() as i64;
        let col_end = ((target.lrx - ox) / pw).round() as i64;
        let row_end = ((target.lry - oy) / ph).round() as i64;

        Self {
            col_off,
            row_off,
            cols: (col_end - col_off).max(0) as usize,
            rows: (row_end - row_off).max(0) as usize,
        }
    }

    /// True when every window cell lies inside a `cols`×`rows` source.
    pub fn is_inside(&self, cols: usize, rows: usize) -> bool {
        self.col_off >= 0
            && self.row_off >= 0
            && self.col_off as usize + self.cols <= cols
            && self.row_off as usize + self.rows <= rows
    }
}

/// Cut `source` down to `target`, filling cells outside the source with `fill`.
pub fn clip_to_extent(source: &Raster, target: &Extent, fill: f64) -> Raster {
    let win = ClipWindow::for_extent(target, &source.transform);
    if !win.is_inside(source.cols, source.rows) {
        warn!(
            col_off = win.col_off,
            row_off = win.row_off,
            cols = win.cols,
            rows = win.rows,
            "clip window extends past the source raster, padding with {fill}"
        );
    }

    let mut data = Vec::with_capacity(win.cols * win.rows);
    for r in 0..win.rows as i64 {
        let sr = win.row_off + r;
        for c in 0..win.cols as i64 {
            let sc = win.col_off + c;
            let inside = sr >= 0 && sc >= 0 && (sr as usize) < source.rows && (sc as usize) < source.cols;
            data.push(if inside { source.get(sr as usize, sc as usize) } else { fill });
        }
    }

    let gt = source.transform.0;
    let mut transform = source.transform;
    transform.0[0] = gt[0] + win.col_off as f64 * gt[1];
    transform.0[3] = gt[3] + win.row_off as f64 * gt[5];

    Raster {
        data,
        cols: win.cols,
        rows: win.rows,
        transform,
        geo_keys: source.geo_keys.clone(),
        nodata: source.nodata,
    }
}

/// A clipped copy on disk. The file is removed when this guard drops, so every
/// exit path of a pair comparison cleans up after itself.
#[derive(Debug)]
pub struct TempClip {
    path: PathBuf,
}

impl TempClip {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempClip {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed temporary clip"),
            Err(e) => warn!(path = %self.path.display(), "could not remove temporary clip: {e}"),
        }
    }
}

/// Clip the raster at `source_path` to `target` and write it to a uniquely
/// named `<source stem>_<random>_clip.tif` in `work_dir`. Returns only once
/// the file is written and closed.
pub fn clip_to_file(source_path: &Path, target: &Extent, fill: f64, work_dir: &Path) -> Result<TempClip> {
    let source = geotiff::read_band1(source_path)?;
    let clipped = clip_to_extent(&source, target, fill);

    let stem = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "test".to_string());
    // Reserve the name first so concurrent pairs with equal test names never share a file.
    let path = tempfile::Builder::new()
        .prefix(&format!("{stem}_"))
        .suffix("_clip.tif")
        .tempfile_in(work_dir)
        .map_err(|e| DiffError::io(work_dir, e))?
        .into_temp_path()
        .keep()
        .map_err(|e| DiffError::io(work_dir, e.error))?;
    let guard = TempClip { path };

    geotiff::write_raster(guard.path(), &clipped, SampleType::Float64)?;
    debug!(
        source = %source_path.display(),
        clip = %guard.path().display(),
        cols = clipped.cols,
        rows = clipped.rows,
        "clip complete"
    );
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// 6×6 source at 10 m, origin (0, 60); value = row * 10 + col.
    fn source() -> Raster {
        let mut r = Raster::filled(6, 6, 0.0);
        r.transform = GeoTransform::north_up(0.0, 60.0, 10.0, -10.0);
        for row in 0..6 {
            for col in 0..6 {
                r.set(row, col, (row * 10 + col) as f64);
            }
        }
        r
    }

    #[test]
    fn window_inside_source_matches_subgrid() {
        let src = source();
        let target = GeoTransform::north_up(20.0, 40.0, 10.0, -10.0).extent(3, 2);
        let out = clip_to_extent(&src, &target, -9999.0);

        assert_eq!(out.shape(), (3, 2));
        assert_eq!(out.data, vec![22.0, 23.0, 24.0, 32.0, 33.0, 34.0]);
        assert_eq!(out.transform.origin_x(), 20.0);
        assert_eq!(out.transform.origin_y(), 40.0);
    }

    #[test]
    fn half_pixel_offsets_snap_to_nearest_edge() {
        let src = source();
        // Shifted by 4 m: rounds back onto the 10 m grid.
        let target = GeoTransform::north_up(24.0, 44.0, 10.0, -10.0).extent(2, 2);
        let win = ClipWindow::for_extent(&target, &src.transform);
        assert_eq!(win, ClipWindow { col_off: 2, row_off: 2, cols: 2, rows: 2 });
    }

    #[test]
    fn partial_overlap_pads_with_fill() {
        let src = source();
        let target = GeoTransform::north_up(-10.0, 60.0, 10.0, -10.0).extent(2, 1);
        let out = clip_to_extent(&src, &target, -9999.0);
        assert_eq!(out.data, vec![-9999.0, 0.0]);
    }

    #[test]
    fn coarser_source_gives_smaller_window() {
        let mut src = Raster::filled(50, 50, 1.0);
        src.transform = GeoTransform::north_up(0.0, 100.0, 2.0, -2.0);
        let truth_extent = GeoTransform::north_up(0.0, 100.0, 1.0, -1.0).extent(100, 100);
        let out = clip_to_extent(&src, &truth_extent, 0.0);
        assert_eq!(out.shape(), (50, 50));
    }

    #[test]
    fn temp_clip_is_removed_on_drop() {
        let dir = tempdir().unwrap();
        let src_path = dir.path().join("scene_B4.tif");
        geotiff::write_raster(&src_path, &source(), SampleType::Float32).unwrap();

        let target = GeoTransform::north_up(0.0, 60.0, 10.0, -10.0).extent(2, 2);
        let clip = clip_to_file(&src_path, &target, -9999.0, dir.path()).unwrap();
        let clip_path = clip.path().to_path_buf();
        let name = clip_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("scene_B4_") && name.ends_with("_clip.tif"), "{name}");
        assert!(clip_path.exists());

        let back = geotiff::read_band1(&clip_path).unwrap();
        assert_eq!(back.data, vec![0.0, 1.0, 10.0, 11.0]);

        drop(clip);
        assert!(!clip_path.exists());
    }

    #[test]
    fn equal_source_names_get_separate_clips() {
        let dir = tempdir().unwrap();
        let work = dir.path().join("out");
        fs::create_dir_all(&work).unwrap();
        let mut paths = Vec::new();
        for (scene, value) in [("a", 10.0), ("b", 3.0)] {
            let p = dir.path().join(scene).join("scene_sr_B1.tif");
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            let mut r = source();
            r.data.iter_mut().for_each(|v| *v = value);
            geotiff::write_raster(&p, &r, SampleType::Float32).unwrap();
            paths.push(p);
        }

        let target = GeoTransform::north_up(0.0, 60.0, 10.0, -10.0).extent(2, 2);
        let first = clip_to_file(&paths[0], &target, -9999.0, &work).unwrap();
        let second = clip_to_file(&paths[1], &target, -9999.0, &work).unwrap();
        assert_ne!(first.path(), second.path());

        assert_eq!(geotiff::read_band1(first.path()).unwrap().data, vec![10.0; 4]);
        assert_eq!(geotiff::read_band1(second.path()).unwrap().data, vec![3.0; 4]);

        drop(second);
        assert!(first.path().exists());
    }
}
