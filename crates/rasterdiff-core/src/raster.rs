use serde::{Deserialize, Serialize};

/// Six-coefficient affine transform from pixel (col, row) to map (x, y),
/// in GDAL order: `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
/// `pixel_height` is negative for north-up rasters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self([origin_x, pixel_width, 0.0, origin_y, 0.0, pixel_height])
    }

    /// Pixel space with no georeferencing, matching GDAL's fallback.
    pub fn identity() -> Self {
        Self([0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }

    #[inline]
    pub fn origin_x(&self) -> f64 {
        self.0[0]
    }

    #[inline]
    pub fn origin_y(&self) -> f64 {
        self.0[3]
    }

    #[inline]
    pub fn pixel_width(&self) -> f64 {
        self.0[1]
    }

    #[inline]
    pub fn pixel_height(&self) -> f64 {
        self.0[5]
    }

    pub fn is_rotated(&self) -> bool {
        self.0[2] != 0.0 || self.0[4] != 0.0
    }

    /// Bounding box covered by a `cols`×`rows` grid placed with this transform.
    pub fn extent(&self, cols: usize, rows: usize) -> Extent {
        Extent {
            ulx: self.origin_x(),
            uly: self.origin_y(),
            lrx: self.origin_x() + self.pixel_width() * cols as f64,
            lry: self.origin_y() + self.pixel_height() * rows as f64,
        }
    }
}

/// Upper-left / lower-right corners in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub ulx: f64,
    pub uly: f64,
    pub lrx: f64,
    pub lry: f64,
}

/// GeoTIFF projection payload, carried through verbatim from truth to output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoKeys {
    pub directory: Vec<u16>,
    pub doubles: Vec<f64>,
    pub ascii: String,
}

impl GeoKeys {
    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }
}

/// A single band of samples plus its georeferencing, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub data: Vec<f64>,
    pub cols: usize,
    pub rows: usize,
    pub transform: GeoTransform,
    pub geo_keys: GeoKeys,
    /// Value declared by the file's GDAL_NODATA tag, if any.
    pub nodata: Option<f64>,
}

impl Raster {
    /// Create an un-georeferenced raster filled with `fill`.
    pub fn filled(cols: usize, rows: usize, fill: f64) -> Self {
        Self {
            data: vec![fill; cols * rows],
            cols,
            rows,
            transform: GeoTransform::identity(),
            geo_keys: GeoKeys::default(),
            nodata: None,
        }
    }

    /// Wrap row-major samples. `data.len()` must equal `cols * rows`.
    pub fn from_rows(cols: usize, rows: usize, data: Vec<f64>, transform: GeoTransform) -> Self {
        assert_eq!(data.len(), cols * rows, "sample count does not match {cols}x{rows}");
        Self {
            data,
            cols,
            rows,
            transform,
            geo_keys: GeoKeys::default(),
            nodata: None,
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        self.data[row * self.cols + col] = val;
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    pub fn extent(&self) -> Extent {
        self.transform.extent(self.cols, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_of_north_up_grid() {
        let gt = GeoTransform::north_up(500_000.0, 4_200_000.0, 30.0, -30.0);
        let ext = gt.extent(100, 50);
        assert_eq!(ext.ulx, 500_000.0);
        assert_eq!(ext.uly, 4_200_000.0);
        assert_eq!(ext.lrx, 503_000.0);
        assert_eq!(ext.lry, 4_198_500.0);
    }

    #[test]
    fn get_set_are_row_major() {
        let mut r = Raster::filled(3, 2, 0.0);
        r.set(1, 2, 7.0);
        assert_eq!(r.data[5], 7.0);
        assert_eq!(r.get(1, 2), 7.0);
        assert_eq!(r.shape(), (3, 2));
    }

    #[test]
    #[should_panic]
    fn from_rows_rejects_wrong_length() {
        Raster::from_rows(2, 2, vec![1.0; 3], GeoTransform::identity());
    }
}
