//! Band-1 GeoTIFF reading and single-band float GeoTIFF writing.
//!
//! Georeferencing is read from ModelPixelScale + ModelTiepoint, or from
//! ModelTransformation when present. The GeoKey directory and its parameter
//! tags are copied through untouched; nothing here interprets the CRS.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder, TiffValue};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::{DiffError, Result};
use crate::raster::{GeoKeys, GeoTransform, Raster};

// ── GeoTIFF tag codes ────────────────────────────────────────────────────────

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_DOUBLE_PARAMS: u16 = 34736;
const GEO_ASCII_PARAMS: u16 = 34737;
const GDAL_NODATA: u16 = 42113;

/// Resolves to the named variant when the tiff crate knows the code.
fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Sample type used when encoding a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    Float32,
    Float64,
}

// ── Reading ──────────────────────────────────────────────────────────────────

/// Read band 1 of a TIFF/GeoTIFF, widening every sample type to f64.
pub fn read_band1(path: &Path) -> Result<Raster> {
    let file = File::open(path).map_err(|e| DiffError::io(path, e))?;
    let mut decoder = Decoder::new(BufReader::new(file)).map_err(|e| DiffError::tiff(path, e))?;

    let (width, height) = decoder.dimensions().map_err(|e| DiffError::tiff(path, e))?;
    let (cols, rows) = (width as usize, height as usize);

    let samples_per_pixel = decoder
        .find_tag(Tag::SamplesPerPixel)
        .and_then(|v| v.map(|v| v.into_u32()).transpose())
        .map_err(|e| DiffError::tiff(path, e))?
        .unwrap_or(1)
        .max(1) as usize;

    let transform = read_transform(&mut decoder).map_err(|e| DiffError::tiff(path, e))?;
    let geo_keys = read_geo_keys(&mut decoder).map_err(|e| DiffError::tiff(path, e))?;
    let nodata = decoder
        .find_tag(tag(GDAL_NODATA))
        .and_then(|v| v.map(|v| v.into_string()).transpose())
        .map_err(|e| DiffError::tiff(path, e))?
        .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse::<f64>().ok());

    let image = decoder.read_image().map_err(|e| DiffError::tiff(path, e))?;
    let all = widen(image).ok_or_else(|| DiffError::UnsupportedFormat {
        path: path.to_path_buf(),
        detail: "decoder returned an unrecognised sample type".to_string(),
    })?;

    // Chunky multi-band files interleave samples; keep band 1.
    let data: Vec<f64> = if samples_per_pixel == 1 {
        all
    } else {
        all.into_iter().step_by(samples_per_pixel).collect()
    };

    if data.len() != cols * rows {
        return Err(DiffError::UnsupportedFormat {
            path: path.to_path_buf(),
            detail: format!("expected {} band-1 samples, decoded {}", cols * rows, data.len()),
        });
    }

    debug!(
        path = %path.display(),
        cols,
        rows,
        samples_per_pixel,
        "read band 1"
    );

    Ok(Raster { data, cols, rows, transform, geo_keys, nodata })
}

fn widen(image: DecodingResult) -> Option<Vec<f64>> {
    let v = match image {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(v)
}

fn find_f64_vec<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    code: u16,
) -> tiff::TiffResult<Option<Vec<f64>>> {
    decoder.find_tag(tag(code))?.map(|v| v.into_f64_vec()).transpose()
}

fn read_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> tiff::TiffResult<GeoTransform> {
    if let Some(m) = find_f64_vec(decoder, MODEL_TRANSFORMATION)? {
        if m.len() >= 8 {
            return Ok(GeoTransform([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
    }

    let scale = find_f64_vec(decoder, MODEL_PIXEL_SCALE)?;
    let tie = find_f64_vec(decoder, MODEL_TIEPOINT)?;
    match (scale, tie) {
        (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => {
            // Tiepoint maps raster (i, j) to model (x, y); shift it back to pixel (0, 0).
            let (sx, sy) = (s[0], s[1]);
            let origin_x = t[3] - t[0] * sx;
            let origin_y = t[4] + t[1] * sy;
            Ok(GeoTransform::north_up(origin_x, origin_y, sx, -sy))
        }
        _ => Ok(GeoTransform::identity()),
    }
}

fn read_geo_keys<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> tiff::TiffResult<GeoKeys> {
    let directory = match decoder.find_tag(tag(GEO_KEY_DIRECTORY))? {
        Some(v) => v.into_u16_vec()?,
        None => return Ok(GeoKeys::default()),
    };
    let doubles = find_f64_vec(decoder, GEO_DOUBLE_PARAMS)?.unwrap_or_default();
    let ascii = decoder
        .find_tag(tag(GEO_ASCII_PARAMS))?
        .map(|v| v.into_string())
        .transpose()?
        .unwrap_or_default();
    Ok(GeoKeys { directory, doubles, ascii })
}

// ── Writing ──────────────────────────────────────────────────────────────────

/// Write `raster` as a single-band float GeoTIFF. Georeferencing, GeoKeys and
/// the declared no-data value are written alongside the samples.
pub fn write_raster(path: &Path, raster: &Raster, sample_type: SampleType) -> Result<()> {
    match sample_type {
        SampleType::Float32 => {
            let samples: Vec<f32> = raster.data.iter().map(|&v| v as f32).collect();
            encode::<colortype::Gray32Float>(path, raster, &samples)
        }
        SampleType::Float64 => encode::<colortype::Gray64Float>(path, raster, &raster.data),
    }
}

fn encode<C>(path: &Path, raster: &Raster, samples: &[C::Inner]) -> Result<()>
where
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    let file = File::create(path).map_err(|e| DiffError::io(path, e))?;
    let mut tiff = TiffEncoder::new(BufWriter::new(file)).map_err(|e| DiffError::tiff(path, e))?;
    let mut image = tiff
        .new_image::<C>(raster.cols as u32, raster.rows as u32)
        .map_err(|e| DiffError::tiff(path, e))?;

    write_georef_tags(image.encoder(), raster).map_err(|e| DiffError::tiff(path, e))?;

    image.write_data(samples).map_err(|e| DiffError::tiff(path, e))?;
    debug!(path = %path.display(), cols = raster.cols, rows = raster.rows, "wrote raster");
    Ok(())
}

fn write_georef_tags<W, K>(
    enc: &mut tiff::encoder::DirectoryEncoder<'_, W, K>,
    raster: &Raster,
) -> tiff::TiffResult<()>
where
    W: std::io::Write + std::io::Seek,
    K: tiff::encoder::TiffKind,
{
    let gt = raster.transform.0;
    if raster.transform.is_rotated() {
        let matrix = [
            gt[1], gt[2], 0.0, gt[0], //
            gt[4], gt[5], 0.0, gt[3], //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        enc.write_tag(tag(MODEL_TRANSFORMATION), &matrix[..])?;
    } else {
        enc.write_tag(tag(MODEL_PIXEL_SCALE), &[gt[1], -gt[5], 0.0][..])?;
        enc.write_tag(tag(MODEL_TIEPOINT), &[0.0, 0.0, 0.0, gt[0], gt[3], 0.0][..])?;
    }

    let keys = &raster.geo_keys;
    if !keys.is_empty() {
        enc.write_tag(tag(GEO_KEY_DIRECTORY), &keys.directory[..])?;
        if !keys.doubles.is_empty() {
            enc.write_tag(tag(GEO_DOUBLE_PARAMS), &keys.doubles[..])?;
        }
        if !keys.ascii.is_empty() {
            enc.write_tag(tag(GEO_ASCII_PARAMS), keys.ascii.as_str())?;
        }
    }

    if let Some(nodata) = raster.nodata {
        enc.write_tag(tag(GDAL_NODATA), format!("{nodata}").as_str())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn utm_keys() -> GeoKeys {
        // Version 1.1.0, 2 keys: GTModelType=Projected, ProjectedCSType=32613.
        GeoKeys {
            directory: vec![1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 32613],
            doubles: Vec::new(),
            ascii: String::new(),
        }
    }

    #[test]
    fn write_then_read_preserves_samples_and_georef() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scene_sr_band4.tif");

        let mut raster = Raster::from_rows(
            3,
            2,
            vec![1.5, -2.0, 3.25, -9999.0, 0.0, 42.0],
            GeoTransform::north_up(500_000.0, 4_200_000.0, 30.0, -30.0),
        );
        raster.geo_keys = utm_keys();
        raster.nodata = Some(-9999.0);

        write_raster(&path, &raster, SampleType::Float32).unwrap();
        let back = read_band1(&path).unwrap();

        assert_eq!(back.shape(), (3, 2));
        assert_eq!(back.data, raster.data);
        assert_eq!(back.transform, raster.transform);
        assert_eq!(back.geo_keys.directory, raster.geo_keys.directory);
        assert_eq!(back.nodata, Some(-9999.0));
    }

    #[test]
    fn float64_keeps_large_integers_exact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wide.tif");
        let raster = Raster::from_rows(2, 1, vec![16_777_217.0, 1.0], GeoTransform::identity());

        write_raster(&path, &raster, SampleType::Float64).unwrap();
        let back = read_band1(&path).unwrap();
        assert_eq!(back.data, vec![16_777_217.0, 1.0]);
    }

    #[test]
    fn missing_georef_falls_back_to_pixel_space() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.tif");
        let file = File::create(&path).unwrap();
        let mut tiff = TiffEncoder::new(BufWriter::new(file)).unwrap();
        tiff.write_image::<colortype::Gray8>(2, 2, &[1u8, 2, 3, 4]).unwrap();
        drop(tiff);

        let back = read_band1(&path).unwrap();
        assert_eq!(back.transform, GeoTransform::identity());
        assert!(back.geo_keys.is_empty());
        assert_eq!(back.nodata, None);
        assert_eq!(back.data, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_band1(Path::new("/definitely/not/here.tif")).unwrap_err();
        assert!(matches!(err, DiffError::Io { .. }));
    }
}
