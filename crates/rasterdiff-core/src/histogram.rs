//! Difference histogram: binning and PNG rendering.
//!
//! The plot is drawn straight onto an RGB canvas (bars, frame, grid, tick
//! labels, annotation block) and encoded with the annotation and title also
//! stored as PNG text chunks. Physical resolution is declared at 350 dpi.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::error::{DiffError, Result};
use crate::stats::DiffStats;

pub const DEFAULT_BINS: usize = 255;

/// 350 dpi expressed in pixels per metre (pHYs unit).
const DPI_350_PPM: u32 = 13_780;

// 6.4 × 4.8 in at 350 dpi.
const CANVAS_W: u32 = 2240;
const CANVAS_H: u32 = 1680;
const MARGIN_LEFT: i32 = 300;
const MARGIN_RIGHT: i32 = 80;
const MARGIN_TOP: i32 = 120;
const MARGIN_BOTTOM: i32 = 220;
const TICKS: usize = 5;
const GLYPH_SCALE: i32 = 5;
const TITLE_Y: i32 = 30;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([210, 210, 210]);
const BAR: Rgb<u8> = Rgb([31, 119, 180]);

// ── Binning ──────────────────────────────────────────────────────────────────

/// Equal-width bins spanning `[lo, hi]`; the last bin is closed on the right.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub lo: f64,
    pub hi: f64,
    pub counts: Vec<u64>,
}

impl Histogram {
    pub fn build(values: &[f64], bins: usize) -> Result<Self> {
        if bins == 0 {
            return Err(DiffError::Histogram("bin count must be positive".into()));
        }
        if values.is_empty() {
            return Err(DiffError::Histogram("no unmasked values".into()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DiffError::Histogram("non-finite difference value".into()));
        }

        let mut lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let mut hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }

        let width = (hi - lo) / bins as f64;
        let mut counts = vec![0u64; bins];
        for &v in values {
            let idx = (((v - lo) / width) as usize).min(bins - 1);
            counts[idx] += 1;
        }
        Ok(Self { lo, hi, counts })
    }

    pub fn max_count(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

// ── Annotation ───────────────────────────────────────────────────────────────

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Text shown on the plot.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub title: String,
    pub lines: Vec<String>,
}

impl Annotation {
    pub fn from_stats(stem: &str, stats: &DiffStats) -> Self {
        Self {
            title: format!("{stem} Differences"),
            lines: vec![
                format!("mean diff: {}", round3(stats.mean)),
                format!("abs. mean diff: {}", round3(stats.abs_mean)),
                format!("# diff pixels: {}", stats.npix_diff),
                format!("% diff: {}", stats.pct_diff),
            ],
        }
    }
}

// ── Rendering ────────────────────────────────────────────────────────────────

/// 5×7 bitmap font (ASCII letters, digits, a little punctuation); bit 4 is the
/// leftmost column.
fn glyph(c: char) -> Option<[u8; 7]> {
    let g = match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '#' => [0x0A, 0x0A, 0x1F, 0x0A, 0x1F, 0x0A, 0x0A],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '+' => [0x00, 0x04, 0x04, 0x1F, 0x04, 0x04, 0x00],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        'a' => [0x00, 0x00, 0x0E, 0x01, 0x0F, 0x11, 0x0F],
        'b' => [0x10, 0x10, 0x16, 0x19, 0x11, 0x11, 0x1E],
        'c' => [0x00, 0x00, 0x0E, 0x10, 0x10, 0x11, 0x0E],
        'd' => [0x01, 0x01, 0x0D, 0x13, 0x11, 0x11, 0x0F],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        'f' => [0x06, 0x09, 0x08, 0x1C, 0x08, 0x08, 0x08],
        'g' => [0x00, 0x0F, 0x11, 0x11, 0x0F, 0x01, 0x0E],
        'h' => [0x10, 0x10, 0x16, 0x19, 0x11, 0x11, 0x11],
        'i' => [0x04, 0x00, 0x0C, 0x04, 0x04, 0x04, 0x0E],
        'j' => [0x02, 0x00, 0x06, 0x02, 0x02, 0x12, 0x0C],
        'k' => [0x10, 0x10, 0x12, 0x14, 0x18, 0x14, 0x12],
        'l' => [0x0C, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'm' => [0x00, 0x00, 0x1A, 0x15, 0x15, 0x11, 0x11],
        'n' => [0x00, 0x00, 0x16, 0x19, 0x11, 0x11, 0x11],
        'o' => [0x00, 0x00, 0x0E, 0x11, 0x11, 0x11, 0x0E],
        'p' => [0x00, 0x00, 0x1E, 0x11, 0x1E, 0x10, 0x10],
        'q' => [0x00, 0x00, 0x0D, 0x13, 0x0F, 0x01, 0x01],
        'r' => [0x00, 0x00, 0x16, 0x19, 0x10, 0x10, 0x10],
        's' => [0x00, 0x00, 0x0E, 0x10, 0x0E, 0x01, 0x1E],
        't' => [0x08, 0x08, 0x1C, 0x08, 0x08, 0x09, 0x06],
        'u' => [0x00, 0x00, 0x11, 0x11, 0x11, 0x13, 0x0D],
        'v' => [0x00, 0x00, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'w' => [0x00, 0x00, 0x11, 0x11, 0x15, 0x15, 0x0A],
        'x' => [0x00, 0x00, 0x11, 0x0A, 0x04, 0x0A, 0x11],
        'y' => [0x00, 0x00, 0x11, 0x11, 0x0F, 0x01, 0x0E],
        'z' => [0x00, 0x00, 0x1F, 0x02, 0x04, 0x08, 0x1F],
        _ => return None,
    };
    Some(g)
}

fn text_width(text: &str) -> i32 {
    text.chars().count() as i32 * 6 * GLYPH_SCALE
}

/// Draw `text` with its top-left corner at (x, y). Unknown characters advance blank.
fn draw_text(img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    for (i, ch) in text.chars().enumerate() {
        let Some(rows) = glyph(ch) else { continue };
        let gx = x + i as i32 * 6 * GLYPH_SCALE;
        for (r, bits) in rows.iter().enumerate() {
            for c in 0..5 {
                if bits & (0x10 >> c) != 0 {
                    let rect = Rect::at(gx + c * GLYPH_SCALE, y + r as i32 * GLYPH_SCALE)
                        .of_size(GLYPH_SCALE as u32, GLYPH_SCALE as u32);
                    draw_filled_rect_mut(img, rect, color);
                }
            }
        }
    }
}

fn tick_label(v: f64) -> String {
    let r = round3(v);
    if r == 0.0 { "0".to_string() } else { format!("{r}") }
}

/// Render the histogram plot onto a fresh canvas.
pub fn render(hist: &Histogram, note: &Annotation) -> RgbImage {
    let mut img = RgbImage::from_pixel(CANVAS_W, CANVAS_H, WHITE);

    let left = MARGIN_LEFT;
    let top = MARGIN_TOP;
    let right = CANVAS_W as i32 - MARGIN_RIGHT;
    let bottom = CANVAS_H as i32 - MARGIN_BOTTOM;
    let plot_w = (right - left) as f64;
    let plot_h = (bottom - top) as f64;
    let max_count = hist.max_count().max(1) as f64;

    // Grid and tick labels.
    for t in 0..=TICKS {
        let frac = t as f64 / TICKS as f64;
        let y = bottom as f32 - (frac * plot_h) as f32;
        let x = left as f32 + (frac * plot_w) as f32;
        draw_line_segment_mut(&mut img, (left as f32, y), (right as f32, y), GRID);
        draw_line_segment_mut(&mut img, (x, top as f32), (x, bottom as f32), GRID);

        let count_label = format!("{}", (frac * max_count).round() as u64);
        draw_text(
            &mut img,
            left - 20 - text_width(&count_label),
            y as i32 - 7 * GLYPH_SCALE / 2,
            &count_label,
            BLACK,
        );
        let value_label = tick_label(hist.lo + frac * (hist.hi - hist.lo));
        draw_text(
            &mut img,
            x as i32 - text_width(&value_label) / 2,
            bottom + 20,
            &value_label,
            BLACK,
        );
    }

    // Bars.
    let bins = hist.counts.len();
    for (i, &count) in hist.counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let x0 = left + (i as f64 * plot_w / bins as f64) as i32;
        let x1 = left + ((i + 1) as f64 * plot_w / bins as f64) as i32;
        let h = ((count as f64 / max_count) * plot_h).round().max(1.0) as i32;
        let rect = Rect::at(x0, bottom - h).of_size((x1 - x0).max(1) as u32, h as u32);
        draw_filled_rect_mut(&mut img, rect, BAR);
    }

    let frame = Rect::at(left, top).of_size((right - left) as u32, (bottom - top) as u32);
    draw_hollow_rect_mut(&mut img, frame, BLACK);

    // Axis titles.
    let x_title = "Value";
    draw_text(
        &mut img,
        left + (right - left) / 2 - text_width(x_title) / 2,
        bottom + 100,
        x_title,
        BLACK,
    );
    draw_text(&mut img, 20, top - 45, "Frequency", BLACK);

    let title_x = (left + (right - left) / 2 - text_width(&note.title) / 2).max(10);
    draw_text(&mut img, title_x, TITLE_Y, &note.title, BLACK);

    // Annotation block at axes fraction (0.7, 0.8).
    let ax = left + (0.7 * plot_w) as i32;
    let mut ay = top + (0.2 * plot_h) as i32 - note.lines.len() as i32 * 10 * GLYPH_SCALE;
    for line in &note.lines {
        draw_text(&mut img, ax, ay, line, BLACK);
        ay += 10 * GLYPH_SCALE;
    }

    img
}

/// Render and write the histogram as a 350 dpi PNG.
pub fn write_png(path: &Path, hist: &Histogram, note: &Annotation) -> Result<()> {
    let img = render(hist, note);
    let png_err = |source: png::EncodingError| DiffError::Png { path: path.to_path_buf(), source };

    let file = File::create(path).map_err(|e| DiffError::io(path, e))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), img.width(), img.height());
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_pixel_dims(Some(png::PixelDimensions {
        xppu: DPI_350_PPM,
        yppu: DPI_350_PPM,
        unit: png::Unit::Meter,
    }));
    encoder.add_text_chunk("Title".to_string(), note.title.clone()).map_err(png_err)?;
    encoder.add_text_chunk("Comment".to_string(), note.lines.join("\n")).map_err(png_err)?;

    let mut writer = encoder.write_header().map_err(png_err)?;
    writer.write_image_data(img.as_raw()).map_err(png_err)?;
    writer.finish().map_err(png_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn counts_cover_every_value() {
        let values: Vec<f64> = (0..1000).map(|i| (i as f64) / 10.0 - 50.0).collect();
        let h = Histogram::build(&values, DEFAULT_BINS).unwrap();
        assert_eq!(h.counts.len(), 255);
        assert_eq!(h.total(), 1000);
        assert_eq!(h.lo, values[0]);
        assert_eq!(h.hi, values[999]);
    }

    #[test]
    fn max_value_lands_in_last_bin() {
        let h = Histogram::build(&[0.0, 1.0, 2.0], 2).unwrap();
        assert_eq!(h.counts, vec![1, 2]);
    }

    #[test]
    fn constant_input_widens_range() {
        let h = Histogram::build(&[3.0; 10], 255).unwrap();
        assert_eq!(h.lo, 2.5);
        assert_eq!(h.hi, 3.5);
        assert_eq!(h.total(), 10);
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = Histogram::build(&[], 255).unwrap_err();
        assert!(matches!(err, DiffError::Histogram(_)));
    }

    #[test]
    fn annotation_lines_follow_stats() {
        let stats = DiffStats::compute([0.0f32, 1.0, 0.0, -1.0]);
        let note = Annotation::from_stats("scene_B4", &stats);
        assert_eq!(note.title, "scene_B4 Differences");
        assert_eq!(
            note.lines,
            vec!["mean diff: 0", "abs. mean diff: 0.5", "# diff pixels: 2", "% diff: 50"]
        );
    }

    #[test]
    fn font_covers_landsat_titles() {
        let title = "LC08_L1TP_034032_20160901_20170221_01_T1_sr_band4.tif Differences";
        assert!(title.chars().all(|c| c == ' ' || glyph(c).is_some()));
        assert!(('A'..='Z').chain('a'..='z').all(|c| glyph(c).is_some()));
    }

    #[test]
    fn title_is_drawn_above_the_frame() {
        let h = Histogram::build(&[0.0, 1.0, 0.0, -1.0], DEFAULT_BINS).unwrap();
        let stats = DiffStats::compute([0.0f32, 1.0, 0.0, -1.0]);
        let img = render(&h, &Annotation::from_stats("scene_B4.tif", &stats));

        let inked = (TITLE_Y as u32..(TITLE_Y + 7 * GLYPH_SCALE) as u32)
            .flat_map(|y| (MARGIN_LEFT as u32..CANVAS_W - MARGIN_RIGHT as u32).map(move |x| (x, y)))
            .filter(|&(x, y)| *img.get_pixel(x, y) == BLACK)
            .count();
        assert!(inked > 0);
    }

    #[test]
    fn png_is_written_at_canvas_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scene_B4_diff_hist.png");
        let h = Histogram::build(&[0.0, 1.0, 0.0, -1.0], DEFAULT_BINS).unwrap();
        let stats = DiffStats::compute([0.0f32, 1.0, 0.0, -1.0]);
        write_png(&path, &h, &Annotation::from_stats("scene_B4", &stats)).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!(img.width(), CANVAS_W);
        assert_eq!(img.height(), CANVAS_H);
    }
}
