//! Quality gate — decode, bounds checks, uniformity rejection, normalization.
//!
//! Normalization is the only mutation applied to a capture: downsample so the
//! longer side fits the target, then Contrast-Limited Adaptive Histogram
//! Equalization on the luminance channel. Chroma is carried through
//! unchanged so the semantic descriptor still sees colour.

use crate::config::QualityLimits;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GrayImage, ImageReader, Luma, Rgb, RgbImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QualityError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image quality rejected: {0}")]
    Rejected(String),
    #[error("image too uniform: luminance stddev {stddev:.2} below floor {floor:.2}")]
    TooUniform { stddev: f64, floor: f64 },
}

/// A capture that passed the gate, ready for both detectors.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub rgb: RgbImage,
    /// Equalized luminance plane, same dimensions as `rgb`.
    pub luma: GrayImage,
    pub original_width: u32,
    pub original_height: u32,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    /// Encode the normalized raster as JPEG at `quality` (1-100).
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(&self.rgb)?;
        Ok(buf)
    }
}

pub struct QualityGate {
    limits: QualityLimits,
}

impl QualityGate {
    pub fn new(limits: QualityLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &QualityLimits {
        &self.limits
    }

    /// Validate a raw capture and return its normalized form.
    ///
    /// Dimensions are read from the header and checked before any pixel data
    /// is decoded.
    pub fn validate_and_normalize(&self, raw: &[u8]) -> Result<NormalizedImage, QualityError> {
        let (width, height) = reader(raw)?.into_dimensions()?;
        check_dimensions(width, height, &self.limits)?;
        let decoded = reader(raw)?.decode()?;

        let rgb = decoded.to_rgb8();
        let stddev = luminance_stddev(&rgb);
        if stddev < self.limits.min_luma_stddev {
            tracing::debug!(stddev, floor = self.limits.min_luma_stddev, "capture too uniform");
            return Err(QualityError::TooUniform {
                stddev,
                floor: self.limits.min_luma_stddev,
            });
        }

        let mut rgb = downsample(rgb, self.limits.target_side);
        let luma = equalize_luminance(&mut rgb, self.limits.clahe_tiles, self.limits.clahe_clip);

        tracing::debug!(
            width,
            height,
            normalized_width = rgb.width(),
            normalized_height = rgb.height(),
            stddev,
            "capture accepted"
        );

        Ok(NormalizedImage {
            rgb,
            luma,
            original_width: width,
            original_height: height,
        })
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(QualityLimits::default())
    }
}

fn reader(raw: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, image::ImageError> {
    Ok(ImageReader::new(Cursor::new(raw)).with_guessed_format()?)
}

/// Check side lengths and aspect ratio against the (inclusive) limits.
pub fn check_dimensions(width: u32, height: u32, limits: &QualityLimits) -> Result<(), QualityError> {
    for (name, side) in [("width", width), ("height", height)] {
        if side < limits.min_side || side > limits.max_side {
            return Err(QualityError::Rejected(format!(
                "{name} {side}px outside [{}, {}]",
                limits.min_side, limits.max_side
            )));
        }
    }

    let aspect = width as f64 / height as f64;
    if aspect < limits.min_aspect || aspect > limits.max_aspect {
        return Err(QualityError::Rejected(format!(
            "aspect ratio {aspect:.3} outside [{}, {}]",
            limits.min_aspect, limits.max_aspect
        )));
    }

    Ok(())
}

fn luma_of(p: &Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

fn luminance_stddev(rgb: &RgbImage) -> f64 {
    let n = (rgb.width() as f64) * (rgb.height() as f64);
    if n == 0.0 {
        return 0.0;
    }
    let (sum, sum_sq) = rgb.pixels().fold((0.0f64, 0.0f64), |(s, sq), p| {
        let y = luma_of(p) as f64;
        (s + y, sq + y * y)
    });
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0).sqrt()
}

fn downsample(rgb: RgbImage, target_side: u32) -> RgbImage {
    let (w, h) = rgb.dimensions();
    let longer = w.max(h);
    if target_side == 0 || longer <= target_side {
        return rgb;
    }
    let scale = target_side as f64 / longer as f64;
    let new_w = ((w as f64 * scale).round() as u32).max(1);
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    image::imageops::resize(&rgb, new_w, new_h, FilterType::Lanczos3)
}

/// Equalize the BT.601 luminance channel in place and return the equalized plane.
fn equalize_luminance(rgb: &mut RgbImage, tiles: u32, clip: f32) -> GrayImage {
    let (w, h) = rgb.dimensions();
    let mut luma = GrayImage::from_fn(w, h, |x, y| {
        Luma([luma_of(rgb.get_pixel(x, y)).round().clamp(0.0, 255.0) as u8])
    });
    clahe(&mut luma, tiles, clip);

    for (x, y, px) in rgb.enumerate_pixels_mut() {
        let [r, g, b] = px.0.map(|c| c as f32);
        let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
        let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        let y_new = luma.get_pixel(x, y)[0] as f32;
        let out = [
            y_new + 1.402 * (cr - 128.0),
            y_new - 0.344_136 * (cb - 128.0) - 0.714_136 * (cr - 128.0),
            y_new + 1.772 * (cb - 128.0),
        ];
        *px = Rgb(out.map(|c| c.round().clamp(0.0, 255.0) as u8));
    }

    luma
}

/// Contrast-Limited Adaptive Histogram Equalization on a square tile grid.
///
/// Each tile gets a clipped-histogram CDF; pixels are mapped by bilinear
/// interpolation between the four nearest tile CDFs.
fn clahe(plane: &mut GrayImage, tiles: u32, clip: f32) {
    let (w, h) = plane.dimensions();
    let tiles = tiles.max(1);
    let (tile_w, tile_h) = (w / tiles, h / tiles);
    if tile_w == 0 || tile_h == 0 {
        return;
    }

    let luts: Vec<[f32; 256]> = (0..tiles * tiles)
        .map(|i| tile_lut(plane, (i % tiles) * tile_w, (i / tiles) * tile_h, tile_w, tile_h, clip))
        .collect();

    let last = (tiles - 1) as f32;
    for (x, y, px) in plane.enumerate_pixels_mut() {
        let value = px[0] as usize;
        let fy = (y as f32 / tile_h as f32 - 0.5).clamp(0.0, last);
        let fx = (x as f32 / tile_w as f32 - 0.5).clamp(0.0, last);
        let (r0, c0) = (fy as u32, fx as u32);
        let (r1, c1) = ((r0 + 1).min(tiles - 1), (c0 + 1).min(tiles - 1));
        let (dy, dx) = (fy - r0 as f32, fx - c0 as f32);

        let at = |r: u32, c: u32| luts[(r * tiles + c) as usize][value];
        let top = at(r0, c0) * (1.0 - dx) + at(r0, c1) * dx;
        let bottom = at(r1, c0) * (1.0 - dx) + at(r1, c1) * dx;
        px[0] = (top * (1.0 - dy) + bottom * dy).round().clamp(0.0, 255.0) as u8;
    }
}

fn tile_lut(plane: &GrayImage, x0: u32, y0: u32, tile_w: u32, tile_h: u32, clip: f32) -> [f32; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y0 + tile_h {
        for x in x0..x0 + tile_w {
            hist[plane.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let count = (tile_w * tile_h) as f32;
    let limit = ((clip * count) as u32).max(1);
    let excess: u32 = hist.iter().map(|&b| b.saturating_sub(limit)).sum();
    let (share, leftover) = (excess / 256, (excess % 256) as usize);
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin = (*bin).min(limit) + share + u32::from(i < leftover);
    }

    let mut lut = [0f32; 256];
    let mut running = 0f32;
    for (slot, &bin) in lut.iter_mut().zip(hist.iter()) {
        running += bin as f32;
        *slot = running;
    }
    let floor = lut.iter().copied().find(|&v| v > 0.0).unwrap_or(0.0);
    let span = count - floor;
    if span > 0.0 {
        for v in lut.iter_mut() {
            *v = ((*v - floor) / span * 255.0).clamp(0.0, 255.0);
        }
    }
    lut
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat};

    /// Textured RGB test capture encoded as PNG.
    pub(crate) fn textured_png(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, y| {
            Rgb([
                ((x * 7 + y * 3) % 256) as u8,
                ((x * 5 + y * 11) % 256) as u8,
                ((x * 13 + y) % 256) as u8,
            ])
        });
        encode_png(img)
    }

    pub(crate) fn encode_png(img: RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn plane_stddev(plane: &GrayImage) -> f32 {
        let n = plane.len() as f32;
        let mean = plane.pixels().map(|p| p[0] as f32).sum::<f32>() / n;
        let var = plane.pixels().map(|p| (p[0] as f32 - mean).powi(2)).sum::<f32>() / n;
        var.sqrt()
    }

    #[test]
    fn test_side_bounds_flip_exactly() {
        let limits = QualityLimits::default();
        assert!(check_dimensions(63, 64, &limits).is_err());
        assert!(check_dimensions(64, 64, &limits).is_ok());
        assert!(check_dimensions(4096, 4096, &limits).is_ok());
        assert!(check_dimensions(4097, 4096, &limits).is_err());
        assert!(check_dimensions(4096, 4097, &limits).is_err());
        assert!(check_dimensions(64, 63, &limits).is_err());
    }

    #[test]
    fn test_aspect_bounds_flip_exactly() {
        let limits = QualityLimits::default();
        assert!(check_dimensions(98, 200, &limits).is_err()); // 0.49
        assert!(check_dimensions(100, 200, &limits).is_ok()); // 0.50
        assert!(check_dimensions(200, 100, &limits).is_ok()); // 2.00
        assert!(check_dimensions(201, 100, &limits).is_err()); // 2.01
    }

    #[test]
    fn test_garbage_bytes_fail_decode() {
        let gate = QualityGate::default();
        let err = gate.validate_and_normalize(b"definitely not an image").unwrap_err();
        assert!(matches!(err, QualityError::Decode(_)));
    }

    /// Rewrite the IHDR of a PNG to claim `w`×`h` without touching its data.
    fn with_claimed_size(mut png: Vec<u8>, w: u32, h: u32) -> Vec<u8> {
        png[16..20].copy_from_slice(&w.to_be_bytes());
        png[20..24].copy_from_slice(&h.to_be_bytes());
        let mut crc = 0xFFFF_FFFFu32;
        for &byte in &png[12..29] {
            crc ^= byte as u32;
            for _ in 0..8 {
                crc = if crc & 1 == 1 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            }
        }
        png[29..33].copy_from_slice(&(!crc).to_be_bytes());
        png
    }

    #[test]
    fn test_oversized_header_rejected_before_decode() {
        let gate = QualityGate::default();
        let png = with_claimed_size(textured_png(64, 64), 14_000, 14_000);
        assert_eq!(reader(&png).unwrap().into_dimensions().unwrap(), (14_000, 14_000));
        let err = gate.validate_and_normalize(&png).unwrap_err();
        assert!(matches!(&err, QualityError::Rejected(m) if m.contains("14000")), "{err}");
    }

    #[test]
    fn test_small_image_rejected() {
        let gate = QualityGate::default();
        let err = gate.validate_and_normalize(&textured_png(63, 80)).unwrap_err();
        assert!(matches!(err, QualityError::Rejected(_)));
    }

    #[test]
    fn test_solid_capture_too_uniform() {
        let gate = QualityGate::default();
        let solid = encode_png(RgbImage::from_pixel(128, 128, Rgb([90, 90, 90])));
        let err = gate.validate_and_normalize(&solid).unwrap_err();
        assert!(matches!(err, QualityError::TooUniform { .. }));
    }

    #[test]
    fn test_accepts_and_keeps_small_dimensions() {
        let gate = QualityGate::default();
        let img = gate.validate_and_normalize(&textured_png(200, 160)).unwrap();
        assert_eq!((img.width(), img.height()), (200, 160));
        assert_eq!(img.luma.dimensions(), (200, 160));
        assert_eq!((img.original_width, img.original_height), (200, 160));
    }

    #[test]
    fn test_downsamples_longer_side() {
        let gate = QualityGate::default();
        let img = gate.validate_and_normalize(&textured_png(1024, 768)).unwrap();
        assert_eq!((img.width(), img.height()), (512, 384));
        let tall = gate.validate_and_normalize(&textured_png(400, 800)).unwrap();
        assert_eq!((tall.width(), tall.height()), (256, 512));
    }

    #[test]
    fn test_normalization_deterministic() {
        let gate = QualityGate::default();
        let raw = textured_png(300, 240);
        let a = gate.validate_and_normalize(&raw).unwrap();
        let b = gate.validate_and_normalize(&raw).unwrap();
        assert_eq!(a.rgb, b.rgb);
        assert_eq!(a.luma, b.luma);
    }

    #[test]
    fn test_gray_pixels_stay_gray() {
        let gate = QualityGate::default();
        let gray = encode_png(RgbImage::from_fn(128, 128, |x, y| {
            let v = ((x * 2 + y) % 256) as u8;
            Rgb([v, v, v])
        }));
        let img = gate.validate_and_normalize(&gray).unwrap();
        for p in img.rgb.pixels() {
            assert!(p[0].abs_diff(p[1]) <= 1 && p[1].abs_diff(p[2]) <= 1, "{p:?}");
        }
    }

    #[test]
    fn test_clahe_increases_contrast() {
        let mut plane = GrayImage::from_fn(16, 16, |x, y| Luma([100 + ((y * 16 + x) % 11) as u8]));
        let before = plane_stddev(&plane);
        clahe(&mut plane, 2, 0.02);
        let after = plane_stddev(&plane);
        assert!(after > before, "orig={before:.2}, new={after:.2}");
    }

    #[test]
    fn test_jpeg_encoding_roundtrips_dimensions() {
        let gate = QualityGate::default();
        let img = gate.validate_and_normalize(&textured_png(120, 100)).unwrap();
        let jpeg = img.to_jpeg(90).unwrap();
        let back = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((back.width(), back.height()), (120, 100));
    }
}
