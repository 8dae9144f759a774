//! Geometric detector — the consumed face detection/appearance capability.
//!
//! The rest of the engine only sees [`GeometricDetector`] and its
//! [`GeometricResult`]; [`OnnxGeometricDetector`] is the shipped adapter
//! (SCRFD boxes + landmarks, ONNX appearance encoder).

use crate::encoder::FaceEncoder;
use crate::quality::NormalizedImage;
use crate::scrfd::FaceDetector;
use crate::types::{BoundingBox, Landmarks};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prominence confidence never exceeds this.
const MAX_GEOMETRIC_CONFIDENCE: f64 = 0.9;
/// Fraction of the box added on each side before cropping for the encoder.
const CROP_MARGIN: f32 = 0.1;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometricResult {
    pub face_detected: bool,
    pub bbox: Option<BoundingBox>,
    pub landmarks: Option<Landmarks>,
    pub embedding: Option<Vec<f32>>,
    pub confidence: f64,
}

impl GeometricResult {
    pub fn no_face() -> Self {
        Self {
            face_detected: false,
            bbox: None,
            landmarks: None,
            embedding: None,
            confidence: 0.0,
        }
    }

    /// A detection of `bbox` in an image of the given size.
    pub fn detected(bbox: BoundingBox, embedding: Vec<f32>, image_width: u32, image_height: u32) -> Self {
        let confidence = prominence(&bbox, image_width, image_height);
        Self {
            face_detected: true,
            landmarks: bbox.landmarks,
            bbox: Some(bbox),
            embedding: Some(embedding),
            confidence,
        }
    }

    /// Proportions used to ground the semantic descriptor's prompt.
    pub fn enrichment(&self, image_width: u32, image_height: u32) -> Option<Enrichment> {
        let bbox = self.bbox.as_ref().filter(|_| self.face_detected)?;
        if bbox.width <= 0.0 || bbox.height <= 0.0 || image_width == 0 || image_height == 0 {
            return None;
        }
        let width = bbox.width as f64;
        let mut enrichment = Enrichment {
            landmark_count: 0,
            face_width_ratio: width / image_width as f64,
            face_height_ratio: bbox.height as f64 / image_height as f64,
            face_aspect: bbox.height as f64 / width,
            eye_distance_ratio: None,
            mouth_width_ratio: None,
        };
        if let Some(lm) = &self.landmarks {
            let span = |a: (f32, f32), b: (f32, f32)| (((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)) as f64).sqrt();
            enrichment.landmark_count = lm.len();
            enrichment.eye_distance_ratio = Some(span(lm[0], lm[1]) / width);
            enrichment.mouth_width_ratio = Some(span(lm[3], lm[4]) / width);
        }
        Some(enrichment)
    }
}

/// Geometric measurements handed to the vision model alongside the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub landmark_count: usize,
    pub face_width_ratio: f64,
    pub face_height_ratio: f64,
    pub face_aspect: f64,
    pub eye_distance_ratio: Option<f64>,
    pub mouth_width_ratio: Option<f64>,
}

/// Larger faces score higher: area share × 4, capped at 0.9.
pub fn prominence(bbox: &BoundingBox, image_width: u32, image_height: u32) -> f64 {
    let image_area = image_width as f64 * image_height as f64;
    if image_area <= 0.0 {
        return 0.0;
    }
    (bbox.area() as f64 / image_area * 4.0).clamp(0.0, MAX_GEOMETRIC_CONFIDENCE)
}

/// Face detection plus appearance embedding on a normalized capture.
pub trait GeometricDetector: Send {
    fn detect(&mut self, image: &NormalizedImage) -> Result<GeometricResult, DetectorError>;
}

pub struct OnnxGeometricDetector {
    detector: FaceDetector,
    encoder: FaceEncoder,
}

impl OnnxGeometricDetector {
    pub fn load(detector_path: &str, encoder_path: &str) -> Result<Self, DetectorError> {
        Ok(Self {
            detector: FaceDetector::load(detector_path)?,
            encoder: FaceEncoder::load(encoder_path)?,
        })
    }
}

impl GeometricDetector for OnnxGeometricDetector {
    fn detect(&mut self, image: &NormalizedImage) -> Result<GeometricResult, DetectorError> {
        let faces = self.detector.detect(&image.luma)?;
        let Some(face) = faces.into_iter().next() else {
            tracing::debug!("geometric: no face");
            return Ok(GeometricResult::no_face());
        };

        let (x, y, w, h) = crop_region(&face, image.width(), image.height()).ok_or_else(|| {
            DetectorError::InferenceFailed(format!("face box outside image: {face:?}"))
        })?;
        let crop = image::imageops::crop_imm(&image.rgb, x, y, w, h).to_image();
        let embedding = self.encoder.encode(&crop)?;

        let result = GeometricResult::detected(face, embedding, image.width(), image.height());
        tracing::debug!(confidence = result.confidence, "geometric: face encoded");
        Ok(result)
    }
}

/// Pixel crop (x, y, w, h) of the face box plus margin, clamped to the image.
fn crop_region(face: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let mx = face.width * CROP_MARGIN;
    let my = face.height * CROP_MARGIN;
    let x0 = (face.x - mx).max(0.0).floor() as u32;
    let y0 = (face.y - my).max(0.0).floor() as u32;
    let x1 = ((face.x + face.width + mx).ceil().max(0.0) as u32).min(width);
    let y1 = ((face.y + face.height + my).ceil().max(0.0) as u32).min(height);
    (x1 > x0 && y1 > y0).then(|| (x0, y0, x1 - x0, y1 - y0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x, y, width: w, height: h, confidence: 0.99,
            landmarks: Some([(30.0, 40.0), (70.0, 40.0), (50.0, 60.0), (35.0, 80.0), (65.0, 80.0)]),
        }
    }

    #[test]
    fn test_prominence_scales_with_area() {
        // 100×100 face in a 400×400 image: 1/16 × 4 = 0.25
        assert!((prominence(&face(0.0, 0.0, 100.0, 100.0), 400, 400) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_prominence_capped() {
        assert_eq!(prominence(&face(0.0, 0.0, 300.0, 300.0), 400, 400), 0.9);
        assert_eq!(prominence(&face(0.0, 0.0, 10.0, 10.0), 0, 0), 0.0);
    }

    #[test]
    fn test_detected_copies_landmarks() {
        let r = GeometricResult::detected(face(0.0, 0.0, 100.0, 100.0), vec![0.0; 4], 200, 200);
        assert!(r.face_detected);
        assert!(r.landmarks.is_some());
        assert!((r.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_enrichment_proportions() {
        let r = GeometricResult::detected(face(10.0, 10.0, 100.0, 120.0), vec![0.0; 4], 400, 400);
        let e = r.enrichment(400, 400).unwrap();
        assert_eq!(e.landmark_count, 5);
        assert!((e.face_width_ratio - 0.25).abs() < 1e-9);
        assert!((e.face_aspect - 1.2).abs() < 1e-6);
        assert!((e.eye_distance_ratio.unwrap() - 0.4).abs() < 1e-6);
        assert!((e.mouth_width_ratio.unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_no_face_has_no_enrichment() {
        assert!(GeometricResult::no_face().enrichment(100, 100).is_none());
    }

    #[test]
    fn test_crop_region_clamps_to_image() {
        let (x, y, w, h) = crop_region(&face(-20.0, 5.0, 100.0, 100.0), 120, 90).unwrap();
        assert_eq!((x, y), (0, 0));
        assert_eq!((x + w, y + h), (90, 90));
        assert!(crop_region(&face(500.0, 500.0, 10.0, 10.0), 120, 90).is_none());
    }

    #[test]
    fn test_onnx_adapter_requires_models() {
        let err = OnnxGeometricDetector::load("/nonexistent/det.onnx", "/nonexistent/enc.onnx")
            .err()
            .unwrap();
        assert!(matches!(err, DetectorError::ModelNotFound(_)));
    }
}
