//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the equalized luminance plane into a 640×640 tensor, decodes
//! the three anchor-free stride heads (8/16/32) and suppresses overlaps with
//! NMS. Output boxes are in normalized-image coordinates, strongest first.

use crate::geometric::DetectorError;
use crate::types::{BoundingBox, Landmarks};
use image::imageops::FilterType;
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const INPUT_SIZE: u32 = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU: f32 = 0.4;
const STRIDES: [u32; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

/// Scale and padding applied when fitting the frame into the square input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let fitted_w = (width as f32 * scale).round();
        let fitted_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((INPUT_SIZE as f32 - fitted_w) / 2.0).floor(),
            pad_y: ((INPUT_SIZE as f32 - fitted_h) / 2.0).floor(),
        }
    }

    /// Map a point from tensor space back to frame space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Tensor positions of one stride's (score, bbox, keypoint) outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeadIndices {
    score: usize,
    bbox: usize,
    kps: usize,
}

pub struct FaceDetector {
    session: Session,
    heads: [HeadIndices; 3],
}

impl FaceDetector {
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD needs 9 outputs (3 strides × score/bbox/kps), model has {}",
                names.len()
            )));
        }

        let heads = map_heads(&names);
        tracing::info!(path = model_path, outputs = ?names, ?heads, "loaded SCRFD model");

        Ok(Self { session, heads })
    }

    /// Detect faces in a luminance plane, strongest first.
    pub fn detect(&mut self, plane: &GrayImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (input, letterbox) = to_tensor(plane);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (heads, stride) in self.heads.iter().zip(STRIDES) {
            let extract = |idx: usize, what: &str| {
                outputs[idx].try_extract_tensor::<f32>().map(|(_, data)| data).map_err(|e| {
                    DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}"))
                })
            };
            let scores = extract(heads.score, "scores")?;
            let boxes = extract(heads.bbox, "boxes")?;
            let kps = extract(heads.kps, "keypoints")?;
            candidates.extend(decode_head(scores, boxes, kps, stride, &letterbox));
        }

        Ok(non_max_suppression(candidates, NMS_IOU))
    }
}

/// Resolve output ordering by name (`score_8`, `bbox_16`, ...), falling back
/// to the common positional export `[scores×3, boxes×3, kps×3]`.
fn map_heads(names: &[String]) -> [HeadIndices; 3] {
    let find = |prefix: &str, stride: u32| {
        let wanted = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == wanted)
    };
    let named: Option<Vec<HeadIndices>> = STRIDES
        .iter()
        .map(|&s| {
            Some(HeadIndices {
                score: find("score", s)?,
                bbox: find("bbox", s)?,
                kps: find("kps", s)?,
            })
        })
        .collect();

    match named {
        Some(heads) => [heads[0], heads[1], heads[2]],
        None => {
            tracing::debug!(?names, "SCRFD output names not recognized, using positional layout");
            std::array::from_fn(|i| HeadIndices {
                score: i,
                bbox: i + 3,
                kps: i + 6,
            })
        }
    }
}

fn to_tensor(plane: &GrayImage) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(plane.width(), plane.height());
    let fitted_w = ((plane.width() as f32 * letterbox.scale).round() as u32).clamp(1, INPUT_SIZE);
    let fitted_h = ((plane.height() as f32 * letterbox.scale).round() as u32).clamp(1, INPUT_SIZE);
    let fitted = image::imageops::resize(plane, fitted_w, fitted_h, FilterType::Triangle);

    // Padding at the mean normalizes to zero.
    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    let (ox, oy) = (letterbox.pad_x as u32, letterbox.pad_y as u32);
    for (x, y, px) in fitted.enumerate_pixels() {
        let (tx, ty) = ((x + ox) as usize, (y + oy) as usize);
        if tx >= size || ty >= size {
            continue;
        }
        let v = (px[0] as f32 - PIXEL_MEAN) / PIXEL_STD;
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = v;
        }
    }

    (tensor, letterbox)
}

fn decode_head(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: u32,
    letterbox: &Letterbox,
) -> Vec<BoundingBox> {
    let grid = (INPUT_SIZE / stride) as usize;
    let step = stride as f32;

    (0..grid * grid * ANCHORS_PER_CELL)
        .filter_map(|idx| {
            let score = *scores.get(idx)?;
            if score <= SCORE_THRESHOLD {
                return None;
            }
            let cell = idx / ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * step;
            let ay = (cell / grid) as f32 * step;

            let b = boxes.get(idx * 4..idx * 4 + 4)?;
            let (x1, y1) = letterbox.unmap(ax - b[0] * step, ay - b[1] * step);
            let (x2, y2) = letterbox.unmap(ax + b[2] * step, ay + b[3] * step);

            let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|k| {
                let mut points: Landmarks = [(0.0, 0.0); 5];
                for (i, p) in points.iter_mut().enumerate() {
                    *p = letterbox.unmap(ax + k[i * 2] * step, ay + k[i * 2 + 1] * step);
                }
                points
            });

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

fn non_max_suppression(mut candidates: Vec<BoundingBox>, threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<BoundingBox> = Vec::new();
    for c in candidates {
        if kept.iter().all(|k| iou(k, &c) <= threshold) {
            kept.push(c);
        }
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let iy = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = ix * iy;
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
