//! Appearance encoder via ONNX Runtime.
//!
//! Maps a 112×112 RGB face crop to a 128-dimensional L2-normalized
//! embedding (SFace / MobileFaceNet style exports).

use crate::geometric::DetectorError;
use crate::EMBEDDING_DIM;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const INPUT_SIZE: u32 = 112;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 127.5;

pub struct FaceEncoder {
    session: Session,
}

impl FaceEncoder {
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face encoder"
        );

        Ok(Self { session })
    }

    /// Encode a face crop of any size; it is resized to the model input.
    pub fn encode(&mut self, crop: &RgbImage) -> Result<Vec<f32>, DetectorError> {
        let input = to_tensor(crop);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(DetectorError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(l2_normalize(raw.to_vec()))
    }
}

fn to_tensor(crop: &RgbImage) -> Array4<f32> {
    let resized = image::imageops::resize(crop, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, px) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (px[c] as f32 - PIXEL_MEAN) / PIXEL_STD;
        }
    }
    tensor
}

/// Unit-length vector; every component lands in [-1, 1]. Zero vectors pass through.
pub(crate) fn l2_normalize(values: Vec<f32>) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.into_iter().map(|v| v / norm).collect()
    } else {
        values
    }
}
