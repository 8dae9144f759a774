use serde::{Deserialize, Serialize};
use std::fmt;

/// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
pub type Landmarks = [(f32, f32); 5];

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub landmarks: Option<Landmarks>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Which extraction path produced an embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingMethod {
    Geometric,
    Semantic,
    Hybrid,
    GeometricFallback,
    /// Both extractors failed outright; the embedding carries no vector.
    ErrorFallback,
    /// Extractors ran but neither found a face.
    None,
}

impl EmbeddingMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Geometric => "geometric",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
            Self::GeometricFallback => "geometric-fallback",
            Self::ErrorFallback => "error-fallback",
            Self::None => "none",
        }
    }
}

impl fmt::Display for EmbeddingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Face embedding vector with provenance and confidence.
///
/// A face-bearing embedding holds [`crate::EMBEDDING_DIM`] values in [-1, 1].
/// The "no face" and "error" variants hold an empty vector and zero
/// confidence, so they can never land near a real enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub method: EmbeddingMethod,
    pub confidence: f64,
}

impl Embedding {
    pub fn new(values: Vec<f32>, method: EmbeddingMethod, confidence: f64) -> Self {
        Self {
            values,
            method,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Extractors ran and reported no face.
    pub fn no_face() -> Self {
        Self {
            values: Vec::new(),
            method: EmbeddingMethod::None,
            confidence: 0.0,
        }
    }

    /// Extraction failed outright.
    pub fn error_fallback() -> Self {
        Self {
            values: Vec::new(),
            method: EmbeddingMethod::ErrorFallback,
            confidence: 0.0,
        }
    }

    pub fn has_face(&self) -> bool {
        !self.values.is_empty()
            && !matches!(
                self.method,
                EmbeddingMethod::None | EmbeddingMethod::ErrorFallback
            )
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Default per-enrollment confidence floor.
pub const DEFAULT_CONFIDENCE_MINIMUM: f64 = 0.95;

fn default_confidence_minimum() -> f64 {
    DEFAULT_CONFIDENCE_MINIMUM
}

fn default_active() -> bool {
    true
}

/// One enrolled capture session for an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledFace {
    pub id: String,
    pub owner: String,
    #[serde(default)]
    pub label: String,
    pub embedding: Option<Embedding>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_confidence_minimum")]
    pub confidence_minimum: f64,
    #[serde(default)]
    pub created_at: String,
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub candidate: Option<EnrolledFace>,
    pub confidence: f64,
    /// Euclidean distance to the accepted candidate; `+inf` when none.
    pub distance: f64,
    /// Method tag of the probe embedding.
    pub method: EmbeddingMethod,
    /// Candidates actually scored.
    pub compared: usize,
    /// Candidates skipped (inactive, no embedding, length mismatch).
    pub skipped: usize,
}

impl MatchResult {
    pub fn no_match(method: EmbeddingMethod) -> Self {
        Self {
            candidate: None,
            confidence: 0.0,
            distance: f64::INFINITY,
            method,
            compared: 0,
            skipped: 0,
        }
    }
}
