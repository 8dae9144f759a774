//! facegate-core — Hybrid biometric matching engine.
//!
//! Gates raw captures on image quality, extracts a geometric embedding
//! (SCRFD detection + ONNX encoder) and a semantic embedding (vision-language
//! model profile), fuses them, searches an enrollment gallery and turns the
//! best match into a Permitted/Denied access decision.

pub mod config;
pub mod decision;
pub mod encoder;
pub mod fusion;
pub mod gallery;
pub mod geometric;
pub mod matcher;
pub mod pipeline;
pub mod profile;
pub mod quality;
pub mod scrfd;
pub mod semantic;
pub mod types;
pub mod vision;

pub use config::EngineConfig;
pub use decision::{AccessContext, AccessDecision, DecisionPolicy, Outcome};
pub use geometric::{GeometricDetector, GeometricResult, OnnxGeometricDetector};
pub use matcher::{compare, Comparison, GalleryMatcher};
pub use pipeline::{Extraction, Pipeline};
pub use quality::{NormalizedImage, QualityError, QualityGate};
pub use semantic::{SemanticDescriptor, SemanticResult};
pub use types::{BoundingBox, Embedding, EmbeddingMethod, EnrolledFace, MatchResult};
pub use vision::{HttpVisionClient, VisionModelClient};

use std::path::PathBuf;

/// Length of every embedding produced or compared by the engine.
pub const EMBEDDING_DIM: usize = 128;

/// Default directory for the ONNX model files.
///
/// `$XDG_DATA_HOME/facegate/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate/models")
}
