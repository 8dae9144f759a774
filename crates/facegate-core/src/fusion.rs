//! Fusion of the geometric and semantic extraction results.

use crate::config::FusionWeights;
use crate::geometric::GeometricResult;
use crate::semantic::SemanticResult;
use crate::types::{Embedding, EmbeddingMethod};

/// Combine both extraction paths into one embedding.
///
/// `None` means the extractor did not produce a result at all (failed or not
/// configured); a result with `face_detected == false` means it ran and saw
/// no face. Four outcomes:
///
/// 1. both saw a face: weighted sum, confidence capped, `hybrid`
/// 2. only semantic: passed through, `semantic`
/// 3. only geometric: confidence penalized, `geometric-fallback`
/// 4. neither: empty vector with zero confidence, `none` (or
///    `error-fallback` when both inputs are absent)
pub fn fuse(
    geo: Option<&GeometricResult>,
    sem: Option<&SemanticResult>,
    weights: &FusionWeights,
) -> Embedding {
    let geo_face = geo.and_then(|g| {
        g.embedding
            .as_deref()
            .filter(|e| g.face_detected && !e.is_empty())
            .map(|e| (e, g.confidence))
    });
    let sem_face = sem.and_then(|s| {
        s.embedding
            .as_deref()
            .filter(|e| s.face_detected && !e.is_empty())
            .map(|e| (e, s.confidence))
    });

    match (geo_face, sem_face) {
        (Some((g, gc)), Some((s, sc))) if g.len() == s.len() => {
            let values = g
                .iter()
                .zip(s)
                .map(|(a, b)| {
                    (weights.geometric as f32 * a + weights.semantic as f32 * b).clamp(-1.0, 1.0)
                })
                .collect();
            let confidence = (weights.geometric * gc + weights.semantic * sc).min(weights.confidence_cap);
            Embedding::new(values, EmbeddingMethod::Hybrid, confidence)
        }
        (Some((g, gc)), sem_face) => {
            if let Some((s, _)) = sem_face {
                tracing::warn!(
                    geometric = g.len(),
                    semantic = s.len(),
                    "fusion: embedding length mismatch, using geometric path only"
                );
            }
            Embedding::new(
                g.to_vec(),
                EmbeddingMethod::GeometricFallback,
                gc * weights.single_source_penalty,
            )
        }
        (None, Some((s, sc))) => Embedding::new(s.to_vec(), EmbeddingMethod::Semantic, sc),
        (None, None) if geo.is_none() && sem.is_none() => Embedding::error_fallback(),
        (None, None) => Embedding::no_face(),
    }
}
