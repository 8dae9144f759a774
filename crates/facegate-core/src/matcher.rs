//! Nearest-match search of a probe embedding over an enrollment gallery.

use crate::config::MatchTuning;
use crate::types::{Embedding, EnrolledFace, MatchResult};
use rayon::prelude::*;

/// Distance and derived confidence between two embeddings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub distance: f64,
    pub confidence: f64,
}

/// Compare two embeddings. `None` unless both are non-empty and of equal length.
pub fn compare(a: &[f32], b: &[f32], tuning: &MatchTuning) -> Option<Comparison> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let distance = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let d = (*x as f64) - (*y as f64);
            d * d
        })
        .sum::<f64>()
        .sqrt();
    Some(Comparison {
        distance,
        confidence: distance_to_confidence(distance, tuning),
    })
}

/// `1 / (1 + d)`, boosted for near matches and crushed for far ones.
pub fn distance_to_confidence(distance: f64, tuning: &MatchTuning) -> f64 {
    let c = 1.0 / (1.0 + distance);
    if distance < tuning.near_distance {
        (c * tuning.near_boost).min(tuning.near_cap)
    } else if distance > tuning.far_distance {
        (c * tuning.far_scale).max(tuning.far_floor)
    } else {
        c
    }
}

enum Scored {
    Skipped,
    Rejected,
    Accepted(Comparison),
}

#[derive(Debug, Clone, Default)]
pub struct GalleryMatcher {
    tuning: MatchTuning,
}

impl GalleryMatcher {
    pub fn new(tuning: MatchTuning) -> Self {
        Self { tuning }
    }

    pub fn tuning(&self) -> &MatchTuning {
        &self.tuning
    }

    /// Best accepted candidate for `probe`.
    ///
    /// A candidate is accepted only when its confidence reaches
    /// `max(min_confidence, candidate.confidence_minimum)`. Ties keep the
    /// earliest gallery position.
    pub fn find_best_match(
        &self,
        probe: &Embedding,
        gallery: &[EnrolledFace],
        min_confidence: f64,
    ) -> MatchResult {
        let mut result = MatchResult::no_match(probe.method);
        if !probe.has_face() {
            tracing::debug!(method = %probe.method, "matcher: probe has no face, skipping scan");
            return result;
        }

        let scored: Vec<Scored> = gallery
            .par_iter()
            .map(|face| self.score(probe, face, min_confidence))
            .collect();

        let mut best: Option<(usize, Comparison)> = None;
        for (idx, s) in scored.into_iter().enumerate() {
            match s {
                Scored::Skipped => result.skipped += 1,
                Scored::Rejected => result.compared += 1,
                Scored::Accepted(cmp) => {
                    result.compared += 1;
                    if best.map_or(true, |(_, b)| cmp.confidence > b.confidence) {
                        best = Some((idx, cmp));
                    }
                }
            }
        }

        if let Some((idx, cmp)) = best {
            result.candidate = Some(gallery[idx].clone());
            result.confidence = cmp.confidence;
            result.distance = cmp.distance;
        }

        tracing::debug!(
            compared = result.compared,
            skipped = result.skipped,
            matched = result.candidate.as_ref().map(|c| c.id.as_str()),
            confidence = result.confidence,
            "matcher: scan complete"
        );
        result
    }

    fn score(&self, probe: &Embedding, face: &EnrolledFace, min_confidence: f64) -> Scored {
        if !face.active {
            return Scored::Skipped;
        }
        let Some(stored) = face.embedding.as_ref().filter(|e| e.has_face()) else {
            tracing::warn!(id = %face.id, "matcher: enrollment has no embedding, skipping");
            return Scored::Skipped;
        };
        let Some(cmp) = compare(&probe.values, &stored.values, &self.tuning) else {
            tracing::warn!(
                id = %face.id,
                expected = probe.len(),
                got = stored.len(),
                "matcher: embedding length mismatch, skipping"
            );
            return Scored::Skipped;
        };

        if cmp.confidence >= min_confidence.max(face.confidence_minimum) {
            Scored::Accepted(cmp)
        } else {
            Scored::Rejected
        }
    }
}
