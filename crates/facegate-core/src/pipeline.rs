//! The full matching chain: quality gate, extraction, fusion, matching, decision.

use crate::config::{EngineConfig, FusionWeights};
use crate::decision::{AccessContext, AccessDecision, DecisionPolicy};
use crate::fusion::fuse;
use crate::geometric::{GeometricDetector, GeometricResult};
use crate::matcher::GalleryMatcher;
use crate::profile::FacialProfile;
use crate::quality::{QualityError, QualityGate};
use crate::semantic::{SemanticDescriptor, SemanticResult};
use crate::types::{BoundingBox, Embedding, EmbeddingMethod, EnrolledFace, MatchResult};

/// Output of [`Pipeline::extract_embedding`]: the fused embedding plus what
/// each extractor saw.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub embedding: Embedding,
    pub geometric: Option<GeometricResult>,
    pub semantic: Option<SemanticResult>,
    /// Size of the normalized image the extractors ran on.
    pub width: u32,
    pub height: u32,
}

impl Extraction {
    pub fn profile(&self) -> Option<&FacialProfile> {
        self.semantic.as_ref()?.profile.as_ref()
    }

    pub fn bbox(&self) -> Option<&BoundingBox> {
        self.geometric.as_ref()?.bbox.as_ref()
    }
}

/// One engine instance. Both extractors are optional; a pipeline with
/// neither still runs and denies every request.
pub struct Pipeline {
    gate: QualityGate,
    geometric: Option<Box<dyn GeometricDetector>>,
    semantic: Option<SemanticDescriptor>,
    fusion: FusionWeights,
    matcher: GalleryMatcher,
    policy: DecisionPolicy,
}

impl Pipeline {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            gate: QualityGate::new(config.quality.clone()),
            geometric: None,
            semantic: None,
            fusion: config.fusion.clone(),
            matcher: GalleryMatcher::new(config.matching.clone()),
            policy: DecisionPolicy::new(config.decision.clone()),
        }
    }

    pub fn with_geometric(mut self, detector: Box<dyn GeometricDetector>) -> Self {
        self.geometric = Some(detector);
        self
    }

    pub fn with_semantic(mut self, descriptor: SemanticDescriptor) -> Self {
        self.semantic = Some(descriptor);
        self
    }

    pub fn has_geometric(&self) -> bool {
        self.geometric.is_some()
    }

    pub fn has_semantic(&self) -> bool {
        self.semantic.is_some()
    }

    pub fn quality_gate(&self) -> &QualityGate {
        &self.gate
    }

    /// Quality gate, then both extractors, then fusion.
    ///
    /// Only quality failures surface. A geometric detector error is logged
    /// and treated as "no geometric result"; semantic failures are absorbed
    /// by the descriptor itself.
    pub fn extract_embedding(&mut self, raw: &[u8]) -> Result<Extraction, QualityError> {
        let image = self.gate.validate_and_normalize(raw)?;
        let (width, height) = (image.width(), image.height());

        let geometric = match self.geometric.as_mut() {
            Some(detector) => match detector.detect(&image) {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::warn!(error = %e, "pipeline: geometric detector failed");
                    None
                }
            },
            None => None,
        };

        let enrichment = geometric.as_ref().and_then(|g| g.enrichment(width, height));
        let semantic = self
            .semantic
            .as_ref()
            .map(|s| s.describe(&image, enrichment.as_ref()));

        let embedding = fuse(geometric.as_ref(), semantic.as_ref(), &self.fusion);
        tracing::info!(
            method = %embedding.method,
            confidence = embedding.confidence,
            geometric_face = geometric.as_ref().map(|g| g.face_detected),
            semantic_face = semantic.as_ref().map(|s| s.face_detected),
            "embedding extracted"
        );

        Ok(Extraction {
            embedding,
            geometric,
            semantic,
            width,
            height,
        })
    }

    pub fn find_best_match(
        &self,
        probe: &Embedding,
        gallery: &[EnrolledFace],
        min_confidence: f64,
    ) -> MatchResult {
        self.matcher.find_best_match(probe, gallery, min_confidence)
    }

    pub fn decide(&self, result: &MatchResult, context: AccessContext) -> AccessDecision {
        self.policy.decide(result, context)
    }

    /// Full chain for one access attempt. Always yields a decision; a
    /// rejected capture is a denial carrying the rejection reason.
    pub fn authenticate(
        &mut self,
        raw: &[u8],
        gallery: &[EnrolledFace],
        context: AccessContext,
    ) -> AccessDecision {
        let decision = match self.extract_embedding(raw) {
            Ok(extraction) => {
                let probe = extraction.embedding;
                let min_confidence = self.policy.floor(context, probe.method, 0.0);
                let result = self.find_best_match(&probe, gallery, min_confidence);
                self.decide(&result, context)
            }
            Err(e) => {
                tracing::warn!(error = %e, "pipeline: capture rejected");
                AccessDecision::denied(context, EmbeddingMethod::ErrorFallback, format!("capture rejected: {e}"))
            }
        };

        tracing::info!(
            target: "facegate::audit",
            outcome = ?decision.outcome,
            context = %decision.context,
            identity = decision.matched_identity.as_deref(),
            confidence = decision.confidence,
            method = %decision.method,
            rationale = %decision.rationale,
            "access decision"
        );
        decision
    }
}
