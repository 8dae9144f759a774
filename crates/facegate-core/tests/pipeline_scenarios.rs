//! End-to-end pipeline scenarios with stub detectors and a stub vision model.

use facegate_core::decision::{AccessContext, Outcome};
use facegate_core::gallery::Registry;
use facegate_core::profile::{FacialProfile, ParseSource};
use facegate_core::semantic::encode_profile;
use facegate_core::geometric::DetectorError;
use facegate_core::quality::QualityError;
use facegate_core::vision::{VisionError, VisionRequest};
use facegate_core::{
    BoundingBox, EmbeddingMethod, EngineConfig, GeometricDetector, GeometricResult, NormalizedImage,
    Pipeline, SemanticDescriptor, VisionModelClient, EMBEDDING_DIM,
};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;

enum Geo {
    Face { confidence: f64, seed: f32 },
    NoFace,
    Broken,
}

struct StubDetector(Geo);

impl GeometricDetector for StubDetector {
    fn detect(&mut self, image: &NormalizedImage) -> Result<GeometricResult, DetectorError> {
        match self.0 {
            Geo::Face { confidence, seed } => Ok(GeometricResult {
                face_detected: true,
                bbox: Some(BoundingBox {
                    x: 10.0,
                    y: 10.0,
                    width: image.width() as f32 / 2.0,
                    height: image.height() as f32 / 2.0,
                    confidence: 0.99,
                    landmarks: None,
                }),
                landmarks: None,
                embedding: Some(vector(seed)),
                confidence,
            }),
            Geo::NoFace => Ok(GeometricResult::no_face()),
            Geo::Broken => Err(DetectorError::InferenceFailed("stub failure".into())),
        }
    }
}

enum Answer {
    Text(&'static str),
    Timeout,
}

struct StubVision(Answer);

impl VisionModelClient for StubVision {
    fn complete(&self, _request: &VisionRequest) -> Result<String, VisionError> {
        match &self.0 {
            Answer::Text(t) => Ok((*t).to_string()),
            Answer::Timeout => Err(VisionError::Timeout),
        }
    }
}

const PROFILE: &str = r#"{"face_shape": "oval", "eye_shape": "almond", "eye_size": "large",
    "nose_width": "narrow", "apparent_age": 34, "eye_distance_pct": 42, "special_marks": ["mole"]}"#;

fn vector(seed: f32) -> Vec<f32> {
    (0..EMBEDDING_DIM).map(|i| (i as f32 * 0.21 + seed * 2.3).sin()).collect()
}

fn capture() -> Vec<u8> {
    let img = RgbImage::from_fn(160, 120, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) * 3 % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn pipeline(geo: Option<Geo>, answer: Option<Answer>) -> Pipeline {
    let config = EngineConfig::default();
    let mut p = Pipeline::new(&config);
    if let Some(g) = geo {
        p = p.with_geometric(Box::new(StubDetector(g)));
    }
    if let Some(a) = answer {
        p = p.with_semantic(SemanticDescriptor::new(Arc::new(StubVision(a)), config.semantic.clone()));
    }
    p
}

#[test]
fn semantic_timeout_degrades_to_geometric_fallback() {
    let mut p = pipeline(Some(Geo::Face { confidence: 0.8, seed: 1.0 }), Some(Answer::Timeout));
    let extraction = p.extract_embedding(&capture()).unwrap();

    assert_eq!(extraction.embedding.method, EmbeddingMethod::GeometricFallback);
    assert!((extraction.embedding.confidence - 0.64).abs() < 1e-12);
    assert_eq!(extraction.embedding.len(), EMBEDDING_DIM);
    assert!(!extraction.semantic.unwrap().face_detected);
}

#[test]
fn both_no_face_always_denied() {
    for context in [AccessContext::Login, AccessContext::PhysicalAccess] {
        let mut p = pipeline(Some(Geo::NoFace), Some(Answer::Text(r#"{"face_detected": false}"#)));
        let extraction = p.extract_embedding(&capture()).unwrap();
        assert_eq!(extraction.embedding.method, EmbeddingMethod::None);
        assert_eq!(extraction.embedding.confidence, 0.0);

        let registry = Registry::new();
        registry
            .enroll("alice", "desk", facegate_core::Embedding::new(vector(1.0), EmbeddingMethod::Hybrid, 0.9), None)
            .unwrap();
        let decision = p.authenticate(&capture(), &registry.snapshot(), context);
        assert_eq!(decision.outcome, Outcome::Denied);
    }
}

#[test]
fn hybrid_enroll_then_authenticate() {
    let mut p = pipeline(Some(Geo::Face { confidence: 0.8, seed: 2.0 }), Some(Answer::Text(PROFILE)));
    let registry = Registry::new();

    let extraction = p.extract_embedding(&capture()).unwrap();
    assert_eq!(extraction.embedding.method, EmbeddingMethod::Hybrid);
    assert!((extraction.embedding.confidence - (0.6 * 0.8 + 0.4 * 0.95)).abs() < 1e-9);
    assert!(extraction.profile().is_some());
    let enrolled = registry.enroll("alice", "desk", extraction.embedding, None).unwrap();

    for context in [AccessContext::Login, AccessContext::PhysicalAccess] {
        let decision = p.authenticate(&capture(), &registry.snapshot(), context);
        assert_eq!(decision.outcome, Outcome::Permitted, "{}", decision.rationale);
        assert_eq!(decision.matched_identity.as_deref(), Some("alice"));
        assert_eq!(decision.enrollment_id.as_deref(), Some(enrolled.id.as_str()));
        assert_eq!(decision.method, EmbeddingMethod::Hybrid);
    }

    registry.revoke(&enrolled.id);
    let decision = p.authenticate(&capture(), &registry.snapshot(), AccessContext::Login);
    assert_eq!(decision.outcome, Outcome::Denied);
}

#[test]
fn geometric_error_leaves_semantic_path() {
    let mut p = pipeline(Some(Geo::Broken), Some(Answer::Text(PROFILE)));
    let extraction = p.extract_embedding(&capture()).unwrap();
    assert_eq!(extraction.embedding.method, EmbeddingMethod::Semantic);
    assert_eq!(extraction.embedding.confidence, 0.95);
    assert!(extraction.geometric.is_none());
}

#[test]
fn semantic_embedding_stable_across_requests() {
    let mut p = pipeline(None, Some(Answer::Text(PROFILE)));
    let a = p.extract_embedding(&capture()).unwrap().embedding;
    let b = p.extract_embedding(&capture()).unwrap().embedding;
    assert_eq!(a, b);
}

#[test]
fn both_extractors_failing_is_error_fallback() {
    let mut p = pipeline(Some(Geo::Broken), None);
    let extraction = p.extract_embedding(&capture()).unwrap();
    assert_eq!(extraction.embedding.method, EmbeddingMethod::ErrorFallback);
    assert!(extraction.embedding.is_empty());

    let decision = p.authenticate(&capture(), &[], AccessContext::Login);
    assert_eq!(decision.outcome, Outcome::Denied);
}

#[test]
fn gallery_of_three_picks_identical_enrollment() {
    let p = pipeline(None, None);
    let registry = Registry::new();
    let ids: Vec<String> = [1.0, 2.0, 3.0]
        .iter()
        .enumerate()
        .map(|(i, &seed)| {
            let e = facegate_core::Embedding::new(vector(seed), EmbeddingMethod::Hybrid, 0.9);
            registry.enroll(&format!("user{i}"), "", e, Some(0.5)).unwrap().id
        })
        .collect();

    let probe = facegate_core::Embedding::new(vector(2.0), EmbeddingMethod::Hybrid, 0.9);
    let result = p.find_best_match(&probe, &registry.snapshot(), 0.6);
    assert_eq!(result.candidate.unwrap().id, ids[1]);
    assert!(result.confidence >= 0.9);
}

#[test]
fn undersized_capture_surfaces_quality_error() {
    let mut p = pipeline(Some(Geo::Face { confidence: 0.8, seed: 1.0 }), Some(Answer::Text(PROFILE)));
    let img = RgbImage::from_fn(63, 100, |x, y| Rgb([(x * 4) as u8, (y * 2) as u8, 0]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();

    assert!(matches!(p.extract_embedding(buf.get_ref()), Err(QualityError::Rejected(_))));
}

#[test]
fn refusal_answers_never_match_each_other() {
    let mut p = pipeline(None, Some(Answer::Text("I'm sorry, I can't help identify people.")));
    let extraction = p.extract_embedding(&capture()).unwrap();
    assert_eq!(extraction.embedding.method, EmbeddingMethod::None);
    assert!(!extraction.embedding.has_face());

    // a record holding the all-defaults vector an empty answer would encode to
    let registry = Registry::new();
    let defaults = encode_profile(&FacialProfile::empty(ParseSource::Keywords));
    registry
        .enroll("alice", "desk", facegate_core::Embedding::new(defaults, EmbeddingMethod::Semantic, 0.95), None)
        .unwrap();

    let mut p = pipeline(None, Some(Answer::Text("Sorry, I cannot assist with that.")));
    for context in [AccessContext::Login, AccessContext::PhysicalAccess] {
        let decision = p.authenticate(&capture(), &registry.snapshot(), context);
        assert_eq!(decision.outcome, Outcome::Denied);
        assert!(decision.matched_identity.is_none());
    }
}
