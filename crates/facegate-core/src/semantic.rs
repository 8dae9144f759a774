//! Semantic descriptor — vision model profile mapped to an embedding.
//!
//! Model failures never leave this module: a timeout, transport error or
//! bad status yields `face_detected = false` and the fusion engine degrades
//! to the geometric path.

use crate::config::SemanticSettings;
use crate::geometric::Enrichment;
use crate::profile::{parse_profile, FacialProfile, Feature, Measure, ProfileParse};
use crate::quality::NormalizedImage;
use crate::vision::{VisionError, VisionModelClient, VisionRequest};
use crate::EMBEDDING_DIM;
use base64::Engine as _;
use std::f32::consts::PI;
use std::fmt::Write as _;
use std::sync::Arc;

/// Mark count that saturates the marks feature.
const MARKS_SATURATION: f32 = 5.0;

#[derive(Debug, Clone)]
pub struct SemanticResult {
    pub face_detected: bool,
    pub embedding: Option<Vec<f32>>,
    pub profile: Option<FacialProfile>,
    pub confidence: f64,
    /// Model answer, when one arrived.
    pub raw_text: Option<String>,
}

impl SemanticResult {
    fn no_face(raw_text: Option<String>) -> Self {
        Self {
            face_detected: false,
            embedding: None,
            profile: None,
            confidence: 0.0,
            raw_text,
        }
    }
}

pub struct SemanticDescriptor {
    client: Arc<dyn VisionModelClient>,
    settings: SemanticSettings,
}

impl SemanticDescriptor {
    pub fn new(client: Arc<dyn VisionModelClient>, settings: SemanticSettings) -> Self {
        Self { client, settings }
    }

    pub fn describe(&self, image: &NormalizedImage, enrichment: Option<&Enrichment>) -> SemanticResult {
        let text = match self.query(image, enrichment) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "semantic: vision model unavailable, degrading");
                return SemanticResult::no_face(None);
            }
        };

        match parse_profile(&text) {
            ProfileParse::NoFace => {
                tracing::debug!("semantic: model reported no face");
                SemanticResult::no_face(Some(text))
            }
            ProfileParse::Profile(profile) => {
                tracing::debug!(
                    source = ?profile.source,
                    known = profile.known_count(),
                    "semantic: profile parsed"
                );
                SemanticResult {
                    face_detected: true,
                    embedding: Some(encode_profile(&profile)),
                    profile: Some(profile),
                    confidence: self.settings.confidence,
                    raw_text: Some(text),
                }
            }
        }
    }

    fn query(&self, image: &NormalizedImage, enrichment: Option<&Enrichment>) -> Result<String, VisionError> {
        let jpeg = image
            .to_jpeg(self.settings.jpeg_quality)
            .map_err(|e| VisionError::Encode(e.to_string()))?;
        let request = VisionRequest {
            image: base64::engine::general_purpose::STANDARD.encode(jpeg),
            prompt: build_prompt(enrichment),
            enrichment: enrichment.cloned(),
        };
        self.client.complete(&request)
    }
}

/// Prompt asking for a JSON profile over the parser's own vocabularies.
pub fn build_prompt(enrichment: Option<&Enrichment>) -> String {
    let mut prompt = String::from(
        "You are a biometric analyst. Describe the most prominent human face in the image \
         as a single JSON object and nothing else. If no face is visible, answer \
         {\"face_detected\": false}.\n\nUse exactly these keys and one of the listed values:\n",
    );
    for feature in Feature::ALL {
        let values: Vec<&str> = feature.vocabulary().iter().map(|t| t.name).collect();
        let _ = writeln!(prompt, "- \"{}\": one of {}", feature.key(), values.join(" | "));
    }
    prompt.push_str("Numeric keys (numbers only):\n");
    for measure in Measure::ALL {
        let unit = match measure {
            Measure::FaceRatio => "face height divided by face width",
            Measure::Age => "apparent age in years",
            _ => "percentage of face width or height",
        };
        let _ = writeln!(prompt, "- \"{}\": {unit}", measure.key());
    }
    prompt.push_str(
        "- \"special_marks\": list of distinguishing marks (scars, moles, freckles, tattoos, \
         piercings, glasses, facial hair), empty if none\n",
    );

    if let Some(e) = enrichment {
        let _ = write!(
            prompt,
            "\nA geometric detector measured this face: {} landmarks, face width {:.0}% of the image, \
             height/width {:.2}",
            e.landmark_count,
            e.face_width_ratio * 100.0,
            e.face_aspect,
        );
        if let Some(eyes) = e.eye_distance_ratio {
            let _ = write!(prompt, ", inter-ocular distance {:.0}% of face width", eyes * 100.0);
        }
        if let Some(mouth) = e.mouth_width_ratio {
            let _ = write!(prompt, ", mouth width {:.0}% of face width", mouth * 100.0);
        }
        prompt.push_str(". Keep your proportions consistent with these measurements.\n");
    }

    prompt
}

/// Deterministic profile → embedding mapping.
///
/// Categorical features map through their vocabulary scalar, measures are
/// normalized into [0, 1], then the vector is padded to [`EMBEDDING_DIM`]
/// with bounded sinusoidal mixes of the base features and rescaled to [-1, 1].
pub fn encode_profile(profile: &FacialProfile) -> Vec<f32> {
    let mut base: Vec<f32> = Feature::ALL.iter().map(|&f| profile.scalar(f)).collect();
    base.extend(Measure::ALL.iter().map(|&m| profile.normalized(m) as f32));
    base.push((profile.marks.len() as f32 / MARKS_SATURATION).min(1.0));

    let n = base.len();
    let mut features = base.clone();
    for k in 0..EMBEDDING_DIM.saturating_sub(n) {
        let a = base[k % n];
        let b = base[(k * 7 + 3) % n];
        let harmonic = (k / n + 1) as f32;
        features.push(0.5 + 0.5 * (PI * (harmonic * a + b)).sin());
    }
    features.truncate(EMBEDDING_DIM);

    features.into_iter().map(|v| v.clamp(0.0, 1.0) * 2.0 - 1.0).collect()
}
