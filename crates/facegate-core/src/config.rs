//! Engine tunables.
//!
//! The fusion weights and match/decision thresholds are hand-tuned, with no
//! calibration method behind them, so every one of them is configuration.
//! All sections deserialize with defaults; a TOML file may override any
//! subset.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub quality: QualityLimits,
    pub fusion: FusionWeights,
    pub matching: MatchTuning,
    pub decision: DecisionThresholds,
    pub semantic: SemanticSettings,
}

/// Quality gate bounds. Dimension and aspect bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityLimits {
    pub min_side: u32,
    pub max_side: u32,
    pub min_aspect: f64,
    pub max_aspect: f64,
    /// Luminance standard deviation floor (0–255 scale).
    pub min_luma_stddev: f64,
    /// Longer side after downsampling.
    pub target_side: u32,
    pub clahe_tiles: u32,
    pub clahe_clip: f32,
}

impl Default for QualityLimits {
    fn default() -> Self {
        Self {
            min_side: 64,
            max_side: 4096,
            min_aspect: 0.5,
            max_aspect: 2.0,
            min_luma_stddev: 4.0,
            target_side: 512,
            clahe_tiles: 8,
            clahe_clip: 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub geometric: f64,
    pub semantic: f64,
    /// Upper bound on hybrid confidence.
    pub confidence_cap: f64,
    /// Multiplier applied when only the geometric path found a face.
    pub single_source_penalty: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            geometric: 0.6,
            semantic: 0.4,
            confidence_cap: 0.98,
            single_source_penalty: 0.8,
        }
    }
}

/// Distance → confidence conversion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchTuning {
    /// Below this distance the confidence is boosted.
    pub near_distance: f64,
    pub near_boost: f64,
    pub near_cap: f64,
    /// Above this distance the confidence is suppressed.
    pub far_distance: f64,
    pub far_scale: f64,
    pub far_floor: f64,
}

impl Default for MatchTuning {
    fn default() -> Self {
        Self {
            near_distance: 0.5,
            near_boost: 2.0,
            near_cap: 0.95,
            far_distance: 2.0,
            far_scale: 0.1,
            far_floor: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    pub login: f64,
    pub physical_access: f64,
    /// Floor used when the probe came from the penalized geometric-only path.
    pub geometric_fallback: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            login: 0.6,
            physical_access: 0.75,
            geometric_fallback: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticSettings {
    /// Fixed confidence assigned to any successfully produced profile.
    /// Not a measured quantity.
    pub confidence: f64,
    /// JPEG quality for the image sent to the vision model.
    pub jpeg_quality: u8,
}

impl Default for SemanticSettings {
    fn default() -> Self {
        Self {
            confidence: 0.95,
            jpeg_quality: 90,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.quality.min_side, 64);
        assert_eq!(cfg.quality.max_side, 4096);
        assert_eq!(cfg.quality.target_side, 512);
        assert_eq!(cfg.fusion.geometric, 0.6);
        assert_eq!(cfg.fusion.semantic, 0.4);
        assert_eq!(cfg.fusion.confidence_cap, 0.98);
        assert_eq!(cfg.matching.near_distance, 0.5);
        assert_eq!(cfg.matching.far_distance, 2.0);
        assert_eq!(cfg.decision.login, 0.6);
        assert_eq!(cfg.decision.physical_access, 0.75);
        assert_eq!(cfg.decision.geometric_fallback, 0.4);
        assert_eq!(cfg.semantic.confidence, 0.95);
    }

    #[test]
    fn test_partial_toml_override() {
        let cfg: EngineConfig = toml::from_str(
            r#"
            [fusion]
            geometric = 0.7
            semantic = 0.3

            [decision]
            login = 0.65
            "#,
        )
        .unwrap();
        assert_eq!(cfg.fusion.geometric, 0.7);
        assert_eq!(cfg.fusion.semantic, 0.3);
        assert_eq!(cfg.fusion.confidence_cap, 0.98);
        assert_eq!(cfg.decision.login, 0.65);
        assert_eq!(cfg.decision.physical_access, 0.75);
        assert_eq!(cfg.quality, QualityLimits::default());
    }
}
