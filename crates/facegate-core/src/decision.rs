//! Access decision policy.
//!
//! Turns a [`MatchResult`] into exactly one of Permitted/Denied with a
//! human-readable rationale. Never fails.

use crate::config::DecisionThresholds;
use crate::types::{EmbeddingMethod, MatchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessContext {
    Login,
    PhysicalAccess,
}

impl AccessContext {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessContext::Login => "login",
            AccessContext::PhysicalAccess => "physical_access",
        }
    }
}

impl fmt::Display for AccessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "login" => Ok(AccessContext::Login),
            "physical_access" | "physical" | "door" => Ok(AccessContext::PhysicalAccess),
            other => Err(format!("unknown access context '{other}' (expected login or physical_access)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Permitted,
    Denied,
}

/// Auditable result of one access attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecision {
    pub outcome: Outcome,
    pub context: AccessContext,
    /// Owner of the matched enrollment, only when permitted.
    pub matched_identity: Option<String>,
    pub enrollment_id: Option<String>,
    pub confidence: f64,
    pub method: EmbeddingMethod,
    pub rationale: String,
    pub decided_at: DateTime<Utc>,
}

impl AccessDecision {
    /// Denial that happened before any matching, e.g. a rejected capture.
    pub fn denied(context: AccessContext, method: EmbeddingMethod, rationale: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Denied,
            context,
            matched_identity: None,
            enrollment_id: None,
            confidence: 0.0,
            method,
            rationale: rationale.into(),
            decided_at: Utc::now(),
        }
    }

    pub fn is_permitted(&self) -> bool {
        self.outcome == Outcome::Permitted
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecisionPolicy {
    thresholds: DecisionThresholds,
}

impl DecisionPolicy {
    pub fn new(thresholds: DecisionThresholds) -> Self {
        Self { thresholds }
    }

    /// Confidence a match must reach in `context`.
    pub fn floor(&self, context: AccessContext, method: EmbeddingMethod, confidence_minimum: f64) -> f64 {
        let floor = match context {
            AccessContext::Login => self.thresholds.login,
            AccessContext::PhysicalAccess => confidence_minimum.max(self.thresholds.physical_access),
        };
        if method == EmbeddingMethod::GeometricFallback {
            floor.min(self.thresholds.geometric_fallback)
        } else {
            floor
        }
    }

    pub fn decide(&self, result: &MatchResult, context: AccessContext) -> AccessDecision {
        match result.method {
            EmbeddingMethod::None => {
                return AccessDecision::denied(context, result.method, "no face detected in capture")
            }
            EmbeddingMethod::ErrorFallback => {
                return AccessDecision::denied(context, result.method, "face extraction failed")
            }
            _ => {}
        }

        let Some(candidate) = &result.candidate else {
            let mut decision = AccessDecision::denied(
                context,
                result.method,
                format!("no enrolled face matched ({} compared)", result.compared),
            );
            decision.confidence = result.confidence;
            return decision;
        };

        let floor = self.floor(context, result.method, candidate.confidence_minimum);
        let permitted = result.confidence >= floor;
        let rationale = if permitted {
            format!(
                "matched {} via {} at {:.3} (floor {:.3})",
                candidate.owner, result.method, result.confidence, floor
            )
        } else {
            format!(
                "best match {} via {} at {:.3} is below floor {:.3}",
                candidate.owner, result.method, result.confidence, floor
            )
        };

        AccessDecision {
            outcome: if permitted { Outcome::Permitted } else { Outcome::Denied },
            context,
            matched_identity: permitted.then(|| candidate.owner.clone()),
            enrollment_id: permitted.then(|| candidate.id.clone()),
            confidence: result.confidence,
            method: result.method,
            rationale,
            decided_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnrolledFace;

    fn matched(confidence: f64, method: EmbeddingMethod, minimum: f64) -> MatchResult {
        MatchResult {
            candidate: Some(EnrolledFace {
                id: "e1".into(),
                owner: "alice".into(),
                label: "desk".into(),
                embedding: None,
                active: true,
                confidence_minimum: minimum,
                created_at: String::new(),
            }),
            confidence,
            distance: 0.3,
            method,
            compared: 1,
            skipped: 0,
        }
    }

    #[test]
    fn test_login_floor() {
        let p = DecisionPolicy::default();
        assert!(p.decide(&matched(0.6, EmbeddingMethod::Hybrid, 0.0), AccessContext::Login).is_permitted());
        let d = p.decide(&matched(0.59, EmbeddingMethod::Hybrid, 0.0), AccessContext::Login);
        assert_eq!(d.outcome, Outcome::Denied);
        assert!(d.matched_identity.is_none());
    }

    #[test]
    fn test_physical_access_uses_enrollment_minimum() {
        let p = DecisionPolicy::default();
        let ctx = AccessContext::PhysicalAccess;
        assert!(p.decide(&matched(0.75, EmbeddingMethod::Hybrid, 0.5), ctx).is_permitted());
        assert!(!p.decide(&matched(0.74, EmbeddingMethod::Hybrid, 0.5), ctx).is_permitted());
        assert!(!p.decide(&matched(0.9, EmbeddingMethod::Hybrid, 0.95), ctx).is_permitted());
        let d = p.decide(&matched(0.95, EmbeddingMethod::Semantic, 0.95), ctx);
        assert!(d.is_permitted());
        assert_eq!(d.matched_identity.as_deref(), Some("alice"));
        assert_eq!(d.enrollment_id.as_deref(), Some("e1"));
    }

    #[test]
    fn test_geometric_fallback_lowers_floor() {
        let p = DecisionPolicy::default();
        for ctx in [AccessContext::Login, AccessContext::PhysicalAccess] {
            let d = p.decide(&matched(0.45, EmbeddingMethod::GeometricFallback, 0.95), ctx);
            assert!(d.is_permitted(), "{ctx}: {}", d.rationale);
            assert!(!p.decide(&matched(0.39, EmbeddingMethod::GeometricFallback, 0.95), ctx).is_permitted());
        }
    }

    #[test]
    fn test_faceless_probe_always_denied() {
        let p = DecisionPolicy::default();
        for method in [EmbeddingMethod::None, EmbeddingMethod::ErrorFallback] {
            for ctx in [AccessContext::Login, AccessContext::PhysicalAccess] {
                let d = p.decide(&MatchResult::no_match(method), ctx);
                assert_eq!(d.outcome, Outcome::Denied);
                assert!(!d.rationale.is_empty());
            }
        }
    }

    #[test]
    fn test_no_candidate_denied() {
        let d = DecisionPolicy::default().decide(&MatchResult::no_match(EmbeddingMethod::Hybrid), AccessContext::Login);
        assert_eq!(d.outcome, Outcome::Denied);
        assert!(d.rationale.contains("no enrolled face"));
    }

    #[test]
    fn test_context_parsing() {
        assert_eq!("login".parse::<AccessContext>().unwrap(), AccessContext::Login);
        assert_eq!("Physical-Access".parse::<AccessContext>().unwrap(), AccessContext::PhysicalAccess);
        assert!("elevator".parse::<AccessContext>().is_err());
    }

    #[test]
    fn test_decision_serializes_for_audit() {
        let d = DecisionPolicy::default().decide(&matched(0.8, EmbeddingMethod::Hybrid, 0.5), AccessContext::Login);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["outcome"], "permitted");
        assert_eq!(json["context"], "login");
        assert_eq!(json["method"], "hybrid");
        assert!(json["decided_at"].is_string());
    }
}
