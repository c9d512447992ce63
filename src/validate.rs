//! Result validation and sanitization
//!
//! Enforces the identity fields, clamps out-of-range metric values, and
//! fabricates safe defaults when a record arrives without a metrics
//! object. A record is only ever rejected for missing identity; missing
//! metrics are recovered and flagged as minimal-data instead.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::record::{DomainMetrics, RawTrialEvent, TrialRecord, DEFAULT_APPROACH};

/// Validate an inbound event into a sanitized trial record.
///
/// Rejects only when `domain`, `tier`, or `walkthroughId` is absent or
/// empty. Sanitization is a fixed point: re-validating an already
/// sanitized record leaves its sanitized fields unchanged.
pub fn validate(event: RawTrialEvent) -> Result<TrialRecord, IngestError> {
    let domain = require(event.domain, "domain")?;
    let tier = require(event.tier, "tier")?;
    let walkthrough_id = require(event.walkthrough_id, "walkthroughId")?;

    let approach = event
        .approach
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_APPROACH.to_string());

    let (domain_metrics, minimal_data) = match &event.domain_metrics {
        Some(raw) if raw.is_object() => (sanitize_metrics(raw, &walkthrough_id), false),
        _ => {
            debug!(
                walkthrough_id = %walkthrough_id,
                "no metrics object on record, synthesizing defaults"
            );
            (DomainMetrics::default(), true)
        }
    };

    Ok(TrialRecord {
        domain,
        tier,
        walkthrough_id,
        approach,
        domain_metrics,
        scenarios: event.scenario_results,
        minimal_data,
        ingested_at: Utc::now(),
        seq: 0,
    })
}

fn require(field: Option<String>, name: &'static str) -> Result<String, IngestError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(IngestError::MalformedRecord { field: name }),
    }
}

/// Sanitize a raw metrics object into well-typed metrics.
pub fn sanitize_metrics(raw: &Value, walkthrough_id: &str) -> DomainMetrics {
    let score = |name: &str| {
        raw.get(name)
            .and_then(Value::as_f64)
            .map(|v| clamp_score(name, v, walkthrough_id))
            .unwrap_or(0.0)
    };

    DomainMetrics {
        overall_success: raw.get("overallSuccess").map(truthy).unwrap_or(false),
        mcd_alignment_score: score("mcdAlignmentScore"),
        user_experience_score: score("userExperienceScore"),
        resource_efficiency: score("resourceEfficiency"),
        fallback_triggered: raw.get("fallbackTriggered").map(truthy).unwrap_or(false),
    }
}

/// Clamp a percentage-like score into [0,1].
///
/// Values in (1, 100] are treated as percentages and divided down;
/// values beyond 100 are clamped to 1.0 and logged as corrupt.
fn clamp_score(name: &str, value: f64, walkthrough_id: &str) -> f64 {
    if !value.is_finite() || value < 0.0 {
        0.0
    } else if value > 100.0 {
        warn!(
            walkthrough_id = %walkthrough_id,
            score = name,
            value,
            "score above 100, clamping to 1.0"
        );
        1.0
    } else if value > 1.0 {
        value / 100.0
    } else {
        value
    }
}

/// JS-style truthiness coercion for boolean-ish JSON values.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => {
            let s = s.trim();
            !s.is_empty() && !s.eq_ignore_ascii_case("false") && s != "0"
        }
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(domain: Option<&str>, tier: Option<&str>, id: Option<&str>) -> RawTrialEvent {
        RawTrialEvent {
            domain: domain.map(str::to_string),
            tier: tier.map(str::to_string),
            walkthrough_id: id.map(str::to_string),
            ..RawTrialEvent::default()
        }
    }

    #[test]
    fn test_rejects_missing_domain() {
        let err = validate(event(None, Some("Q1"), Some("w-1"))).unwrap_err();
        assert_eq!(err, IngestError::MalformedRecord { field: "domain" });
    }

    #[test]
    fn test_rejects_blank_tier() {
        let err = validate(event(Some("nav"), Some("   "), Some("w-1"))).unwrap_err();
        assert_eq!(err, IngestError::MalformedRecord { field: "tier" });
    }

    #[test]
    fn test_missing_metrics_synthesizes_defaults() {
        let record = validate(event(Some("nav"), Some("Q1"), Some("w-1"))).unwrap();
        assert!(record.minimal_data);
        assert!(!record.domain_metrics.overall_success);
        assert!(record.domain_metrics.fallback_triggered);
        assert_eq!(record.domain_metrics.mcd_alignment_score, 0.0);
    }

    #[test]
    fn test_missing_approach_defaults() {
        let record = validate(event(Some("nav"), Some("Q1"), Some("w-1"))).unwrap();
        assert_eq!(record.approach, DEFAULT_APPROACH);
        assert!(!record.is_comparative());
    }

    #[test]
    fn test_score_clamping_rules() {
        let raw = json!({
            "overallSuccess": true,
            "mcdAlignmentScore": 85.0,
            "userExperienceScore": 150.0,
            "resourceEfficiency": -0.3
        });
        let metrics = sanitize_metrics(&raw, "w-1");
        assert!((metrics.mcd_alignment_score - 0.85).abs() < 1e-9);
        assert_eq!(metrics.user_experience_score, 1.0);
        assert_eq!(metrics.resource_efficiency, 0.0);
    }

    #[test]
    fn test_score_in_unit_range_is_untouched() {
        let raw = json!({ "mcdAlignmentScore": 0.72 });
        let metrics = sanitize_metrics(&raw, "w-1");
        assert_eq!(metrics.mcd_alignment_score, 0.72);
        // Exactly 1.0 is a valid unit score, not a percentage.
        let raw = json!({ "mcdAlignmentScore": 1.0 });
        assert_eq!(sanitize_metrics(&raw, "w-1").mcd_alignment_score, 1.0);
    }

    #[test]
    fn test_boolean_coercion() {
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!(1)));
        assert!(truthy(&json!("yes")));
        assert!(truthy(&json!({"a": 1})));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("false")));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!(null)));
    }

    #[test]
    fn test_sanitization_is_a_fixed_point() {
        let raw = json!({
            "overallSuccess": 1,
            "mcdAlignmentScore": 92.0,
            "userExperienceScore": 0.4,
            "resourceEfficiency": 7.0,
            "fallbackTriggered": "no-but-present"
        });
        let first = sanitize_metrics(&raw, "w-1");
        let reserialized = serde_json::to_value(&first).unwrap();
        let second = sanitize_metrics(&reserialized, "w-1");
        assert_eq!(first, second);
    }

    #[test]
    fn test_full_metrics_record_not_minimal() {
        let mut e = event(Some("nav"), Some("Q1"), Some("w-1"));
        e.domain_metrics = Some(json!({ "overallSuccess": true }));
        let record = validate(e).unwrap();
        assert!(!record.minimal_data);
        assert!(record.domain_metrics.overall_success);
        assert!(!record.domain_metrics.fallback_triggered);
    }
}
