//! Data model for benchmark trial results
//!
//! Provides Rust data structures for the JSON events emitted by the
//! evaluation harness. The wire shape is heterogeneous: only the identity
//! fields (`domain`, `tier`, `walkthroughId`) are guaranteed after
//! validation, everything else is carried as raw JSON for the extractor.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Approach label used when the harness runs without competing approaches.
pub const DEFAULT_APPROACH: &str = "default";

/// Inbound trial event as emitted by the evaluation harness.
///
/// Every field is optional on the wire; the validator decides what is
/// required. Unknown fields are preserved in `extra` so nothing the
/// harness sends is silently lost before extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawTrialEvent {
    /// Task category (e.g. appointment booking, spatial navigation)
    pub domain: Option<String>,

    /// Capability/resource level the model ran at (e.g. Q1/Q4/Q8)
    pub tier: Option<String>,

    /// Unique id per execution attempt
    pub walkthrough_id: Option<String>,

    /// Named prompting strategy; absent or "default" means single-approach mode
    pub approach: Option<String>,

    /// Per-scenario result payloads, shape not guaranteed
    pub scenario_results: Vec<Value>,

    /// Declared aggregate metrics, shape not guaranteed
    pub domain_metrics: Option<Value>,

    /// Harness-side timestamp, if any
    pub timestamp: Option<Value>,

    /// Anything else the harness attached
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl RawTrialEvent {
    /// Lenient construction from an arbitrary JSON value.
    ///
    /// Identity fields are probed with `as_str` so a numeric `domain` is
    /// treated as absent (and later rejected) rather than failing
    /// deserialization of the whole event.
    pub fn from_value(value: Value) -> Self {
        let obj = match value {
            Value::Object(map) => map,
            _ => return Self::default(),
        };

        let string_field = |map: &serde_json::Map<String, Value>, key: &str| {
            map.get(key).and_then(Value::as_str).map(str::to_string)
        };

        let scenario_results = obj
            .get("scenarioResults")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Self {
            domain: string_field(&obj, "domain"),
            tier: string_field(&obj, "tier"),
            walkthrough_id: string_field(&obj, "walkthroughId"),
            approach: string_field(&obj, "approach"),
            scenario_results,
            domain_metrics: obj.get("domainMetrics").cloned(),
            timestamp: obj.get("timestamp").cloned(),
            extra: obj
                .into_iter()
                .filter(|(k, _)| {
                    !matches!(
                        k.as_str(),
                        "domain"
                            | "tier"
                            | "walkthroughId"
                            | "approach"
                            | "scenarioResults"
                            | "domainMetrics"
                            | "timestamp"
                    )
                })
                .collect(),
        }
    }
}

/// Sanitized aggregate metrics attached to every stored record.
///
/// Scores are clamped to [0,1] at validation time; booleans are coerced
/// via truthiness, never left as non-boolean JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainMetrics {
    pub overall_success: bool,
    pub mcd_alignment_score: f64,
    pub user_experience_score: f64,
    pub resource_efficiency: f64,
    pub fallback_triggered: bool,
}

impl Default for DomainMetrics {
    /// The synthesized defaults used when a record arrives without a
    /// metrics object: nothing succeeded, all scores zero, and the
    /// fallback marker set so downstream consumers can tell.
    fn default() -> Self {
        Self {
            overall_success: false,
            mcd_alignment_score: 0.0,
            user_experience_score: 0.0,
            resource_efficiency: 0.0,
            fallback_triggered: true,
        }
    }
}

/// Composite key grouping competing approaches for the same task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomainTierKey {
    pub domain: String,
    pub tier: String,
}

impl DomainTierKey {
    pub fn new(domain: impl Into<String>, tier: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            tier: tier.into(),
        }
    }
}

impl fmt::Display for DomainTierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.domain, self.tier)
    }
}

/// A validated, sanitized trial result.
///
/// Immutable once stored; the only in-place mutation ever performed is
/// the one-time metric sanitization at validation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRecord {
    pub domain: String,
    pub tier: String,
    pub walkthrough_id: String,
    pub approach: String,
    pub domain_metrics: DomainMetrics,

    /// Raw scenario payloads retained for metric extraction
    pub scenarios: Vec<Value>,

    /// True when the metrics object was synthesized from defaults
    pub minimal_data: bool,

    pub ingested_at: DateTime<Utc>,

    /// Monotone sequence number assigned by the store at insertion
    pub seq: u64,
}

impl TrialRecord {
    pub fn key(&self) -> DomainTierKey {
        DomainTierKey::new(self.domain.clone(), self.tier.clone())
    }

    /// Whether this record participates in comparative analysis.
    pub fn is_comparative(&self) -> bool {
        self.approach != DEFAULT_APPROACH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_display() {
        let key = DomainTierKey::new("navigation", "Q4");
        assert_eq!(key.to_string(), "navigation::Q4");
    }

    #[test]
    fn test_from_value_lenient_identity() {
        let event = RawTrialEvent::from_value(json!({
            "domain": "booking",
            "tier": "Q1",
            "walkthroughId": "w-1",
            "scenarioResults": [{"success": true}],
            "unknownField": 42
        }));

        assert_eq!(event.domain.as_deref(), Some("booking"));
        assert_eq!(event.tier.as_deref(), Some("Q1"));
        assert_eq!(event.scenario_results.len(), 1);
        assert!(event.extra.contains_key("unknownField"));
    }

    #[test]
    fn test_from_value_non_string_identity_is_absent() {
        let event = RawTrialEvent::from_value(json!({
            "domain": 42,
            "tier": "Q1",
            "walkthroughId": "w-1"
        }));

        assert!(event.domain.is_none());
        assert_eq!(event.tier.as_deref(), Some("Q1"));
    }

    #[test]
    fn test_from_value_non_object() {
        let event = RawTrialEvent::from_value(json!("not an object"));
        assert!(event.domain.is_none());
        assert!(event.scenario_results.is_empty());
    }

    #[test]
    fn test_default_metrics_are_flagged() {
        let metrics = DomainMetrics::default();
        assert!(!metrics.overall_success);
        assert!(metrics.fallback_triggered);
        assert_eq!(metrics.mcd_alignment_score, 0.0);
    }
}
