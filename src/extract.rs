//! Metric extraction from heterogeneous scenario payloads
//!
//! Pure functions that pull success/latency/token signals out of result
//! records whose shape is not guaranteed. Each extractor is a fallback
//! chain evaluated in fixed priority order, stopping at the first
//! strategy that yields a usable signal:
//!
//! 1. explicit trial-level success flags or status enums
//! 2. lexical verdict on a free-text response (negative patterns reject,
//!    domain vocabulary accepts, with a minimum-length heuristic)
//! 3. nested sub-structures (`trial`, `executionResult`, `actualResults`)
//! 4. declared aggregate metrics as last resort
//!
//! "No strategy produced a value" is tracked via a side channel on
//! [`Extraction`], never encoded as a numeric zero.

use chrono::DateTime;
use serde_json::Value;

use crate::record::TrialRecord;

/// Latencies at or above 5 minutes are treated as corrupt, not averaged in.
pub const MAX_SANE_LATENCY_MS: f64 = 300_000.0;

/// Token counts at or above this are treated as corrupt.
pub const MAX_SANE_TOKENS: f64 = 10_000.0;

/// Sub-structures probed when a scenario carries its signal one level down.
const NESTED_CONTAINERS: [&str; 3] = ["trial", "executionResult", "actualResults"];

const NEGATIVE_PATTERNS: [&str; 7] = [
    "error:",
    "cannot",
    "unable to",
    "failed to",
    "not possible",
    "i'm sorry",
    "no data",
];

/// Minimum size before free text counts as a real answer.
const MIN_ANSWER_CHARS: usize = 20;
const MIN_ANSWER_WORDS: usize = 4;

/// An extracted metric with its "no data" side channel.
///
/// `value == 0.0` with `no_data == false` is a legitimate zero;
/// `no_data == true` means no strategy found any signal.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Extraction {
    pub value: f64,
    pub no_data: bool,
}

impl Extraction {
    pub fn found(value: f64) -> Self {
        Self {
            value,
            no_data: false,
        }
    }

    pub fn missing() -> Self {
        Self {
            value: 0.0,
            no_data: true,
        }
    }
}

/// Extract a success rate in [0,100] for a record.
///
/// Per-scenario verdicts are resolved through the fallback chain; the
/// rate is the fraction of scenarios judged successful. When no scenario
/// yields a verdict the declared aggregate metrics are consulted.
/// Deterministic: repeated calls on the same record return equal values.
pub fn success_rate(record: &TrialRecord) -> Extraction {
    let verdicts: Vec<bool> = record
        .scenarios
        .iter()
        .filter_map(|s| scenario_verdict(s, &record.domain))
        .collect();

    if !verdicts.is_empty() {
        let successes = verdicts.iter().filter(|v| **v).count();
        return Extraction::found(successes as f64 / verdicts.len() as f64 * 100.0);
    }

    aggregate_verdict(record)
}

/// Average scenario latency in milliseconds, ignoring corrupt values.
pub fn average_latency_ms(scenarios: &[Value]) -> Extraction {
    average(scenarios, scenario_latency_ms, MAX_SANE_LATENCY_MS)
}

/// Average scenario token count, ignoring corrupt values.
pub fn average_tokens(scenarios: &[Value]) -> Extraction {
    average(scenarios, scenario_tokens, MAX_SANE_TOKENS)
}

fn average(scenarios: &[Value], extract: fn(&Value) -> Option<f64>, cap: f64) -> Extraction {
    let values: Vec<f64> = scenarios
        .iter()
        .filter_map(extract)
        .filter(|v| *v >= 0.0 && *v < cap)
        .collect();

    if values.is_empty() {
        Extraction::missing()
    } else {
        Extraction::found(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// First-success-wins verdict chain for one scenario payload.
fn scenario_verdict(scenario: &Value, domain: &str) -> Option<bool> {
    explicit_flag(scenario)
        .or_else(|| lexical_verdict(scenario, domain))
        .or_else(|| nested_verdict(scenario, domain))
}

/// Strategy 1: explicit success/failure flags or status enums.
fn explicit_flag(scenario: &Value) -> Option<bool> {
    for key in ["success", "passed", "succeeded"] {
        if let Some(flag) = scenario.get(key).and_then(Value::as_bool) {
            return Some(flag);
        }
    }
    if let Some(status) = scenario.get("status").and_then(Value::as_str) {
        return match status.to_ascii_lowercase().as_str() {
            "success" | "passed" | "ok" | "completed" => Some(true),
            "failure" | "failed" | "error" | "timeout" | "rejected" => Some(false),
            _ => None,
        };
    }
    None
}

/// Strategy 2: lexical pattern match against the free-text response.
fn lexical_verdict(scenario: &Value, domain: &str) -> Option<bool> {
    let text = response_text(scenario)?;
    let lower = text.to_lowercase();

    if NEGATIVE_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(false);
    }

    let looks_real = text.len() >= MIN_ANSWER_CHARS
        && text.split_whitespace().count() >= MIN_ANSWER_WORDS;
    if looks_real && domain_vocabulary(domain).iter().any(|p| lower.contains(p)) {
        return Some(true);
    }

    None
}

/// Strategy 3: probe nested sub-structures for the same field names.
fn nested_verdict(scenario: &Value, domain: &str) -> Option<bool> {
    NESTED_CONTAINERS
        .iter()
        .filter_map(|key| scenario.get(key))
        .find_map(|inner| explicit_flag(inner).or_else(|| lexical_verdict(inner, domain)))
}

/// Strategy 4: declared aggregate metrics as last resort.
fn aggregate_verdict(record: &TrialRecord) -> Extraction {
    // Synthesized metrics carry no real signal.
    if record.minimal_data {
        return Extraction::missing();
    }
    if record.domain_metrics.overall_success {
        Extraction::found(100.0)
    } else if record.domain_metrics.user_experience_score > 0.0 {
        // 0-1 user experience score as a success-rate proxy
        Extraction::found(record.domain_metrics.user_experience_score * 100.0)
    } else {
        Extraction::found(0.0)
    }
}

fn response_text(scenario: &Value) -> Option<&str> {
    ["response", "output", "text", "answer"]
        .iter()
        .find_map(|key| scenario.get(*key).and_then(Value::as_str))
}

/// Positive vocabulary per task domain. Matching is substring-based so
/// "diagnos" covers diagnose/diagnosis/diagnostic.
fn domain_vocabulary(domain: &str) -> &'static [&'static str] {
    let lower = domain.to_lowercase();
    if lower.contains("book") || lower.contains("appointment") || lower.contains("schedul") {
        &["booked", "confirmed", "scheduled", "appointment", "reserved"]
    } else if lower.contains("nav") || lower.contains("spatial") || lower.contains("route") {
        &["turn", "head", "route", "arrive", "landmark", "north", "left", "right"]
    } else if lower.contains("diag") || lower.contains("fail") || lower.contains("incident") {
        &["diagnos", "inspect", "replace", "cause", "symptom", "resolved"]
    } else {
        &["completed", "done", "here is", "result"]
    }
}

fn scenario_latency_ms(scenario: &Value) -> Option<f64> {
    direct_latency(scenario)
        .or_else(|| {
            NESTED_CONTAINERS
                .iter()
                .filter_map(|key| scenario.get(key))
                .find_map(direct_latency)
        })
        .or_else(|| timestamp_span_ms(scenario))
}

fn direct_latency(value: &Value) -> Option<f64> {
    [
        "latencyMs",
        "latency",
        "durationMs",
        "duration",
        "responseTimeMs",
        "elapsedMs",
    ]
    .iter()
    .find_map(|key| value.get(*key).and_then(numeric_value))
}

fn scenario_tokens(scenario: &Value) -> Option<f64> {
    direct_tokens(scenario).or_else(|| {
        NESTED_CONTAINERS
            .iter()
            .filter_map(|key| scenario.get(key))
            .find_map(direct_tokens)
    })
}

fn direct_tokens(value: &Value) -> Option<f64> {
    ["tokens", "tokenCount", "tokensUsed", "totalTokens"]
        .iter()
        .find_map(|key| value.get(*key).and_then(numeric_value))
}

/// Derive latency from a start/end timestamp pair when no explicit
/// duration exists.
fn timestamp_span_ms(scenario: &Value) -> Option<f64> {
    let start = scenario.get("startTime").and_then(timestamp_ms)?;
    let end = scenario.get("endTime").and_then(timestamp_ms)?;
    let span = end - start;
    (span >= 0.0).then_some(span)
}

fn timestamp_ms(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis() as f64),
        _ => None,
    }
}

/// Accept numbers and string-encoded numbers like "350ms".
fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric_string(s),
        _ => None,
    }
}

fn parse_numeric_string(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let end = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(trimmed.len());
    if end == 0 {
        return None;
    }
    trimmed[..end].parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DomainMetrics, TrialRecord};
    use chrono::Utc;
    use serde_json::json;

    fn record(domain: &str, scenarios: Vec<Value>) -> TrialRecord {
        TrialRecord {
            domain: domain.to_string(),
            tier: "Q1".to_string(),
            walkthrough_id: "w-1".to_string(),
            approach: "mcd".to_string(),
            domain_metrics: DomainMetrics::default(),
            scenarios,
            minimal_data: true,
            ingested_at: Utc::now(),
            seq: 0,
        }
    }

    #[test]
    fn test_explicit_flags_win() {
        let rec = record(
            "navigation",
            vec![json!({"success": true}), json!({"success": false})],
        );
        let extraction = success_rate(&rec);
        assert!(!extraction.no_data);
        assert_eq!(extraction.value, 50.0);
    }

    #[test]
    fn test_status_enum_verdict() {
        let rec = record(
            "navigation",
            vec![json!({"status": "passed"}), json!({"status": "TIMEOUT"})],
        );
        assert_eq!(success_rate(&rec).value, 50.0);
    }

    #[test]
    fn test_negative_pattern_rejects() {
        let rec = record(
            "navigation",
            vec![json!({"response": "Error: cannot compute a route to the destination"})],
        );
        assert_eq!(success_rate(&rec).value, 0.0);
        assert!(!success_rate(&rec).no_data);
    }

    #[test]
    fn test_domain_vocabulary_accepts_real_answer() {
        let rec = record(
            "spatial-navigation",
            vec![json!({
                "response": "Head north on Main Street, then turn left at the landmark and arrive at the plaza."
            })],
        );
        assert_eq!(success_rate(&rec).value, 100.0);
    }

    #[test]
    fn test_short_answer_yields_no_verdict() {
        // Positive vocabulary but below the minimum-length heuristic.
        let rec = record("navigation", vec![json!({"response": "turn left"})]);
        assert!(success_rate(&rec).no_data);
    }

    #[test]
    fn test_nested_structures_probed() {
        let rec = record(
            "booking",
            vec![json!({"executionResult": {"success": true}})],
        );
        assert_eq!(success_rate(&rec).value, 100.0);
    }

    #[test]
    fn test_aggregate_metrics_last_resort() {
        let mut rec = record("booking", vec![]);
        rec.minimal_data = false;
        rec.domain_metrics.overall_success = true;
        assert_eq!(success_rate(&rec).value, 100.0);

        rec.domain_metrics.overall_success = false;
        rec.domain_metrics.user_experience_score = 0.6;
        assert!((success_rate(&rec).value - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_minimal_data_record_has_no_signal() {
        let rec = record("booking", vec![]);
        let extraction = success_rate(&rec);
        assert!(extraction.no_data);
        assert_eq!(extraction.value, 0.0);
    }

    #[test]
    fn test_extraction_determinism() {
        let rec = record(
            "booking",
            vec![json!({"response": "Your appointment is booked and confirmed for Tuesday at 10am."})],
        );
        let first = success_rate(&rec);
        for _ in 0..5 {
            assert_eq!(success_rate(&rec), first);
        }
    }

    #[test]
    fn test_latency_from_string_value() {
        let scenarios = vec![json!({"latency": "350ms"}), json!({"latencyMs": 250})];
        let extraction = average_latency_ms(&scenarios);
        assert_eq!(extraction.value, 300.0);
    }

    #[test]
    fn test_latency_from_timestamp_pair() {
        let scenarios = vec![json!({"startTime": 1000, "endTime": 1400})];
        assert_eq!(average_latency_ms(&scenarios).value, 400.0);
    }

    #[test]
    fn test_latency_from_rfc3339_pair() {
        let scenarios = vec![json!({
            "startTime": "2026-08-28T10:00:00Z",
            "endTime": "2026-08-28T10:00:01.500Z"
        })];
        assert_eq!(average_latency_ms(&scenarios).value, 1500.0);
    }

    #[test]
    fn test_insane_values_discarded() {
        // One corrupt latency must not drag down the average.
        let scenarios = vec![json!({"latencyMs": 400}), json!({"latencyMs": 900_000})];
        assert_eq!(average_latency_ms(&scenarios).value, 400.0);

        let scenarios = vec![json!({"tokens": 50}), json!({"tokens": 12_000})];
        assert_eq!(average_tokens(&scenarios).value, 50.0);
    }

    #[test]
    fn test_all_values_corrupt_is_no_data() {
        let scenarios = vec![json!({"latencyMs": 900_000})];
        assert!(average_latency_ms(&scenarios).no_data);
    }

    #[test]
    fn test_tokens_nested_and_string() {
        let scenarios = vec![
            json!({"trial": {"tokenCount": "90"}}),
            json!({"tokensUsed": 30}),
        ];
        assert_eq!(average_tokens(&scenarios).value, 60.0);
    }

    #[test]
    fn test_no_token_signal_is_missing() {
        let scenarios = vec![json!({"response": "hello"})];
        let extraction = average_tokens(&scenarios);
        assert!(extraction.no_data);
        assert_eq!(extraction.value, 0.0);
    }
}
