//! Comparative statistics engine
//!
//! Computes success/efficiency/latency ratios against a baseline
//! approach, an overall-score ranking, Wilson confidence intervals,
//! an approximate significance verdict, and an advantage-validation
//! verdict for the baseline.
//!
//! All computation is pure and re-derivable from the current stored
//! state: no incremental accumulators survive between recomputations,
//! so the analysis for a key is fully deterministic given its records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::extract::{self, Extraction};
use crate::record::{DomainTierKey, TrialRecord};
use crate::store::ApproachSet;

/// Preferred baseline approach when present.
pub const BASELINE_APPROACH: &str = "mcd";

/// z for a 95% two-sided interval.
const Z_95: f64 = 1.959_964;

/// Overall-score weights.
const W_SUCCESS: f64 = 0.35;
const W_TOKEN_EFFICIENCY: f64 = 0.25;
const W_LATENCY: f64 = 0.20;
const W_ALIGNMENT: f64 = 0.15;
const W_CONSISTENCY: f64 = 0.05;

/// Standard-deviation floor for degenerate (zero-variance) samples in
/// the t approximation.
const DEGENERATE_STDDEV: f64 = 0.1;

/// Wilson score interval over an approach's success proportion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
    /// False below the configured minimum sample count
    pub reliable: bool,
}

/// Approximate significance of the mean success rate against the
/// expected-performance baseline.
///
/// The t statistic is mapped to a coarse p-value through fixed
/// thresholds; this is heuristic contracted behavior, not a certified
/// hypothesis test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Significance {
    pub t_statistic: f64,
    pub p_value: f64,
    pub significant: bool,
}

/// Per-approach comparative statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproachStats {
    pub approach: String,

    /// Extracted success rate in [0,100]
    pub success_rate: f64,
    pub success_no_data: bool,

    pub avg_latency_ms: f64,
    /// No scenario carried a usable latency signal
    pub latency_no_data: bool,
    pub avg_tokens: f64,
    /// No scenario carried a usable token signal
    pub tokens_no_data: bool,
    pub trial_count: usize,

    /// successRate / baselineSuccessRate
    pub success_ratio: f64,
    /// baselineTokens / approachTokens — higher is better (fewer tokens)
    pub token_efficiency_ratio: f64,
    /// baselineLatency / approachLatency — higher is better (faster)
    pub latency_ratio: f64,

    /// max(0, 1 − stddev(latencies)/mean(latencies)); 1.0 below 2 samples
    pub consistency: f64,
    pub overall_score: f64,

    pub confidence_interval: ConfidenceInterval,
    pub significance: Significance,
}

/// Advantage-validation verdict for the baseline approach.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvantageVerdict {
    pub baseline: String,
    /// True iff the baseline outperforms (success rate AND token
    /// efficiency, both ≥) a strict majority of the other approaches
    pub validated: bool,
    pub supporting_evidence: Vec<String>,
    pub contradicting_evidence: Vec<String>,
    pub concerns: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Derived, read-only comparative analysis for one (domain, tier) key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparativeAnalysis {
    pub key: DomainTierKey,
    pub baseline: String,
    /// Approach names, best to worst
    pub ranking: Vec<String>,
    /// Per-approach stats in ranking order
    pub approaches: Vec<ApproachStats>,
    pub advantage: AdvantageVerdict,
    pub computed_at: DateTime<Utc>,
}

/// Raw per-approach measurements before ratios are applied.
#[derive(Debug, Clone)]
struct Measurement {
    approach: String,
    success: Extraction,
    latency: Extraction,
    tokens: Extraction,
    /// Per-trial success proportions in [0,1]
    trial_success: Vec<f64>,
    /// Per-trial latencies with a usable signal
    trial_latencies: Vec<f64>,
    mcd_alignment: f64,
}

/// Analyze the competing approaches for one key.
///
/// Returns `None` until the key holds at least two comparative
/// approaches. `log` is the flat trial log; its entries for this key
/// provide the per-approach trial history.
pub fn analyze(
    key: &DomainTierKey,
    set: &ApproachSet,
    log: &[TrialRecord],
    config: &EngineConfig,
) -> Option<ComparativeAnalysis> {
    let names = set.comparative_names();
    if names.len() < 2 {
        return None;
    }

    let measurements: Vec<Measurement> = names
        .iter()
        .map(|name| measure(key, name, set, log))
        .collect();

    let baseline = select_baseline(&measurements);
    let baseline_m = measurements
        .iter()
        .find(|m| m.approach == baseline)
        .cloned()?;

    let mut stats: Vec<ApproachStats> = measurements
        .iter()
        .map(|m| score_approach(m, &baseline_m, config))
        .collect();

    // Stable sort: ties keep approach insertion order.
    stats.sort_by(|a, b| {
        b.overall_score
            .partial_cmp(&a.overall_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let ranking: Vec<String> = stats.iter().map(|s| s.approach.clone()).collect();

    let advantage = validate_advantage(&baseline, &stats);

    Some(ComparativeAnalysis {
        key: key.clone(),
        baseline,
        ranking,
        approaches: stats,
        advantage,
        computed_at: Utc::now(),
    })
}

fn measure(key: &DomainTierKey, approach: &str, set: &ApproachSet, log: &[TrialRecord]) -> Measurement {
    let trials: Vec<&TrialRecord> = log
        .iter()
        .filter(|r| r.approach == approach && &r.key() == key)
        .collect();

    let mut trial_success = Vec::with_capacity(trials.len());
    let mut trial_latencies = Vec::new();
    for trial in &trials {
        let sr = extract::success_rate(trial);
        if !sr.no_data {
            trial_success.push(sr.value / 100.0);
        }
        let lat = extract::average_latency_ms(&trial.scenarios);
        if !lat.no_data {
            trial_latencies.push(lat.value);
        }
    }

    // The latest record drives the headline numbers; history drives the
    // sample-size-sensitive statistics.
    let latest = set.get(approach);
    let (success, latency, tokens, alignment) = match latest {
        Some(record) => (
            extract::success_rate(record),
            extract::average_latency_ms(&record.scenarios),
            extract::average_tokens(&record.scenarios),
            record.domain_metrics.mcd_alignment_score,
        ),
        None => (
            Extraction::missing(),
            Extraction::missing(),
            Extraction::missing(),
            0.0,
        ),
    };

    Measurement {
        approach: approach.to_string(),
        success,
        latency,
        tokens,
        trial_success,
        trial_latencies,
        mcd_alignment: alignment,
    }
}

/// Prefer the approach literally named "mcd"; otherwise the highest
/// extracted success rate wins.
fn select_baseline(measurements: &[Measurement]) -> String {
    if let Some(m) = measurements.iter().find(|m| m.approach == BASELINE_APPROACH) {
        return m.approach.clone();
    }
    measurements
        .iter()
        .max_by(|a, b| {
            a.success
                .value
                .partial_cmp(&b.success.value)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|m| m.approach.clone())
        .unwrap_or_default()
}

fn score_approach(m: &Measurement, baseline: &Measurement, config: &EngineConfig) -> ApproachStats {
    let success_ratio = if baseline.success.value > 0.0 {
        m.success.value / baseline.success.value
    } else if m.success.value > 0.0 {
        // Approach succeeded where the baseline scored exactly zero.
        2.0
    } else {
        1.0
    };

    let token_efficiency_ratio = guarded_ratio(baseline.tokens, m.tokens);
    let latency_ratio = guarded_ratio(baseline.latency, m.latency);

    let consistency = consistency(&m.trial_latencies);

    let overall_score = W_SUCCESS * m.success.value / 100.0
        + W_TOKEN_EFFICIENCY * token_efficiency_ratio
        + W_LATENCY * latency_ratio
        + W_ALIGNMENT * m.mcd_alignment
        + W_CONSISTENCY * consistency;

    let n = m.trial_success.len();
    let p_hat = if n > 0 {
        m.trial_success.iter().sum::<f64>() / n as f64
    } else {
        m.success.value / 100.0
    };
    let (lower, upper) = wilson_interval(p_hat, n.max(1));
    let confidence_interval = ConfidenceInterval {
        lower,
        upper,
        level: 0.95,
        reliable: n >= config.min_reliable_samples,
    };

    let significance = significance(&m.trial_success, config.expected_success_rate);

    ApproachStats {
        approach: m.approach.clone(),
        success_rate: m.success.value,
        success_no_data: m.success.no_data,
        avg_latency_ms: m.latency.value,
        latency_no_data: m.latency.no_data,
        avg_tokens: m.tokens.value,
        tokens_no_data: m.tokens.no_data,
        trial_count: n,
        success_ratio,
        token_efficiency_ratio,
        latency_ratio,
        consistency,
        overall_score,
        confidence_interval,
        significance,
    }
}

/// baseline / approach with neutral fallbacks: when either side has no
/// signal, or the approach measured zero, the ratio is 1.0 rather than
/// an artifact of division.
fn guarded_ratio(baseline: Extraction, approach: Extraction) -> f64 {
    if baseline.no_data || approach.no_data || approach.value <= 0.0 {
        1.0
    } else {
        baseline.value / approach.value
    }
}

/// Latency consistency score; defaults to 1.0 with fewer than 2 samples.
fn consistency(latencies: &[f64]) -> f64 {
    if latencies.len() < 2 {
        return 1.0;
    }
    let mean = latencies.iter().sum::<f64>() / latencies.len() as f64;
    if mean <= 0.0 {
        return 1.0;
    }
    let variance = latencies.iter().map(|l| (l - mean).powi(2)).sum::<f64>()
        / (latencies.len() - 1) as f64;
    (1.0 - variance.sqrt() / mean).max(0.0)
}

/// Wilson score interval for a binomial proportion at 95% confidence.
///
/// More stable than the naive normal approximation at the small sample
/// sizes this engine sees.
pub fn wilson_interval(p: f64, n: usize) -> (f64, f64) {
    if n == 0 {
        return (0.0, 1.0);
    }
    let p = p.clamp(0.0, 1.0);
    let n = n as f64;
    let z2 = Z_95 * Z_95;
    let denom = 1.0 + z2 / n;
    let center = p + z2 / (2.0 * n);
    let margin = Z_95 * ((p * (1.0 - p) + z2 / (4.0 * n)) / n).sqrt();
    (
        ((center - margin) / denom).max(0.0),
        ((center + margin) / denom).min(1.0),
    )
}

/// Approximate t statistic of the mean success proportion against the
/// expected baseline, mapped to a coarse p-value.
fn significance(trial_success: &[f64], expected: f64) -> Significance {
    let n = trial_success.len();
    if n < 2 {
        return Significance {
            t_statistic: 0.0,
            p_value: 0.2,
            significant: false,
        };
    }

    let nf = n as f64;
    let mean = trial_success.iter().sum::<f64>() / nf;
    let variance = trial_success.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (nf - 1.0);
    let std_dev = variance.sqrt().max(DEGENERATE_STDDEV);

    let t = (mean - expected) / (std_dev / nf.sqrt());
    let p_value = coarse_p_value(t);

    Significance {
        t_statistic: t,
        p_value,
        significant: p_value < 0.05,
    }
}

/// Fixed threshold mapping: t>3 → 0.01, t>2 → 0.05, t>1.5 → 0.1, else 0.2.
fn coarse_p_value(t: f64) -> f64 {
    let t = t.abs();
    if t > 3.0 {
        0.01
    } else if t > 2.0 {
        0.05
    } else if t > 1.5 {
        0.1
    } else {
        0.2
    }
}

/// MCD-style advantage validation for the baseline approach.
fn validate_advantage(baseline: &str, stats: &[ApproachStats]) -> AdvantageVerdict {
    let baseline_stats = stats.iter().find(|s| s.approach == baseline);
    let others: Vec<&ApproachStats> = stats.iter().filter(|s| s.approach != baseline).collect();

    let mut supporting = Vec::new();
    let mut contradicting = Vec::new();
    let mut outperformed = 0usize;

    if let Some(base) = baseline_stats {
        for other in &others {
            let wins_success = base.success_rate >= other.success_rate;
            // Fewer tokens is better. A missing token signal on either
            // side is not a zero: the comparison degrades to equal.
            let tokens_comparable = !base.tokens_no_data && !other.tokens_no_data;
            let wins_efficiency = !tokens_comparable || base.avg_tokens <= other.avg_tokens;

            if wins_success && wins_efficiency {
                outperformed += 1;
                if tokens_comparable {
                    supporting.push(format!(
                        "{} matches or beats {} on success rate ({:.1}% vs {:.1}%) and token cost ({:.0} vs {:.0})",
                        baseline,
                        other.approach,
                        base.success_rate,
                        other.success_rate,
                        base.avg_tokens,
                        other.avg_tokens,
                    ));
                } else {
                    supporting.push(format!(
                        "{} matches or beats {} on success rate ({:.1}% vs {:.1}%); token cost not comparable",
                        baseline, other.approach, base.success_rate, other.success_rate,
                    ));
                }
            } else if !wins_success {
                contradicting.push(format!(
                    "{} trails {} on success rate ({:.1}% vs {:.1}%)",
                    baseline, other.approach, base.success_rate, other.success_rate,
                ));
            } else {
                contradicting.push(format!(
                    "{} spends more tokens than {} ({:.0} vs {:.0})",
                    baseline, other.approach, base.avg_tokens, other.avg_tokens,
                ));
            }
        }
    }

    let validated = !others.is_empty() && outperformed * 2 > others.len();

    let mut concerns = Vec::new();
    let mut recommendations = Vec::new();
    if !validated {
        concerns.push(format!(
            "baseline '{}' outperforms only {}/{} alternative approaches",
            baseline,
            outperformed,
            others.len()
        ));
        if let Some(base) = baseline_stats {
            if !base.confidence_interval.reliable {
                concerns.push(format!(
                    "only {} trials for '{}'; confidence interval is unreliable",
                    base.trial_count, baseline
                ));
                recommendations
                    .push("Collect more trials per approach before drawing conclusions".to_string());
            }
        }
        recommendations.push(format!(
            "Review the '{}' configuration for the combinations where it trails",
            baseline
        ));
    }

    AdvantageVerdict {
        baseline: baseline.to_string(),
        validated,
        supporting_evidence: supporting,
        contradicting_evidence: contradicting,
        concerns,
        recommendations,
    }
}
