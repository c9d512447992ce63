//! Comparative-statistics tests through the engine API: baseline
//! selection, ranking, advantage validation, interval reliability, and
//! single-approach behavior.

use std::sync::Arc;

use serde_json::json;
use verdict::{BenchEngine, DomainTierKey, EngineConfig, NoopSink, RawTrialEvent};

fn fast_config() -> EngineConfig {
    EngineConfig {
        debounce_ms: 5,
        inter_item_delay_ms: 0,
        resume_grace_ms: 5,
        ..EngineConfig::default()
    }
}

fn trial(
    approach: &str,
    id: &str,
    success: bool,
    latency_ms: u64,
    tokens: u64,
) -> RawTrialEvent {
    RawTrialEvent::from_value(json!({
        "domain": "booking",
        "tier": "Q4",
        "walkthroughId": id,
        "approach": approach,
        "domainMetrics": {
            "overallSuccess": success,
            "mcdAlignmentScore": 0.8,
        },
        "scenarioResults": [
            {"success": success, "latencyMs": latency_ms, "tokens": tokens},
        ],
    }))
}

fn key() -> DomainTierKey {
    DomainTierKey::new("booking", "Q4")
}

#[tokio::test]
async fn mcd_baseline_is_validated_when_it_outperforms() {
    let engine = BenchEngine::spawn(fast_config(), Arc::new(NoopSink));

    for i in 0..3 {
        engine
            .ingest(trial("mcd", &format!("m-{i}"), true, 300, 50))
            .unwrap();
    }
    engine.ingest(trial("few-shot", "f-0", true, 500, 120)).unwrap();
    engine.ingest(trial("few-shot", "f-1", false, 500, 120)).unwrap();
    engine.ingest(trial("few-shot", "f-2", false, 500, 120)).unwrap();
    engine.drained().await;

    let analysis = engine.comparative_analysis(&key()).unwrap();
    assert_eq!(analysis.baseline, "mcd");
    assert_eq!(analysis.ranking[0], "mcd");
    assert!(analysis.advantage.validated);
    assert!(!analysis.advantage.supporting_evidence.is_empty());
    assert!(analysis.advantage.contradicting_evidence.is_empty());

    let mcd = analysis
        .approaches
        .iter()
        .find(|s| s.approach == "mcd")
        .unwrap();
    assert_eq!(mcd.success_rate, 100.0);
    assert_eq!(mcd.trial_count, 3);
    assert_eq!(mcd.success_ratio, 1.0);
}

#[tokio::test]
async fn better_challenger_outranks_but_mcd_stays_baseline() {
    let engine = BenchEngine::spawn(fast_config(), Arc::new(NoopSink));

    engine.ingest(trial("mcd", "m-0", false, 300, 50)).unwrap();
    engine.ingest(trial("mcd", "m-1", false, 300, 50)).unwrap();
    engine.ingest(trial("few-shot", "f-0", true, 300, 50)).unwrap();
    engine.ingest(trial("few-shot", "f-1", true, 300, 50)).unwrap();
    engine.drained().await;

    let analysis = engine.comparative_analysis(&key()).unwrap();
    // Baseline preference is by name, not by performance.
    assert_eq!(analysis.baseline, "mcd");
    assert_eq!(analysis.ranking[0], "few-shot");
    assert!(!analysis.advantage.validated);
    assert!(!analysis.advantage.contradicting_evidence.is_empty());
    assert!(!analysis.advantage.concerns.is_empty());
    assert!(!analysis.advantage.recommendations.is_empty());

    // Succeeding against a zero-success baseline maps to the capped ratio.
    let challenger = analysis
        .approaches
        .iter()
        .find(|s| s.approach == "few-shot")
        .unwrap();
    assert_eq!(challenger.success_ratio, 2.0);
}

#[tokio::test]
async fn intervals_unreliable_below_minimum_samples() {
    let engine = BenchEngine::spawn(fast_config(), Arc::new(NoopSink));

    for i in 0..12 {
        engine
            .ingest(trial("mcd", &format!("m-{i}"), i % 4 != 0, 300, 50))
            .unwrap();
    }
    engine.ingest(trial("few-shot", "f-0", true, 300, 50)).unwrap();
    engine.ingest(trial("few-shot", "f-1", true, 300, 50)).unwrap();
    engine.drained().await;

    let analysis = engine.comparative_analysis(&key()).unwrap();
    let mcd = analysis
        .approaches
        .iter()
        .find(|s| s.approach == "mcd")
        .unwrap();
    let few_shot = analysis
        .approaches
        .iter()
        .find(|s| s.approach == "few-shot")
        .unwrap();

    assert!(mcd.confidence_interval.reliable);
    assert!(!few_shot.confidence_interval.reliable);

    for stats in [mcd, few_shot] {
        let ci = stats.confidence_interval;
        assert!(ci.lower >= 0.0 && ci.upper <= 1.0);
        assert!(ci.lower < ci.upper);
        assert_eq!(ci.level, 0.95);
    }
}

#[tokio::test]
async fn significance_uses_the_coarse_threshold_mapping() {
    let engine = BenchEngine::spawn(fast_config(), Arc::new(NoopSink));

    // 16 clean successes against the 0.8 expectation: degenerate stddev
    // floors at 0.1, so t = 0.2 / (0.1 / 4) = 8 and p lands on 0.01.
    for i in 0..16 {
        engine
            .ingest(trial("mcd", &format!("m-{i}"), true, 300, 50))
            .unwrap();
    }
    // Two successes: t = 0.2 / (0.1 / sqrt(2)) ≈ 2.83, p = 0.05 which
    // is not strictly below the cutoff.
    engine.ingest(trial("few-shot", "f-0", true, 300, 50)).unwrap();
    engine.ingest(trial("few-shot", "f-1", true, 300, 50)).unwrap();
    engine.drained().await;

    let analysis = engine.comparative_analysis(&key()).unwrap();
    let mcd = analysis
        .approaches
        .iter()
        .find(|s| s.approach == "mcd")
        .unwrap();
    assert_eq!(mcd.significance.p_value, 0.01);
    assert!(mcd.significance.significant);

    let few_shot = analysis
        .approaches
        .iter()
        .find(|s| s.approach == "few-shot")
        .unwrap();
    assert_eq!(few_shot.significance.p_value, 0.05);
    assert!(!few_shot.significance.significant);
}

#[tokio::test]
async fn default_approach_never_triggers_comparison() {
    let engine = BenchEngine::spawn(fast_config(), Arc::new(NoopSink));

    // Single-approach mode plus one named approach: still not a
    // comparison.
    engine
        .ingest(RawTrialEvent::from_value(json!({
            "domain": "booking",
            "tier": "Q4",
            "walkthroughId": "d-0",
        })))
        .unwrap();
    engine.ingest(trial("mcd", "m-0", true, 300, 50)).unwrap();
    engine.drained().await;
    assert!(engine.comparative_analysis(&key()).is_none());

    // A second named approach starts the comparison, without the
    // single-approach records participating.
    engine.ingest(trial("few-shot", "f-0", true, 300, 50)).unwrap();
    engine.drained().await;
    let analysis = engine.comparative_analysis(&key()).unwrap();
    assert_eq!(analysis.ranking.len(), 2);
    assert!(!analysis.ranking.iter().any(|a| a == "default"));
}

#[tokio::test]
async fn minimal_data_records_are_stored_not_dropped() {
    let engine = BenchEngine::spawn(fast_config(), Arc::new(NoopSink));

    engine
        .ingest(RawTrialEvent::from_value(json!({
            "domain": "booking",
            "tier": "Q4",
            "walkthroughId": "sparse-1",
            "approach": "mcd",
        })))
        .unwrap();
    engine.drained().await;

    let results = engine.domain_results("booking");
    assert_eq!(results.len(), 1);
    let record = &results[0];
    assert!(record.minimal_data);
    assert!(!record.domain_metrics.overall_success);
    assert!(record.domain_metrics.fallback_triggered);
    assert_eq!(record.domain_metrics.mcd_alignment_score, 0.0);

    let snapshot = engine.export_snapshot();
    assert_eq!(snapshot.summary_stats.minimal_data_count, 1);
}
