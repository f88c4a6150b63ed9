//! End-to-end scan pipeline tests over a simulated network
//!
//! Covers the complete workflow:
//! 1. Bounded-concurrency probing
//! 2. Trace validation and location lookup
//! 3. Optional speed test
//! 4. Ranking

use std::sync::Arc;
use std::time::Duration;

use edgescan::models::Candidate;
use edgescan::scanner::{
    ProbeConfig, ProbePool, Ranking, ScanOutcome, Scanner, SpeedTestConfig,
};

use crate::common::{directory, MockHost, MockNetwork};

fn probe_config(max_concurrency: usize) -> ProbeConfig {
    ProbeConfig {
        max_concurrency,
        ..Default::default()
    }
}

fn speed_config(concurrency: usize) -> SpeedTestConfig {
    SpeedTestConfig {
        concurrency,
        duration: Duration::from_secs(10),
    }
}

fn scanner(network: Arc<MockNetwork>, probe: ProbeConfig, speed: SpeedTestConfig) -> Scanner {
    Scanner::with_transport(probe, speed, network, Arc::new(directory()))
}

fn completed(outcome: ScanOutcome) -> edgescan::scanner::ScanReport {
    match outcome {
        ScanOutcome::Completed(report) => report,
        ScanOutcome::NoValidCandidates { probe_stats, .. } => {
            panic!("expected results, got none: {probe_stats:?}")
        }
    }
}

fn addresses(ranking: &Ranking) -> Vec<String> {
    ranking
        .probe_results()
        .into_iter()
        .map(|r| r.candidate.address.clone())
        .collect()
}

// ============================================================================
// Probe Stage
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reachable_and_unreachable() {
    let network = MockNetwork::new()
        .host("10.0.0.1", MockHost::edge(30, "NRT", "JP"))
        .host("10.0.0.2", MockHost::refused())
        .into_arc();

    let outcome = scanner(network, probe_config(2), speed_config(0))
        .run(vec![
            Candidate::new("10.0.0.1", 443),
            Candidate::new("10.0.0.2", 1),
        ])
        .await;

    let report = completed(outcome);
    assert_eq!(report.valid_count, 1);
    assert_eq!(addresses(&report.ranking), vec!["10.0.0.1"]);
    assert_eq!(report.probe_stats.attempted, 2);
    assert_eq!(report.probe_stats.dial_failed, 1);

    let result = report.ranking.probe_results()[0].clone();
    assert_eq!(result.datacenter, "NRT");
    assert_eq!(result.source_location, "JP");
    assert_eq!(result.geo.city, "Tokyo");
    assert_eq!(result.latency, "30 ms");
}

#[tokio::test(start_paused = true)]
async fn test_delay_threshold_filters_reachable_host() {
    let network = MockNetwork::new()
        .host("10.0.0.1", MockHost::edge(50, "NRT", "JP"))
        .into_arc();

    let probe = ProbeConfig {
        delay_threshold_ms: 1,
        ..probe_config(2)
    };
    let outcome = scanner(network, probe, speed_config(0))
        .run(vec![Candidate::new("10.0.0.1", 443)])
        .await;

    let ScanOutcome::NoValidCandidates { probe_stats, .. } = outcome else {
        panic!("delay-filtered host must not be reported");
    };
    assert_eq!(probe_stats.delay_filtered, 1);
    assert_eq!(probe_stats.valid, 0);
}

#[tokio::test(start_paused = true)]
async fn test_latency_equal_to_threshold_is_kept() {
    let network = MockNetwork::new()
        .host("10.0.0.1", MockHost::edge(100, "NRT", "JP"))
        .host("10.0.0.2", MockHost::edge(101, "NRT", "JP"))
        .into_arc();

    let probe = ProbeConfig {
        delay_threshold_ms: 100,
        ..probe_config(4)
    };
    let report = completed(
        scanner(network, probe, speed_config(0))
            .run(vec![
                Candidate::new("10.0.0.1", 443),
                Candidate::new("10.0.0.2", 443),
            ])
            .await,
    );

    assert_eq!(addresses(&report.ranking), vec!["10.0.0.1"]);
    assert_eq!(report.probe_stats.delay_filtered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_datacenter_keeps_result() {
    let network = MockNetwork::new()
        .host("10.0.0.1", MockHost::edge(20, "ZZZ", "BR"))
        .into_arc();

    let report = completed(
        scanner(network, probe_config(1), speed_config(0))
            .run(vec![Candidate::new("10.0.0.1", 443)])
            .await,
    );

    let result = report.ranking.probe_results()[0].clone();
    assert_eq!(result.datacenter, "ZZZ");
    assert!(result.geo.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_slower_than_tcp_timeout_is_dropped() {
    let network = MockNetwork::new()
        .host("10.0.0.1", MockHost::edge(1500, "NRT", "JP"))
        .into_arc();

    let outcome = scanner(network, probe_config(1), speed_config(0))
        .run(vec![Candidate::new("10.0.0.1", 443)])
        .await;

    assert_eq!(outcome.probe_stats().dial_failed, 1);
    assert!(matches!(outcome, ScanOutcome::NoValidCandidates { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_connect_reported_past_timeout_is_dropped() {
    let network = MockNetwork::new()
        .host(
            "10.0.0.1",
            MockHost::edge(1500, "NRT", "JP").ignoring_deadline(),
        )
        .host("10.0.0.2", MockHost::edge(1000, "LAX", "US").ignoring_deadline())
        .into_arc();

    let report = completed(
        scanner(network.clone(), probe_config(2), speed_config(0))
            .run(vec![
                Candidate::new("10.0.0.1", 443),
                Candidate::new("10.0.0.2", 443),
            ])
            .await,
    );

    assert_eq!(network.dials(), 2);
    assert_eq!(report.probe_stats.dial_failed, 1);
    assert_eq!(addresses(&report.ranking), vec!["10.0.0.2"]);
    assert!(report
        .ranking
        .probe_results()
        .iter()
        .all(|r| r.tcp_duration <= ProbeConfig::default().tcp_timeout));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrency_never_exceeds_limit() {
    let mut network = MockNetwork::new();
    let mut candidates = Vec::new();
    for i in 0..200u32 {
        let address = format!("10.1.{}.{}", i / 250, i % 250 + 1);
        network = network.host(&address, MockHost::edge(10 + u64::from(i % 7), "LAX", "US"));
        candidates.push(Candidate::new(address, 443));
    }
    let network = network.into_arc();

    let pool = ProbePool::new(probe_config(8), network.clone(), Arc::new(directory()));
    let collected = pool.run(candidates).await;
    let snapshot = pool.stats().snapshot(collected.valid_count);

    assert_eq!(collected.results.len(), 200);
    assert!(network.peak_in_flight() <= 8, "peak {}", network.peak_in_flight());
    assert!(snapshot.peak_in_flight <= 8);
    assert!(snapshot.peak_in_flight >= 2, "pool never ran in parallel");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_valid_count_matches_results_under_load() {
    let mut network = MockNetwork::new();
    let mut candidates = Vec::new();
    for i in 0..600u32 {
        let address = format!("10.2.{}.{}", i / 200, i % 200 + 1);
        let host = if i % 3 == 0 {
            MockHost::refused()
        } else {
            MockHost::edge(1, "FRA", "DE")
        };
        network = network.host(&address, host);
        candidates.push(Candidate::new(address, 443));
    }

    let pool = ProbePool::new(probe_config(64), network.into_arc(), Arc::new(directory()));
    let collected = pool.run(candidates).await;

    assert_eq!(collected.valid_count, 400);
    assert_eq!(collected.results.len() as u64, collected.valid_count);

    let snapshot = pool.stats().snapshot(collected.valid_count);
    assert_eq!(snapshot.attempted, 600);
    assert_eq!(snapshot.dial_failed, 200);
    assert_eq!(snapshot.valid + snapshot.dropped(), snapshot.attempted);
}

// ============================================================================
// Speed Test Stage
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_speed_test_disabled_keeps_probe_result() {
    let network = MockNetwork::new()
        .host("10.0.0.1", MockHost::edge(30, "NRT", "JP"))
        .into_arc();

    let report = completed(
        scanner(network.clone(), probe_config(1), speed_config(0))
            .run(vec![Candidate::new("10.0.0.1", 443)])
            .await,
    );

    assert!(matches!(report.ranking, Ranking::Probed(ref r) if r.len() == 1));
    assert_eq!(network.downloads(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_speed_test_measures_throughput() {
    let network = MockNetwork::new()
        .host(
            "10.0.0.1",
            MockHost::edge(30, "NRT", "JP").with_speed(Some(500.0)),
        )
        .into_arc();

    let report = completed(
        scanner(network, probe_config(1), speed_config(1))
            .run(vec![Candidate::new("10.0.0.1", 443)])
            .await,
    );

    let Ranking::SpeedTested(results) = report.ranking else {
        panic!("speed test should have run");
    };
    assert_eq!(results.len(), 1);
    assert!((results[0].download_speed_kbs - 500.0).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_speed_ranking_descending_with_failures_last() {
    let network = MockNetwork::new()
        .host("10.0.0.1", MockHost::edge(10, "NRT", "JP").with_speed(Some(200.0)))
        .host("10.0.0.2", MockHost::edge(20, "LAX", "US").with_speed(None))
        .host("10.0.0.3", MockHost::edge(30, "FRA", "DE").with_speed(Some(900.0)))
        .host("10.0.0.4", MockHost::edge(40, "NRT", "JP").with_speed(Some(450.0)))
        .into_arc();

    let candidates = (1..=4)
        .map(|i| Candidate::new(format!("10.0.0.{i}"), 443))
        .collect();
    let report = completed(
        scanner(network.clone(), probe_config(4), speed_config(2))
            .run(candidates)
            .await,
    );

    assert_eq!(
        addresses(&report.ranking),
        vec!["10.0.0.3", "10.0.0.4", "10.0.0.1", "10.0.0.2"]
    );
    let Ranking::SpeedTested(results) = &report.ranking else {
        panic!("speed test should have run");
    };
    assert_eq!(results[3].download_speed_kbs, 0.0);
    assert_eq!(network.downloads(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_speed_ranking_is_deterministic_for_ties() {
    let build = || {
        MockNetwork::new()
            .host("10.0.0.1", MockHost::edge(40, "NRT", "JP").with_speed(Some(300.0)))
            .host("10.0.0.2", MockHost::edge(10, "NRT", "JP").with_speed(Some(300.0)))
            .host("10.0.0.3", MockHost::edge(20, "NRT", "JP").with_speed(Some(300.0)))
            .into_arc()
    };
    let candidates: Vec<_> = (1..=3)
        .map(|i| Candidate::new(format!("10.0.0.{i}"), 443))
        .collect();

    let first = completed(
        scanner(build(), probe_config(3), speed_config(3))
            .run(candidates.clone())
            .await,
    );
    let second = completed(
        scanner(build(), probe_config(3), speed_config(3))
            .run(candidates)
            .await,
    );

    assert_eq!(addresses(&first.ranking), addresses(&second.ranking));
    // Ties keep collector order, which follows connect latency here
    assert_eq!(
        addresses(&first.ranking),
        vec!["10.0.0.2", "10.0.0.3", "10.0.0.1"]
    );
}

// ============================================================================
// Empty Results
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_no_valid_candidates_skips_speed_test() {
    let network = MockNetwork::new()
        .host("10.0.0.1", MockHost::refused())
        .into_arc();

    let outcome = scanner(network.clone(), probe_config(1), speed_config(5))
        .run(vec![Candidate::new("10.0.0.1", 443)])
        .await;

    assert!(matches!(outcome, ScanOutcome::NoValidCandidates { .. }));
    assert_eq!(network.downloads(), 0);
}
