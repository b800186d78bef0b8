use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use surge_core::{
    ConfigError, EnvVars, MetricValue, ProgressUpdate, RampMode, RunConfig, RunHooks, RunOptions,
    RunStatus, SignedDuration, StageOptions, ThresholdSet, metric_names,
};
use surge_testserver::TestServer;
use tokio_util::sync::CancellationToken;

fn ms(n: u64) -> SignedDuration {
    SignedDuration::positive(Duration::from_millis(n))
}

fn no_env() -> EnvVars {
    Arc::from(Vec::new().into_boxed_slice())
}

fn options(url: String, stages: &[(u64, i64)]) -> RunOptions {
    RunOptions {
        target_url: Some(url),
        stages: stages
            .iter()
            .map(|(d, target)| StageOptions {
                duration: ms(*d),
                target: *target,
            })
            .collect(),
        tick: Some(ms(20)),
        request_interval: Some(ms(5)),
        graceful_ramp_down: Some(ms(100)),
        graceful_stop: Some(ms(300)),
        thresholds: vec![ThresholdSet {
            metric: metric_names::HTTP_REQ_FAILED.to_string(),
            expressions: vec!["rate<0.01".to_string()],
        }],
        checks: vec![("is status 200".to_string(), "status == 200".to_string())],
        ..RunOptions::default()
    }
}

fn config(opts: RunOptions) -> RunConfig {
    RunConfig::from_options(opts, &no_env()).unwrap_or_else(|e| panic!("{e}"))
}

type Updates = Arc<Mutex<Vec<ProgressUpdate>>>;

fn recording_hooks() -> (RunHooks, Updates) {
    let updates: Updates = Arc::new(Mutex::new(Vec::new()));
    let sink = updates.clone();
    let hooks = RunHooks {
        progress: Some(Arc::new(move |u| {
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(u);
        })),
        stop: None,
    };
    (hooks, updates)
}

fn taken(updates: &Updates) -> Vec<ProgressUpdate> {
    std::mem::take(&mut *updates.lock().unwrap_or_else(|e| e.into_inner()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn all_ok_ramp_passes_with_zero_failures() {
    let server = TestServer::start().await.unwrap_or_else(|e| panic!("{e}"));
    let opts = options(server.urls().hello.clone(), &[(200, 5), (200, 5), (100, 0)]);

    let report = surge_core::run(config(opts), RunHooks::default())
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(report.status, RunStatus::Passed);
    let requests = report.counter("http_reqs").unwrap_or(0);
    assert!(requests > 0);
    assert_eq!(report.rate("http_req_failed"), Some((requests, 0)));
    assert_eq!(report.rate("checks{check:is status 200}"), Some((requests, requests)));
    assert!(report.thresholds.iter().all(|t| t.passed));
    assert_eq!(report.executors.peak, 5);
    assert_eq!(report.executors.forced_stops, 0);
    assert_eq!(server.stats().requests_total(), requests);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn all_errors_breach_the_failure_threshold() {
    let server = TestServer::start().await.unwrap_or_else(|e| panic!("{e}"));
    let opts = options(server.urls().status(500), &[(200, 3)]);

    let report = surge_core::run(config(opts), RunHooks::default())
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(report.status, RunStatus::ThresholdsBreached);
    let (total, hits) = report
        .rate("http_req_failed")
        .unwrap_or_else(|| panic!("missing http_req_failed"));
    assert!(total > 0);
    assert_eq!(total, hits);

    let outcome = &report.thresholds[0];
    assert!(!outcome.passed);
    assert_eq!(outcome.observed, Some(1.0));
    assert_eq!(report.counter("http_req_errors{error:http_500}"), Some(total));
    assert_eq!(server.stats().responses_with(500), total);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn redirects_count_as_failures_by_default() {
    let server = TestServer::start().await.unwrap_or_else(|e| panic!("{e}"));
    let opts = options(server.urls().status(302), &[(200, 2)]);

    let report = surge_core::run(config(opts), RunHooks::default())
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(report.status, RunStatus::ThresholdsBreached);
    let (total, hits) = report
        .rate("http_req_failed")
        .unwrap_or_else(|| panic!("missing http_req_failed"));
    assert!(total > 0);
    assert_eq!(total, hits);
    assert_eq!(report.counter("http_req_errors{error:http_302}"), Some(total));
    assert_eq!(server.stats().responses_with(302), total);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn live_executors_match_the_target_at_every_tick() {
    let server = TestServer::start().await.unwrap_or_else(|e| panic!("{e}"));
    let opts = options(server.urls().hello.clone(), &[(200, 8), (200, 2), (100, 6)]);
    let (hooks, updates) = recording_hooks();

    surge_core::run(config(opts), hooks)
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let updates = taken(&updates);
    assert!(updates.len() > 5, "expected several ticks, got {}", updates.len());
    for u in &updates {
        assert_eq!(u.live, u.target, "tick {} at {:?}", u.tick, u.elapsed);
        assert!(u.target <= 8);
    }
    assert!(updates.windows(2).all(|w| w[0].tick < w[1].tick));

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ramp_down_to_zero_stops_new_requests() {
    let server = TestServer::start().await.unwrap_or_else(|e| panic!("{e}"));
    let mut opts = options(server.urls().hello.clone(), &[(100, 3), (0, 0), (500, 0)]);
    opts.graceful_ramp_down = Some(ms(50));
    let (hooks, updates) = recording_hooks();

    let report = surge_core::run(config(opts), hooks)
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let updates = taken(&updates);
    let settled: Vec<&ProgressUpdate> = updates
        .iter()
        .filter(|u| u.elapsed >= Duration::from_millis(300))
        .collect();
    assert!(!settled.is_empty());
    let first = settled[0].metrics.requests_total;
    for u in &settled {
        assert_eq!(u.target, 0);
        assert_eq!(u.live, 0);
        assert_eq!(u.draining, 0);
        assert_eq!(u.metrics.requests_total, first);
    }

    assert_eq!(report.executors.forced_stops, 0);
    assert!(matches!(
        report.metric(metric_names::VUS).map(|m| &m.values),
        Some(MetricValue::Gauge(0))
    ));
    assert!(matches!(
        report.metric(metric_names::VUS_MAX).map(|m| &m.values),
        Some(MetricValue::Gauge(3))
    ));

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ramp_down_grace_abandons_in_flight_requests() {
    let server = TestServer::start().await.unwrap_or_else(|e| panic!("{e}"));
    let mut opts = options(
        server.urls().slow(Duration::from_secs(5)),
        &[(100, 2), (0, 0), (2000, 0)],
    );
    opts.ramp = Some(RampMode::Step);
    opts.graceful_ramp_down = Some(ms(100));
    let (hooks, updates) = recording_hooks();

    let report = surge_core::run(config(opts), hooks)
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    let updates = taken(&updates);
    let settled: Vec<&ProgressUpdate> = updates
        .iter()
        .filter(|u| u.elapsed >= Duration::from_millis(400))
        .filter(|u| u.elapsed < Duration::from_millis(2100))
        .collect();
    assert!(!settled.is_empty());
    for u in &settled {
        assert_eq!(u.target, 0);
        assert_eq!(u.live, 0);
        assert_eq!(u.draining, 0, "tick {} at {:?}", u.tick, u.elapsed);
        assert_eq!(u.metrics.requests_total, 2);
    }

    assert_eq!(report.executors.peak, 2);
    assert_eq!(report.executors.forced_stops, 0);
    assert_eq!(report.executors.interrupted, 2);
    assert_eq!(report.counter("http_req_errors{error:abandoned}"), Some(2));
    assert_eq!(report.counter("iterations_interrupted"), Some(2));

    drop(server);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn graceful_stop_timeout_abandons_in_flight_requests() {
    let server = TestServer::start().await.unwrap_or_else(|e| panic!("{e}"));
    let mut opts = options(
        server.urls().slow(Duration::from_secs(5)),
        &[(100, 2), (100, 2), (0, 0), (100, 0)],
    );
    // Retired executors keep a long grace; only the final stop cuts them off.
    opts.graceful_ramp_down = Some(SignedDuration::positive(Duration::from_secs(3600)));
    opts.graceful_stop = Some(ms(100));

    let started = Instant::now();
    let report = surge_core::run(config(opts), RunHooks::default())
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.executors.forced_stops, 2);
    assert_eq!(report.executors.interrupted, 2);
    assert_eq!(report.counter("iterations_interrupted"), Some(2));
    assert_eq!(report.counter("http_req_errors{error:abandoned}"), Some(2));
    assert_eq!(report.rate("http_req_failed"), Some((2, 2)));
    assert_eq!(report.status, RunStatus::ThresholdsBreached);

    // The slow handlers are still sleeping; don't wait for them.
    drop(server);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_token_ends_the_run_early() {
    let server = TestServer::start().await.unwrap_or_else(|e| panic!("{e}"));
    let mut opts = options(server.urls().hello.clone(), &[(60_000, 2)]);
    opts.ramp = Some(RampMode::Step);

    let stop = CancellationToken::new();
    let hooks = RunHooks {
        progress: None,
        stop: Some(stop.clone()),
    };
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        stop.cancel();
    });

    let started = Instant::now();
    let report = surge_core::run(config(opts), hooks)
        .await
        .unwrap_or_else(|e| panic!("{e}"));

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.status, RunStatus::Passed);
    assert_eq!(report.executors.forced_stops, 0);
    assert!(report.counter("http_reqs").is_some_and(|n| n > 0));

    server.shutdown().await;
}

#[tokio::test]
async fn negative_stage_duration_is_rejected_before_any_request() {
    let server = TestServer::start().await.unwrap_or_else(|e| panic!("{e}"));
    let mut opts = options(server.urls().hello.clone(), &[(100, 2)]);
    opts.stages[0].duration = "-5s".parse().unwrap_or_else(|e| panic!("{e}"));

    let err = match RunConfig::from_options(opts, &no_env()) {
        Ok(_) => panic!("expected config error"),
        Err(e) => e,
    };
    assert!(matches!(err, ConfigError::NegativeStageDuration { index: 0, .. }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.stats().requests_total(), 0);

    server.shutdown().await;
}
