use std::sync::Arc;
use std::time::{Instant, SystemTime};

use surge_http::HttpClient;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::aggregator::Aggregator;
use crate::config::RunConfig;
use crate::error::Result;
use crate::executor::ExecutorContext;
use crate::progress::ProgressFn;
use crate::report::{RunReport, RunStatus};
use crate::scheduler::Scheduler;
use crate::thresholds_eval::evaluate_thresholds;

/// Optional observers of a run.
#[derive(Clone, Default)]
pub struct RunHooks {
    /// Called after every scheduler tick.
    pub progress: Option<ProgressFn>,
    /// Cancel to end the stages early; executors still drain gracefully.
    pub stop: Option<CancellationToken>,
}

/// Runs the configured stages against the target and returns the final report.
pub async fn run(config: RunConfig, hooks: RunHooks) -> Result<RunReport> {
    let config = Arc::new(config);
    let aggregator = Arc::new(Aggregator::new(config.checks.iter().map(|c| c.name.as_str())));
    let client = HttpClient::new(Some(config.connect_timeout));
    let hard_stop = CancellationToken::new();

    let ctx = Arc::new(ExecutorContext::new(
        config.clone(),
        client,
        aggregator.clone(),
        hard_stop.clone(),
    )?);

    let started_at = SystemTime::now();
    let started = Instant::now();

    let executors = Scheduler::new(ctx)
        .run(started, hooks.progress, hooks.stop.unwrap_or_default())
        .await;
    // Nothing may outlive the run, even on error.
    hard_stop.cancel();
    let executors = executors?;

    let duration = started.elapsed();
    let metrics = aggregator.snapshot();
    let thresholds = evaluate_thresholds(&metrics, &config.thresholds, duration);
    let status = if thresholds.iter().all(|t| t.passed) {
        RunStatus::Passed
    } else {
        RunStatus::ThresholdsBreached
    };

    info!(%status, ?duration, forced_stops = executors.forced_stops, "run finished");

    Ok(RunReport {
        scenario: config.scenario.clone(),
        target_url: config.target_url.clone(),
        started_at,
        duration,
        metrics,
        thresholds,
        executors,
        status,
    })
}
