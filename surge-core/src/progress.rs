use std::collections::HashMap;
use std::time::{Duration, Instant};

use surge_metrics::{RunningStats, counter_delta, per_sec};

use crate::aggregator::{AggregateTotals, Aggregator};
use crate::schedule::StageSnapshot;
use crate::thresholds::Threshold;
use crate::thresholds_eval::evaluate_thresholds;

#[derive(Debug, Clone, Default)]
pub struct LiveMetrics {
    /// Requests/sec observed during the last interval.
    pub rps_now: f64,
    pub failed_rps_now: f64,
    /// Failed / total requests during the last interval (0..=1).
    pub error_rate_now: f64,
    pub bytes_received_per_sec_now: u64,
    pub bytes_sent_per_sec_now: u64,
    pub iterations_per_sec_now: f64,

    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,
    pub iterations_total: u64,
    pub iterations_interrupted_total: u64,
    pub checks_failed_total: u64,

    /// Requests/sec statistics across progress intervals.
    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,

    /// Whole-run latency so far, in milliseconds.
    pub latency_mean_ms: Option<f64>,
    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub latency_max_ms: Option<f64>,

    pub checks_failed: HashMap<String, u64>,
    /// Failures during the last interval, keyed by error label.
    pub errors_now: HashMap<String, u64>,
    /// Threshold expressions that would fail if the run ended now.
    pub thresholds_failing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

impl From<StageSnapshot> for StageProgress {
    fn from(st: StageSnapshot) -> Self {
        Self {
            stage: st.index + 1,
            stages: st.count,
            stage_elapsed: st.stage_elapsed,
            stage_remaining: st.stage_remaining,
            start_target: st.start_target,
            end_target: st.end_target,
            current_target: st.current_target,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based).
    pub tick: u64,
    pub elapsed: Duration,
    /// Time since the previous update.
    pub interval: Duration,
    pub scenario: String,
    pub total_duration: Duration,
    pub target: u64,
    /// Executors counting toward the target.
    pub live: u64,
    /// Retired executors still finishing under a grace period.
    pub draining: u64,
    pub stage: Option<StageProgress>,
    pub metrics: LiveMetrics,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

/// Turns cumulative aggregator totals into per-interval rates.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    last_at: Instant,
    last: AggregateTotals,
    last_errors: HashMap<String, u64>,
    rps: RunningStats,
}

impl ProgressTracker {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            last_at: now,
            last: AggregateTotals::default(),
            last_errors: HashMap::new(),
            rps: RunningStats::default(),
        }
    }

    /// Returns the live metrics and the time since the previous call.
    pub(crate) fn sample(
        &mut self,
        aggregator: &Aggregator,
        thresholds: &[Threshold],
        elapsed: Duration,
        now: Instant,
    ) -> (LiveMetrics, Duration) {
        let dt = now.duration_since(self.last_at);
        self.last_at = now;
        let dt_secs = dt.as_secs_f64();

        let totals = aggregator.totals();
        let prev = self.last;
        self.last = totals;

        let delta = counter_delta;
        let rate = |cur: u64, prev: u64| per_sec(counter_delta(cur, prev), dt_secs);

        let delta_requests = delta(totals.requests, prev.requests);
        let delta_failed = delta(totals.failed_requests, prev.failed_requests);
        let rps_now = rate(totals.requests, prev.requests);
        self.rps.push(rps_now);

        let errors_total = aggregator.errors_by_label();
        let errors_now = errors_total
            .iter()
            .filter_map(|(label, n)| {
                let d = n.saturating_sub(self.last_errors.get(label).copied().unwrap_or(0));
                (d != 0).then(|| (label.clone(), d))
            })
            .collect();
        self.last_errors = errors_total;

        let latency = aggregator.request_latency();
        let ms = |us: Option<f64>| us.map(|v| v / 1000.0);

        let thresholds_failing = if thresholds.is_empty() {
            Vec::new()
        } else {
            evaluate_thresholds(&aggregator.snapshot(), thresholds, elapsed)
                .into_iter()
                .filter(|t| !t.passed)
                .map(|t| format!("{}: {}", t.metric, t.expression))
                .collect()
        };

        let metrics = LiveMetrics {
            rps_now,
            failed_rps_now: rate(totals.failed_requests, prev.failed_requests),
            error_rate_now: if delta_requests == 0 {
                0.0
            } else {
                delta_failed as f64 / delta_requests as f64
            },
            bytes_received_per_sec_now: rate(totals.bytes_received, prev.bytes_received).round()
                as u64,
            bytes_sent_per_sec_now: rate(totals.bytes_sent, prev.bytes_sent).round() as u64,
            iterations_per_sec_now: rate(totals.iterations, prev.iterations),
            requests_total: totals.requests,
            failed_requests_total: totals.failed_requests,
            bytes_received_total: totals.bytes_received,
            bytes_sent_total: totals.bytes_sent,
            iterations_total: totals.iterations,
            iterations_interrupted_total: totals.iterations_interrupted,
            checks_failed_total: totals.checks_failed,
            req_per_sec_avg: self.rps.mean(),
            req_per_sec_stdev: self.rps.stdev(),
            req_per_sec_max: self.rps.max(),
            latency_mean_ms: ms(latency.mean),
            latency_p50_ms: ms(latency.p50),
            latency_p95_ms: ms(latency.p95),
            latency_max_ms: ms(latency.max),
            checks_failed: aggregator.checks_failed_by_name(),
            errors_now,
            thresholds_failing,
        };

        (metrics, dt)
    }
}
