use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use surge_core::metric_names::{
    CHECKS, DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_ERRORS, HTTP_REQ_FAILED,
    HTTP_REQS, ITERATIONS, ITERATIONS_INTERRUPTED, TAG_CHECK, TAG_ERROR,
};
use surge_core::{MetricValue, RunReport};

use super::OutputFormatter;

pub(crate) struct JsonOutput {
    pub progress: bool,
}

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _config: &surge_core::RunConfig) {}

    fn progress(&self) -> Option<surge_core::ProgressFn> {
        if !self.progress {
            return None;
        }
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        let line = build_summary_line(report);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub interval_secs: f64,

    pub stage: Option<usize>,
    pub stages: Option<usize>,
    pub target: u64,
    pub live: u64,
    pub draining: u64,

    pub requests_per_sec: f64,
    pub failed_requests_per_sec: f64,
    pub error_rate: f64,
    pub iterations_per_sec: f64,
    pub bytes_received_per_sec: u64,
    pub bytes_sent_per_sec: u64,

    pub total_requests: u64,
    pub total_failed_requests: u64,
    pub total_bytes_received: u64,
    pub total_bytes_sent: u64,
    pub total_iterations: u64,
    pub total_iterations_interrupted: u64,
    pub checks_failed_total: u64,

    pub latency_mean_ms: Option<f64>,
    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub latency_max_ms: Option<f64>,

    pub req_per_sec_avg: f64,
    pub req_per_sec_stdev: f64,
    pub req_per_sec_max: f64,

    pub checks_failed: BTreeMap<String, u64>,
    pub errors: BTreeMap<String, u64>,
    pub thresholds_failing: Vec<String>,
}

fn build_progress_line(u: &surge_core::ProgressUpdate) -> JsonProgressLine {
    let m = &u.metrics;

    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        interval_secs: u.interval.as_secs_f64(),

        stage: u.stage.as_ref().map(|s| s.stage),
        stages: u.stage.as_ref().map(|s| s.stages),
        target: u.target,
        live: u.live,
        draining: u.draining,

        requests_per_sec: m.rps_now,
        failed_requests_per_sec: m.failed_rps_now,
        error_rate: m.error_rate_now,
        iterations_per_sec: m.iterations_per_sec_now,
        bytes_received_per_sec: m.bytes_received_per_sec_now,
        bytes_sent_per_sec: m.bytes_sent_per_sec_now,

        total_requests: m.requests_total,
        total_failed_requests: m.failed_requests_total,
        total_bytes_received: m.bytes_received_total,
        total_bytes_sent: m.bytes_sent_total,
        total_iterations: m.iterations_total,
        total_iterations_interrupted: m.iterations_interrupted_total,
        checks_failed_total: m.checks_failed_total,

        latency_mean_ms: m.latency_mean_ms,
        latency_p50_ms: m.latency_p50_ms,
        latency_p95_ms: m.latency_p95_ms,
        latency_max_ms: m.latency_max_ms,

        req_per_sec_avg: m.req_per_sec_avg,
        req_per_sec_stdev: m.req_per_sec_stdev,
        req_per_sec_max: m.req_per_sec_max,

        checks_failed: m.checks_failed.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        errors: m.errors_now.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        thresholds_failing: m.thresholds_failing.clone(),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub scenario: String,
    pub target_url: String,
    pub status: String,
    pub duration_secs: f64,

    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,
    pub iterations_total: u64,
    pub iterations_interrupted_total: u64,

    pub latency: Option<JsonLatencySummary>,
    pub checks: BTreeMap<String, JsonCheckSummary>,
    pub errors: BTreeMap<String, u64>,
    pub thresholds: Vec<JsonThresholdResult>,
    pub executors: JsonExecutors,
}

/// Milliseconds.
#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct JsonCheckSummary {
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonExecutors {
    pub peak: u64,
    pub spawned: u64,
    pub retired: u64,
    pub forced_stops: u64,
    pub interrupted: u64,
}

fn build_summary_line(report: &RunReport) -> JsonSummaryLine {
    let ms = |v: Option<f64>| v.map(|us| us / 1_000.0);

    let latency = match report.metric(HTTP_REQ_DURATION).map(|m| &m.values) {
        Some(MetricValue::Trend(h)) if h.count > 0 => Some(JsonLatencySummary {
            p50: ms(h.p50),
            p90: ms(h.p90),
            p95: ms(h.p95),
            p99: ms(h.p99),
            min: ms(h.min),
            max: ms(h.max),
            mean: ms(h.mean),
            stdev: ms(h.stdev),
            count: h.count,
        }),
        _ => None,
    };

    let mut checks = BTreeMap::new();
    let mut errors = BTreeMap::new();
    for s in &report.metrics {
        let tag = |key: &str| s.tags.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
        match (&s.name[..], &s.values) {
            (CHECKS, MetricValue::Rate { total, hits, .. }) => {
                if let Some(name) = tag(TAG_CHECK) {
                    checks.insert(
                        name,
                        JsonCheckSummary {
                            passes: *hits,
                            fails: total.saturating_sub(*hits),
                        },
                    );
                }
            }
            (HTTP_REQ_ERRORS, MetricValue::Counter(n)) => {
                if let Some(label) = tag(TAG_ERROR) {
                    errors.insert(label, *n);
                }
            }
            _ => {}
        }
    }

    let e = report.executors;

    JsonSummaryLine {
        kind: "summary",
        scenario: report.scenario.clone(),
        target_url: report.target_url.clone(),
        status: report.status.to_string(),
        duration_secs: report.duration.as_secs_f64(),

        requests_total: report.counter(HTTP_REQS).unwrap_or(0),
        failed_requests_total: report.rate(HTTP_REQ_FAILED).map_or(0, |(_, hits)| hits),
        bytes_received_total: report.counter(DATA_RECEIVED).unwrap_or(0),
        bytes_sent_total: report.counter(DATA_SENT).unwrap_or(0),
        iterations_total: report.counter(ITERATIONS).unwrap_or(0),
        iterations_interrupted_total: report.counter(ITERATIONS_INTERRUPTED).unwrap_or(0),

        latency,
        checks,
        errors,
        thresholds: report
            .thresholds
            .iter()
            .map(|t| JsonThresholdResult {
                metric: t.metric.clone(),
                expression: t.expression.clone(),
                observed: t.observed,
                ok: t.passed,
            })
            .collect(),
        executors: JsonExecutors {
            peak: e.peak,
            spawned: e.spawned,
            retired: e.retired,
            forced_stops: e.forced_stops,
            interrupted: e.interrupted,
        },
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
