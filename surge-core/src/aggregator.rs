use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};

use surge_http::HttpTransportErrorKind;
use surge_metrics::{
    KeyId, MetricHandle, MetricId, MetricKind, MetricSeriesSummary, Registry, TagSet, TrendSummary,
};

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
/// Request latency in microseconds.
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_ERRORS: &str = "http_req_errors";
pub const DATA_SENT: &str = "data_sent";
pub const DATA_RECEIVED: &str = "data_received";
pub const ITERATIONS: &str = "iterations";
/// Iteration duration in microseconds.
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const ITERATIONS_INTERRUPTED: &str = "iterations_interrupted";
pub const CHECKS: &str = "checks";
pub const VUS: &str = "vus";
pub const VUS_MAX: &str = "vus_max";

pub const TAG_EXPECTED_RESPONSE: &str = "expected_response";
pub const TAG_CHECK: &str = "check";
pub const TAG_ERROR: &str = "error";

pub const BUILTIN_METRICS: &[(&str, MetricKind)] = &[
    (HTTP_REQS, MetricKind::Counter),
    (HTTP_REQ_FAILED, MetricKind::Rate),
    (HTTP_REQ_DURATION, MetricKind::Trend),
    (HTTP_REQ_ERRORS, MetricKind::Counter),
    (DATA_SENT, MetricKind::Counter),
    (DATA_RECEIVED, MetricKind::Counter),
    (ITERATIONS, MetricKind::Counter),
    (ITERATION_DURATION, MetricKind::Trend),
    (ITERATIONS_INTERRUPTED, MetricKind::Counter),
    (CHECKS, MetricKind::Rate),
    (VUS, MetricKind::Gauge),
    (VUS_MAX, MetricKind::Gauge),
];

#[must_use]
pub fn builtin_metric_kind(name: &str) -> Option<MetricKind> {
    BUILTIN_METRICS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, kind)| *kind)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeError {
    Transport(HttpTransportErrorKind),
    /// Cut off in flight when a grace period or the hard stop ran out.
    Abandoned,
}

impl fmt::Display for OutcomeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(kind) => write!(f, "{kind}"),
            Self::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// Result of one request, handed to the aggregator exactly once.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub timestamp: SystemTime,
    pub latency: Duration,
    /// Absent when no response arrived.
    pub status: Option<u16>,
    pub failed: bool,
    pub error: Option<OutcomeError>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl RequestOutcome {
    /// Tag value for the `http_req_errors` breakdown.
    fn error_label(&self) -> String {
        match (self.error, self.status) {
            (Some(err), _) => err.to_string(),
            (None, Some(status)) => format!("http_{status}"),
            (None, None) => "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Handles {
    http_reqs: MetricHandle,
    http_req_failed: MetricHandle,
    http_req_duration: MetricHandle,
    http_req_duration_expected: MetricHandle,
    http_req_duration_unexpected: MetricHandle,
    data_sent: MetricHandle,
    data_received: MetricHandle,
    iterations: MetricHandle,
    iteration_duration: MetricHandle,
    iterations_interrupted: MetricHandle,
    checks: MetricHandle,
    vus: MetricHandle,
    vus_max: MetricHandle,
}

/// Running totals for progress reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateTotals {
    pub requests: u64,
    pub failed_requests: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub iterations: u64,
    pub iterations_interrupted: u64,
    pub checks_failed: u64,
    pub vus: i64,
    pub vus_max: i64,
}

/// Folds request outcomes into the run's metric registry.
///
/// Every built-in series is created up front so the snapshot always lists
/// them, even when nothing was recorded.
#[derive(Debug)]
pub struct Aggregator {
    registry: Registry,
    handles: Handles,
    check_handles: Vec<MetricHandle>,
    http_req_errors: MetricId,
    checks: MetricId,
    error_key: KeyId,
    check_key: KeyId,
}

fn duration_us(d: Duration) -> u64 {
    d.as_micros().try_into().unwrap_or(u64::MAX)
}

impl Aggregator {
    pub fn new<S: AsRef<str>>(check_names: impl IntoIterator<Item = S>) -> Self {
        let registry = Registry::default();
        let base = TagSet::default();
        let expected_key = registry.resolve_key(TAG_EXPECTED_RESPONSE);
        let series = |name: &str, kind: MetricKind| registry.series_handle(name, kind, base.clone());

        let handles = Handles {
            http_reqs: series(HTTP_REQS, MetricKind::Counter),
            http_req_failed: series(HTTP_REQ_FAILED, MetricKind::Rate),
            http_req_duration: series(HTTP_REQ_DURATION, MetricKind::Trend),
            http_req_duration_expected: registry.series_handle(
                HTTP_REQ_DURATION,
                MetricKind::Trend,
                base.with(expected_key, registry.resolve_key("true")),
            ),
            http_req_duration_unexpected: registry.series_handle(
                HTTP_REQ_DURATION,
                MetricKind::Trend,
                base.with(expected_key, registry.resolve_key("false")),
            ),
            data_sent: series(DATA_SENT, MetricKind::Counter),
            data_received: series(DATA_RECEIVED, MetricKind::Counter),
            iterations: series(ITERATIONS, MetricKind::Counter),
            iteration_duration: series(ITERATION_DURATION, MetricKind::Trend),
            iterations_interrupted: series(ITERATIONS_INTERRUPTED, MetricKind::Counter),
            checks: series(CHECKS, MetricKind::Rate),
            vus: series(VUS, MetricKind::Gauge),
            vus_max: series(VUS_MAX, MetricKind::Gauge),
        };

        let check_key = registry.resolve_key(TAG_CHECK);
        let check_handles = check_names
            .into_iter()
            .map(|name| {
                registry.series_handle(
                    CHECKS,
                    MetricKind::Rate,
                    base.with(check_key, registry.resolve_key(name.as_ref())),
                )
            })
            .collect();

        let http_req_errors = registry.register(HTTP_REQ_ERRORS, MetricKind::Counter);
        let checks = registry.register(CHECKS, MetricKind::Rate);
        let error_key = registry.resolve_key(TAG_ERROR);

        Self {
            registry,
            handles,
            check_handles,
            http_req_errors,
            checks,
            error_key,
            check_key,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_outcome(&self, outcome: RequestOutcome) {
        let h = &self.handles;
        let latency_us = duration_us(outcome.latency);

        h.http_reqs.increment(1);
        h.http_req_failed.add_rate(u64::from(outcome.failed), 1);
        h.http_req_duration.observe(latency_us);
        if outcome.failed {
            h.http_req_duration_unexpected.observe(latency_us);
        } else {
            h.http_req_duration_expected.observe(latency_us);
        }
        h.data_sent.increment(outcome.bytes_sent);
        h.data_received.increment(outcome.bytes_received);

        if outcome.failed {
            let label = outcome.error_label();
            let tags = TagSet::default().with(self.error_key, self.registry.resolve_key(&label));
            if let Some(errors) = self.registry.get_handle(self.http_req_errors, tags) {
                errors.increment(1);
            }
        }
    }

    /// Records the result of the check at `index` (configuration order).
    pub fn record_check(&self, index: usize, passed: bool) {
        let hits = u64::from(passed);
        self.handles.checks.add_rate(hits, 1);
        if let Some(h) = self.check_handles.get(index) {
            h.add_rate(hits, 1);
        }
    }

    pub fn record_iteration(&self, duration: Duration) {
        self.handles.iterations.increment(1);
        self.handles.iteration_duration.observe(duration_us(duration));
    }

    pub fn record_interrupted_iteration(&self) {
        self.handles.iterations_interrupted.increment(1);
    }

    /// Counts one running executor until the guard drops.
    pub fn enter_vu(&self) -> ActiveVuGuard {
        let now = self.handles.vus.add_gauge(1);
        self.handles.vus_max.raise_gauge(now);
        ActiveVuGuard {
            vus: self.handles.vus.clone(),
        }
    }

    pub fn active_vus(&self) -> i64 {
        self.handles.vus.get_gauge()
    }

    pub fn totals(&self) -> AggregateTotals {
        let h = &self.handles;
        let (checks_total, checks_passed) = h.checks.get_rate();
        let (_, failed_requests) = h.http_req_failed.get_rate();
        AggregateTotals {
            requests: h.http_reqs.get_counter(),
            failed_requests,
            bytes_sent: h.data_sent.get_counter(),
            bytes_received: h.data_received.get_counter(),
            iterations: h.iterations.get_counter(),
            iterations_interrupted: h.iterations_interrupted.get_counter(),
            checks_failed: checks_total.saturating_sub(checks_passed),
            vus: h.vus.get_gauge(),
            vus_max: h.vus_max.get_gauge(),
        }
    }

    /// Merged latency of every request so far (microseconds).
    pub fn request_latency(&self) -> TrendSummary {
        match &self.handles.http_req_duration {
            MetricHandle::Trend(h) => h.summarize(),
            _ => TrendSummary::default(),
        }
    }

    /// Failure count per `http_req_errors` label.
    pub fn errors_by_label(&self) -> HashMap<String, u64> {
        self.registry
            .query(self.http_req_errors, self.error_key)
            .counters()
            .into_iter()
            .filter_map(|(id, n)| {
                let label = self.registry.resolve_key_id(id)?;
                Some((label.to_string(), n))
            })
            .collect()
    }

    /// Failed evaluations per check name.
    pub fn checks_failed_by_name(&self) -> HashMap<String, u64> {
        self.registry
            .query(self.checks, self.check_key)
            .rates()
            .into_iter()
            .filter_map(|(id, (total, hits))| {
                let name = self.registry.resolve_key_id(id)?;
                Some((name.to_string(), total.saturating_sub(hits)))
            })
            .collect()
    }

    /// Point-in-time summary of every series, sorted by name then tags.
    pub fn snapshot(&self) -> Vec<MetricSeriesSummary> {
        self.registry.summarize()
    }
}

#[derive(Debug)]
pub struct ActiveVuGuard {
    vus: MetricHandle,
}

impl Drop for ActiveVuGuard {
    fn drop(&mut self) {
        self.vus.add_gauge(-1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use surge_metrics::MetricValue;

    use super::*;

    fn outcome(status: Option<u16>, failed: bool, latency_ms: u64) -> RequestOutcome {
        RequestOutcome {
            timestamp: SystemTime::now(),
            latency: Duration::from_millis(latency_ms),
            status,
            failed,
            error: status
                .is_none()
                .then_some(OutcomeError::Transport(HttpTransportErrorKind::Connect)),
            bytes_sent: 10,
            bytes_received: 100,
        }
    }

    fn find<'a>(snapshot: &'a [MetricSeriesSummary], key: &str) -> &'a MetricValue {
        &snapshot
            .iter()
            .find(|s| s.key() == key)
            .unwrap_or_else(|| panic!("missing series {key}"))
            .values
    }

    #[test]
    fn builtin_series_exist_before_any_outcome() {
        let agg = Aggregator::new(["is status 200"]);
        let snapshot = agg.snapshot();

        for (name, _) in BUILTIN_METRICS {
            if *name == HTTP_REQ_ERRORS {
                continue;
            }
            assert!(
                snapshot.iter().any(|s| s.name == *name),
                "missing {name}"
            );
        }
        assert!(matches!(
            find(&snapshot, "http_req_failed"),
            MetricValue::Rate { total: 0, rate: None, .. }
        ));
        assert!(matches!(
            find(&snapshot, "checks{check:is status 200}"),
            MetricValue::Rate { total: 0, .. }
        ));
    }

    #[test]
    fn outcomes_fold_into_k6_metrics() {
        let agg = Aggregator::new(Vec::<String>::new());
        agg.record_outcome(outcome(Some(200), false, 10));
        agg.record_outcome(outcome(Some(200), false, 20));
        agg.record_outcome(outcome(Some(500), true, 30));
        agg.record_outcome(outcome(None, true, 40));

        let snapshot = agg.snapshot();
        assert!(matches!(find(&snapshot, "http_reqs"), MetricValue::Counter(4)));
        assert!(matches!(find(&snapshot, "data_sent"), MetricValue::Counter(40)));
        assert!(matches!(find(&snapshot, "data_received"), MetricValue::Counter(400)));
        match find(&snapshot, "http_req_failed") {
            MetricValue::Rate { total, hits, rate } => {
                assert_eq!((*total, *hits), (4, 2));
                assert_eq!(*rate, Some(0.5));
            }
            other => panic!("unexpected {other:?}"),
        }
        match find(&snapshot, "http_req_duration{expected_response:true}") {
            MetricValue::Trend(t) => assert_eq!(t.count, 2),
            other => panic!("unexpected {other:?}"),
        }
        match find(&snapshot, "http_req_duration") {
            MetricValue::Trend(t) => assert_eq!(t.count, 4),
            other => panic!("unexpected {other:?}"),
        }

        let errors = agg.errors_by_label();
        assert_eq!(errors.get("http_500"), Some(&1));
        assert_eq!(errors.get("connect"), Some(&1));

        let totals = agg.totals();
        assert_eq!(totals.requests, 4);
        assert_eq!(totals.failed_requests, 2);
    }

    #[test]
    fn checks_record_base_and_named_series() {
        let agg = Aggregator::new(["ok", "fast"]);
        agg.record_check(0, true);
        agg.record_check(1, false);
        agg.record_check(0, false);

        let totals = agg.totals();
        assert_eq!(totals.checks_failed, 2);

        let by_name = agg.checks_failed_by_name();
        assert_eq!(by_name.get("ok"), Some(&1));
        assert_eq!(by_name.get("fast"), Some(&1));
    }

    #[test]
    fn vu_guard_tracks_current_and_peak() {
        let agg = Aggregator::new(Vec::<String>::new());
        let a = agg.enter_vu();
        let b = agg.enter_vu();
        assert_eq!(agg.active_vus(), 2);
        drop(a);
        drop(b);
        let _c = agg.enter_vu();

        let totals = agg.totals();
        assert_eq!(totals.vus, 1);
        assert_eq!(totals.vus_max, 2);
    }

    #[test]
    fn aggregation_is_order_independent_across_threads() {
        let forward = Arc::new(Aggregator::new(Vec::<String>::new()));
        let backward = Aggregator::new(Vec::<String>::new());

        let outcomes: Vec<RequestOutcome> = (1..=200)
            .map(|i| outcome(Some(if i % 7 == 0 { 500 } else { 200 }), i % 7 == 0, i))
            .collect();

        std::thread::scope(|s| {
            for chunk in outcomes.chunks(50) {
                let agg = forward.clone();
                s.spawn(move || {
                    for o in chunk {
                        agg.record_outcome(o.clone());
                    }
                });
            }
        });
        for o in outcomes.iter().rev() {
            backward.record_outcome(o.clone());
        }

        let a = forward.snapshot();
        let b = backward.snapshot();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.key(), y.key());
            assert_eq!(format!("{:?}", x.values), format!("{:?}", y.values));
        }
    }
}
