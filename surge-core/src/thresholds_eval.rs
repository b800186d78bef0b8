use std::collections::HashMap;
use std::time::Duration;

use surge_metrics::{MetricSeriesSummary, MetricValue};

use crate::thresholds::{Threshold, ThresholdAgg, canonical_key};

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub expression: String,
    /// Value compared against the bound; trends are in milliseconds.
    /// `None` when the series holds no data.
    pub observed: Option<f64>,
    pub passed: bool,
}

/// Evaluates `thresholds` against a metrics snapshot.
///
/// A selector matches the series whose tag set is exactly the selector's.
/// Series without data (no series, empty rate, empty trend) pass.
pub fn evaluate_thresholds(
    snapshot: &[MetricSeriesSummary],
    thresholds: &[Threshold],
    elapsed: Duration,
) -> Vec<ThresholdOutcome> {
    let by_key: HashMap<String, &MetricValue> = snapshot
        .iter()
        .map(|s| {
            let key = canonical_key(&s.name, s.tags.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            (key, &s.values)
        })
        .collect();

    thresholds
        .iter()
        .map(|t| {
            let observed = by_key
                .get(&t.selector.canonical_key())
                .and_then(|values| observed_value(values, t.expr.agg, elapsed));
            let passed = observed.is_none_or(|v| t.expr.op.apply(v, t.expr.value));

            ThresholdOutcome {
                metric: t.metric.clone(),
                expression: t.expression.clone(),
                observed,
                passed,
            }
        })
        .collect()
}

fn observed_value(values: &MetricValue, agg: ThresholdAgg, elapsed: Duration) -> Option<f64> {
    let ms = |us: Option<f64>| us.map(|v| v / 1000.0);

    match (values, agg) {
        (MetricValue::Counter(n), ThresholdAgg::Count) => Some(*n as f64),
        (MetricValue::Counter(n), ThresholdAgg::Rate) => {
            let secs = elapsed.as_secs_f64();
            (secs > 0.0).then(|| *n as f64 / secs)
        }
        (MetricValue::Gauge(v), ThresholdAgg::Value) => Some(*v as f64),
        (MetricValue::Rate { rate, .. }, ThresholdAgg::Rate) => *rate,
        (MetricValue::Trend(t), _) if t.count == 0 => None,
        (MetricValue::Trend(t), ThresholdAgg::Count) => Some(t.count as f64),
        (MetricValue::Trend(t), ThresholdAgg::Avg) => ms(t.mean),
        (MetricValue::Trend(t), ThresholdAgg::Min) => ms(t.min),
        (MetricValue::Trend(t), ThresholdAgg::Max) => ms(t.max),
        (MetricValue::Trend(t), ThresholdAgg::Med) => ms(t.p50),
        (MetricValue::Trend(t), ThresholdAgg::P(p)) => ms(t.percentile(p)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use surge_metrics::{MetricKind, TrendSummary};

    use super::*;
    use crate::aggregator::builtin_metric_kind;
    use crate::thresholds::{ThresholdSet, compile_thresholds};

    fn compile(metric: &str, expr: &str) -> Vec<Threshold> {
        compile_thresholds(
            &[ThresholdSet {
                metric: metric.to_string(),
                expressions: vec![expr.to_string()],
            }],
            builtin_metric_kind,
        )
        .unwrap_or_else(|e| panic!("{e}"))
    }

    fn series(name: &str, tags: &[(&str, &str)], values: MetricValue) -> MetricSeriesSummary {
        MetricSeriesSummary {
            name: name.to_string(),
            kind: builtin_metric_kind(name).unwrap_or(MetricKind::Counter),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            values,
        }
    }

    fn rate(total: u64, hits: u64) -> MetricValue {
        MetricValue::Rate {
            total,
            hits,
            rate: (total > 0).then(|| hits as f64 / total as f64),
        }
    }

    fn eval_one(snapshot: &[MetricSeriesSummary], metric: &str, expr: &str) -> ThresholdOutcome {
        evaluate_thresholds(snapshot, &compile(metric, expr), Duration::from_secs(10))
            .pop()
            .unwrap_or_else(|| panic!("no outcome"))
    }

    #[test]
    fn rate_threshold_passes_iff_ratio_below_bound() {
        let ok = [series("http_req_failed", &[], rate(1000, 9))];
        assert!(eval_one(&ok, "http_req_failed", "rate<0.01").passed);

        let bad = [series("http_req_failed", &[], rate(1000, 10))];
        let out = eval_one(&bad, "http_req_failed", "rate<0.01");
        assert!(!out.passed);
        assert_eq!(out.observed, Some(0.01));
    }

    #[test]
    fn empty_series_pass() {
        let empty_rate = [series("http_req_failed", &[], rate(0, 0))];
        let out = eval_one(&empty_rate, "http_req_failed", "rate<0.01");
        assert!(out.passed);
        assert_eq!(out.observed, None);

        let empty_trend = [series(
            "http_req_duration",
            &[],
            MetricValue::Trend(TrendSummary::default()),
        )];
        assert!(eval_one(&empty_trend, "http_req_duration", "p(95)<1").passed);

        assert!(eval_one(&[], "http_req_duration{expected_response:true}", "avg<1").passed);
    }

    #[test]
    fn trend_thresholds_compare_milliseconds_on_the_selected_series() {
        let fast = TrendSummary {
            count: 10,
            p50: Some(80_000.0),
            p95: Some(120_000.0),
            distribution: vec![(95, 120_000.0)],
            ..TrendSummary::default()
        };
        let slow = TrendSummary {
            count: 10,
            p95: Some(900_000.0),
            distribution: vec![(95, 900_000.0)],
            ..TrendSummary::default()
        };
        let snapshot = [
            series("http_req_duration", &[], MetricValue::Trend(slow)),
            series(
                "http_req_duration",
                &[("expected_response", "true")],
                MetricValue::Trend(fast),
            ),
        ];

        let tagged = eval_one(
            &snapshot,
            "http_req_duration{expected_response:true}",
            "p(95)<500",
        );
        assert!(tagged.passed);
        assert_eq!(tagged.observed, Some(120.0));

        assert!(!eval_one(&snapshot, "http_req_duration", "p(95)<500").passed);
        assert!(eval_one(&snapshot, "http_req_duration{expected_response:true}", "med<=80").passed);
    }

    #[test]
    fn counter_rate_is_per_second_over_elapsed() {
        let snapshot = [series("http_reqs", &[], MetricValue::Counter(500))];
        let out = eval_one(&snapshot, "http_reqs", "rate>=50");
        assert!(out.passed);
        assert_eq!(out.observed, Some(50.0));
        assert!(!eval_one(&snapshot, "http_reqs", "count<100").passed);
    }

    #[test]
    fn gauge_value_is_compared_directly() {
        let snapshot = [series("vus_max", &[], MetricValue::Gauge(7))];
        assert!(eval_one(&snapshot, "vus_max", "value==7").passed);
        assert!(!eval_one(&snapshot, "vus_max", "value!=7").passed);
    }
}
