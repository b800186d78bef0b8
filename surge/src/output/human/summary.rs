use std::fmt::Write as _;

use surge_core::metric_names::{
    CHECKS, DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_ERRORS, HTTP_REQ_FAILED,
    HTTP_REQS, ITERATIONS, ITERATIONS_INTERRUPTED, TAG_CHECK, TAG_ERROR, VUS, VUS_MAX,
};
use surge_core::{MetricSeriesSummary, MetricValue, RunReport};

use super::units::{
    format_bytes, format_duration_single, format_micros_opt, format_percent, format_rate,
};

pub(crate) fn render(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(out, "  status: {}", report.status).ok();
    writeln!(out, "  duration: {}", format_duration_single(report.duration)).ok();

    let e = &report.executors;
    writeln!(
        out,
        "  executors: peak={} spawned={} retired={} forced_stops={} interrupted={}",
        e.peak, e.spawned, e.retired, e.forced_stops, e.interrupted
    )
    .ok();

    let requests = report.counter(HTTP_REQS).unwrap_or(0);
    let failed = report.rate(HTTP_REQ_FAILED).map_or(0, |(_, hits)| hits);
    let failed_ratio = if requests == 0 {
        0.0
    } else {
        failed as f64 / requests as f64
    };
    writeln!(
        out,
        "  requests: {requests} (failed {failed}, {})",
        format_percent(failed_ratio)
    )
    .ok();
    writeln!(
        out,
        "  iterations: {} (interrupted {})",
        report.counter(ITERATIONS).unwrap_or(0),
        report.counter(ITERATIONS_INTERRUPTED).unwrap_or(0)
    )
    .ok();

    let received = report.counter(DATA_RECEIVED).unwrap_or(0);
    let sent = report.counter(DATA_SENT).unwrap_or(0);
    writeln!(
        out,
        "  bytes: recv {} sent {}",
        format_bytes(received),
        format_bytes(sent)
    )
    .ok();

    let secs = report.duration.as_secs_f64().max(1e-9);
    writeln!(
        out,
        "  rates: rps={} tps={}/s",
        format_rate(requests as f64 / secs),
        format_bytes((received.saturating_add(sent) as f64 / secs) as u64)
    )
    .ok();

    match report.metric(HTTP_REQ_DURATION).map(|m| &m.values) {
        Some(MetricValue::Trend(h)) if h.count > 0 => {
            writeln!(
                out,
                "  latency = p50={} p90={} p95={} p99={} mean={} max={} (n={})",
                format_micros_opt(h.p50),
                format_micros_opt(h.p90),
                format_micros_opt(h.p95),
                format_micros_opt(h.p99),
                format_micros_opt(h.mean),
                format_micros_opt(h.max),
                h.count
            )
            .ok();
        }
        _ => out.push_str("  latency: n/a\n"),
    }

    render_checks(&report.metrics, &mut out);
    render_errors(&report.metrics, &mut out);
    render_metrics(&report.metrics, &mut out);
    render_thresholds(report, &mut out);

    out
}

fn tag<'a>(s: &'a MetricSeriesSummary, key: &str) -> Option<&'a str> {
    s.tags
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn render_checks(series: &[MetricSeriesSummary], out: &mut String) {
    let rows: Vec<(&str, u64, u64)> = series
        .iter()
        .filter(|s| s.name == CHECKS)
        .filter_map(|s| {
            let name = tag(s, TAG_CHECK)?;
            match s.values {
                MetricValue::Rate { total, hits, .. } => {
                    Some((name, hits, total.saturating_sub(hits)))
                }
                _ => None,
            }
        })
        .collect();

    if rows.is_empty() {
        return;
    }

    out.push_str("\nchecks\n");
    for (name, pass, fail) in rows {
        let status = if fail > 0 { "FAIL" } else { "OK" };
        writeln!(out, "  {name}: pass={pass} fail={fail} [{status}]").ok();
    }
}

fn render_errors(series: &[MetricSeriesSummary], out: &mut String) {
    let mut rows: Vec<(&str, u64)> = series
        .iter()
        .filter(|s| s.name == HTTP_REQ_ERRORS)
        .filter_map(|s| match s.values {
            MetricValue::Counter(n) if n > 0 => Some((tag(s, TAG_ERROR)?, n)),
            _ => None,
        })
        .collect();

    if rows.is_empty() {
        return;
    }

    rows.sort_by(|(a_name, a), (b_name, b)| b.cmp(a).then_with(|| a_name.cmp(b_name)));

    out.push_str("\nerrors\n");
    for (label, count) in rows {
        writeln!(out, "  {label}: {count}").ok();
    }
}

fn render_metrics(series: &[MetricSeriesSummary], out: &mut String) {
    out.push_str("\nmetrics\n");

    // `vus` correctly ends at 0; show it next to its peak instead.
    let vus_peak = series
        .iter()
        .find(|s| s.name == VUS_MAX && s.tags.is_empty())
        .and_then(|s| match s.values {
            MetricValue::Gauge(v) => Some(v),
            _ => None,
        });

    for s in series {
        let is_check_detail = s.name == CHECKS && !s.tags.is_empty();
        if is_check_detail || s.name == HTTP_REQ_ERRORS {
            continue;
        }
        if s.name == VUS_MAX && vus_peak.is_some() {
            continue;
        }

        let key = s.key();
        match &s.values {
            MetricValue::Gauge(end) if s.name == VUS => match vus_peak {
                Some(peak) => writeln!(out, "  {key} = end={end} peak={peak}").ok(),
                None => writeln!(out, "  {key} = {end}").ok(),
            },
            MetricValue::Counter(v) => writeln!(out, "  {key} = {v}").ok(),
            MetricValue::Gauge(v) => writeln!(out, "  {key} = {v}").ok(),
            MetricValue::Rate { total, hits, rate } => match rate {
                Some(rate) => {
                    writeln!(out, "  {key} = hits={hits} total={total} rate={rate:.4}").ok()
                }
                None => writeln!(out, "  {key} = hits={hits} total={total}").ok(),
            },
            MetricValue::Trend(h) => writeln!(
                out,
                "  {key} = avg={} min={} med={} max={} p90={} p95={} (n={})",
                format_micros_opt(h.mean),
                format_micros_opt(h.min),
                format_micros_opt(h.p50),
                format_micros_opt(h.max),
                format_micros_opt(h.p90),
                format_micros_opt(h.p95),
                h.count
            )
            .ok(),
        };
    }
}

fn render_thresholds(report: &RunReport, out: &mut String) {
    if report.thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for t in &report.thresholds {
        let status = if t.passed { "OK" } else { "FAIL" };
        match t.observed {
            Some(obs) => writeln!(
                out,
                "  {}: {} observed={obs:.4} [{status}]",
                t.metric, t.expression
            )
            .ok(),
            None => writeln!(out, "  {}: {} observed=- [{status}]", t.metric, t.expression).ok(),
        };
    }
}
