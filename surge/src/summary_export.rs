use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;
use serde_json::{Value, json};
use surge_core::metric_names::{CHECKS, TAG_CHECK};
use surge_core::{MetricValue, RunReport};

/// k6 `--summary-export` document.
#[derive(Debug, Serialize)]
pub(crate) struct SummaryExport {
    pub metrics: BTreeMap<String, BTreeMap<String, Value>>,
    pub root_group: RootGroup,
    pub state: ExportState,
}

#[derive(Debug, Serialize)]
pub(crate) struct RootGroup {
    pub name: String,
    pub path: String,
    pub checks: BTreeMap<String, ExportCheck>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct ExportCheck {
    pub name: String,
    pub path: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExportState {
    #[serde(rename = "testRunDurationMs")]
    pub test_run_duration_ms: f64,
    pub status: String,
}

pub(crate) fn build(report: &RunReport) -> SummaryExport {
    let secs = report.duration.as_secs_f64();
    let ms = |v: Option<f64>| json!(v.map(|us| us / 1_000.0));

    let mut metrics: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
    let mut checks = BTreeMap::new();

    for s in &report.metrics {
        let mut values = BTreeMap::new();
        match &s.values {
            MetricValue::Counter(n) => {
                let rate = if secs > 0.0 { *n as f64 / secs } else { 0.0 };
                values.insert("count".to_string(), json!(n));
                values.insert("rate".to_string(), json!(rate));
            }
            MetricValue::Gauge(v) => {
                values.insert("value".to_string(), json!(v));
            }
            MetricValue::Rate { total, hits, rate } => {
                values.insert("passes".to_string(), json!(hits));
                values.insert("fails".to_string(), json!(total.saturating_sub(*hits)));
                values.insert("value".to_string(), json!(rate.unwrap_or(0.0)));

                if s.name == CHECKS
                    && let Some((_, name)) = s.tags.iter().find(|(k, _)| k == TAG_CHECK)
                {
                    checks.insert(
                        name.clone(),
                        ExportCheck {
                            name: name.clone(),
                            path: format!("::{name}"),
                            passes: *hits,
                            fails: total.saturating_sub(*hits),
                        },
                    );
                }
            }
            MetricValue::Trend(h) => {
                values.insert("avg".to_string(), ms(h.mean));
                values.insert("min".to_string(), ms(h.min));
                values.insert("med".to_string(), ms(h.p50));
                values.insert("max".to_string(), ms(h.max));
                values.insert("p(90)".to_string(), ms(h.p90));
                values.insert("p(95)".to_string(), ms(h.p95));
            }
        }
        metrics.insert(s.key(), values);
    }

    for t in &report.thresholds {
        let entry = metrics.entry(t.metric.clone()).or_default();
        let thresholds = entry
            .entry("thresholds".to_string())
            .or_insert_with(|| json!({}));
        if let Some(map) = thresholds.as_object_mut() {
            map.insert(t.expression.clone(), json!({ "ok": t.passed }));
        }
    }

    SummaryExport {
        metrics,
        root_group: RootGroup {
            name: String::new(),
            path: String::new(),
            checks,
        },
        state: ExportState {
            test_run_duration_ms: secs * 1_000.0,
            status: report.status.to_string(),
        },
    }
}

pub(crate) async fn write(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let doc = build(report);
    let body = serde_json::to_vec_pretty(&doc).context("failed to encode summary export")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create summary export dir: {}", parent.display()))?;
    }
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("failed to write summary export: {}", path.display()))
}
