use std::time::{Duration, SystemTime};

use surge_metrics::{MetricSeriesSummary, MetricValue};

use crate::thresholds_eval::ThresholdOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Most executors running at once, draining ones included.
    pub peak: u64,
    pub spawned: u64,
    pub retired: u64,
    /// Executors still running when the hard stop fired.
    pub forced_stops: u64,
    /// Executors that exited by abandoning a request.
    pub interrupted: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Passed,
    ThresholdsBreached,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub scenario: String,
    pub target_url: String,
    pub started_at: SystemTime,
    pub duration: Duration,
    /// Sorted by name then tags.
    pub metrics: Vec<MetricSeriesSummary>,
    pub thresholds: Vec<ThresholdOutcome>,
    pub executors: ExecutorStats,
    pub status: RunStatus,
}

impl RunReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }

    /// Series by key, e.g. `http_req_duration{expected_response:true}`.
    pub fn metric(&self, key: &str) -> Option<&MetricSeriesSummary> {
        self.metrics.iter().find(|m| m.key() == key)
    }

    pub fn counter(&self, key: &str) -> Option<u64> {
        match self.metric(key)?.values {
            MetricValue::Counter(n) => Some(n),
            _ => None,
        }
    }

    /// `(total, hits)` of a rate series.
    pub fn rate(&self, key: &str) -> Option<(u64, u64)> {
        match self.metric(key)?.values {
            MetricValue::Rate { total, hits, .. } => Some((total, hits)),
            _ => None,
        }
    }
}
