mod aggregator;
mod checks;
mod config;
mod error;
mod executor;
mod progress;
mod report;
mod run;
mod schedule;
mod scheduler;
mod thresholds;
mod thresholds_eval;

pub use aggregator::{
    AggregateTotals, Aggregator, BUILTIN_METRICS, OutcomeError, RequestOutcome,
    builtin_metric_kind,
};
pub use checks::{Check, CheckSubject, ExpectedStatuses};
pub use config::{
    EnvVars, RampMode, RunConfig, RunOptions, SignedDuration, Stage, StageOptions,
    expand_placeholders,
};
pub use error::{ConfigError, Error, Result};
pub use executor::{ExecutorExit, ExecutorHandle, RetireSignal};
pub use progress::{LiveMetrics, ProgressFn, ProgressUpdate, StageProgress};
pub use report::{ExecutorStats, RunReport, RunStatus};
pub use run::{RunHooks, run};
pub use schedule::{RampSchedule, StageSnapshot};
pub use thresholds::{
    CompareOp, MetricSelector, Threshold, ThresholdAgg, ThresholdExpr, ThresholdSet,
    compile_thresholds, parse_threshold_expr,
};
pub use thresholds_eval::{ThresholdOutcome, evaluate_thresholds};

/// Metric names recorded by every run.
pub mod metric_names {
    pub use crate::aggregator::{
        CHECKS, DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_ERRORS, HTTP_REQ_FAILED,
        HTTP_REQS, ITERATION_DURATION, ITERATIONS, ITERATIONS_INTERRUPTED, TAG_CHECK, TAG_ERROR,
        TAG_EXPECTED_RESPONSE, VUS, VUS_MAX,
    };
}

pub use surge_metrics::{MetricKind, MetricSeriesSummary, MetricValue, TrendSummary};
