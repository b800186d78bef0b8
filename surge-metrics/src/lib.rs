pub mod agg;
pub mod key;
pub mod metrics;
pub mod registry;
pub mod tags;

pub use agg::{Query, RunningStats, counter_delta, per_sec};
pub use key::KeyId;
pub use metrics::{
    MetricHandle, MetricKind, MetricSeriesSummary, MetricValue, ShardedHistogram, TrendSummary,
};
pub use registry::{MetricId, Registry};
pub use tags::TagSet;
