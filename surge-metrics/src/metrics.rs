use std::hash::BuildHasher;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use hdrhistogram::Histogram;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Rate,
    Trend,
}

#[derive(Debug, Clone)]
pub struct MetricSeriesSummary {
    pub name: String,
    pub kind: MetricKind,
    pub tags: Vec<(String, String)>,
    pub values: MetricValue,
}

impl MetricSeriesSummary {
    /// Series key in selector form, e.g. `http_req_duration{expected_response:true}`.
    #[must_use]
    pub fn key(&self) -> String {
        if self.tags.is_empty() {
            return self.name.clone();
        }
        let inner = self
            .tags
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}{{{inner}}}", self.name)
    }
}

#[derive(Debug, Clone)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    Rate {
        total: u64,
        hits: u64,
        rate: Option<f64>,
    },
    Trend(TrendSummary),
}

/// Summary of a trend series. Values are in the unit they were recorded in
/// (microseconds for every built-in trend).
#[derive(Debug, Clone, Default)]
pub struct TrendSummary {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    /// Percentiles 1..=99.
    pub distribution: Vec<(u8, f64)>,
}

impl TrendSummary {
    /// Value at percentile `p` (1..=100). `p(100)` is the maximum.
    #[must_use]
    pub fn percentile(&self, p: u32) -> Option<f64> {
        match p {
            100 => self.max,
            1..=99 => self
                .distribution
                .iter()
                .find(|(q, _)| u32::from(*q) == p)
                .map(|(_, v)| *v),
            _ => None,
        }
    }
}

pub(crate) fn new_default_histogram() -> Histogram<u64> {
    // 1us .. 1h, three significant digits.
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

pub(crate) fn summarize_histogram(h: &Histogram<u64>) -> TrendSummary {
    let count = h.len();
    if count == 0 {
        return TrendSummary::default();
    }

    let at = |q: f64| h.value_at_quantile(q) as f64;

    TrendSummary {
        count,
        min: Some(h.min() as f64),
        max: Some(h.max() as f64),
        mean: Some(h.mean()),
        stdev: Some(h.stdev()),
        p50: Some(at(0.50)),
        p90: Some(at(0.90)),
        p95: Some(at(0.95)),
        p99: Some(at(0.99)),
        distribution: (1u8..=99).map(|p| (p, at(f64::from(p) / 100.0))).collect(),
    }
}

/// Trend storage split into independently locked shards.
///
/// Each recording thread hashes to one shard, so concurrent virtual users on
/// different worker threads rarely touch the same mutex. Snapshots merge all
/// shards; merging is order independent.
#[derive(Debug)]
pub struct ShardedHistogram {
    shards: Box<[Mutex<Histogram<u64>>]>,
}

thread_local! {
    static THREAD_HASH: u64 = BuildHasher::hash_one(
        &ahash::RandomState::with_seeds(0x5eed_0001, 0x5eed_0002, 0x5eed_0003, 0x5eed_0004),
        std::thread::current().id(),
    );
}

impl ShardedHistogram {
    #[must_use]
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards)
                .map(|_| Mutex::new(new_default_histogram()))
                .collect(),
        }
    }

    #[must_use]
    pub fn with_default_shards() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(n.next_power_of_two().min(64))
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn record(&self, value: u64) {
        let idx = THREAD_HASH.with(|h| *h as usize) % self.shards.len();
        self.shards[idx].lock().saturating_record(value.max(1));
    }

    pub fn len(&self) -> u64 {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn merge_into(&self, acc: &mut Histogram<u64>) {
        for shard in self.shards.iter() {
            let _ = acc.add(&*shard.lock());
        }
    }

    pub fn snapshot(&self) -> Histogram<u64> {
        let mut acc = new_default_histogram();
        self.merge_into(&mut acc);
        acc
    }

    pub fn summarize(&self) -> TrendSummary {
        summarize_histogram(&self.snapshot())
    }
}

/// Hits are published after their total and read before it, so a
/// concurrent read never sees `hits > total`.
#[derive(Debug, Default)]
pub struct Rate {
    total: AtomicU64,
    hits: AtomicU64,
}

impl Rate {
    pub fn add(&self, hits: u64, total: u64) {
        self.total.fetch_add(total, Ordering::Relaxed);
        self.hits.fetch_add(hits, Ordering::Release);
    }

    /// Returns `(total, hits)`.
    pub fn load(&self) -> (u64, u64) {
        let hits = self.hits.load(Ordering::Acquire);
        let total = self.total.load(Ordering::Relaxed);
        (total, hits)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum MetricStorage {
    Counter(Arc<AtomicU64>),
    // Gauges may go negative transiently while a drop guard races a reader.
    Gauge(Arc<AtomicI64>),
    Rate(Arc<Rate>),
    Trend(Arc<ShardedHistogram>),
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Gauge => Self::Gauge(Arc::new(AtomicI64::new(0))),
            MetricKind::Rate => Self::Rate(Arc::new(Rate::default())),
            MetricKind::Trend => Self::Trend(Arc::new(ShardedHistogram::with_default_shards())),
        }
    }

    pub(crate) fn handle(&self) -> MetricHandle {
        match self {
            Self::Counter(a) => MetricHandle::Counter(a.clone()),
            Self::Gauge(a) => MetricHandle::Gauge(a.clone()),
            Self::Rate(a) => MetricHandle::Rate(a.clone()),
            Self::Trend(a) => MetricHandle::Trend(a.clone()),
        }
    }

    pub(crate) fn value(&self) -> MetricValue {
        match self {
            Self::Counter(a) => MetricValue::Counter(a.load(Ordering::Relaxed)),
            Self::Gauge(a) => MetricValue::Gauge(a.load(Ordering::Relaxed)),
            Self::Rate(r) => {
                let (total, hits) = r.load();
                let rate = (total > 0).then(|| hits as f64 / total as f64);
                MetricValue::Rate { total, hits, rate }
            }
            Self::Trend(h) => MetricValue::Trend(h.summarize()),
        }
    }
}

/// Cheap, cloneable write handle to one metric series.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Rate(Arc<Rate>),
    Trend(Arc<ShardedHistogram>),
}

impl MetricHandle {
    #[inline]
    pub fn increment(&self, value: u64) {
        if let Self::Counter(c) = self {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn set_gauge(&self, value: i64) {
        if let Self::Gauge(g) = self {
            g.store(value, Ordering::Relaxed);
        }
    }

    /// Adds `delta` and returns the new value.
    #[inline]
    pub fn add_gauge(&self, delta: i64) -> i64 {
        match self {
            Self::Gauge(g) => g.fetch_add(delta, Ordering::Relaxed).saturating_add(delta),
            _ => 0,
        }
    }

    /// Raises the gauge to `value` if it is currently lower.
    #[inline]
    pub fn raise_gauge(&self, value: i64) {
        if let Self::Gauge(g) = self {
            g.fetch_max(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_rate(&self, hits: u64, total: u64) {
        if let Self::Rate(r) = self {
            r.add(hits, total);
        }
    }

    #[inline]
    pub fn observe(&self, value: u64) {
        if let Self::Trend(h) = self {
            h.record(value);
        }
    }

    pub fn get_counter(&self) -> u64 {
        match self {
            Self::Counter(c) => c.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    pub fn get_gauge(&self) -> i64 {
        match self {
            Self::Gauge(g) => g.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    /// Returns `(total, hits)`.
    pub fn get_rate(&self) -> (u64, u64) {
        match self {
            Self::Rate(r) => r.load(),
            _ => (0, 0),
        }
    }
}
