use std::collections::HashMap;
use std::sync::atomic::Ordering;

use crate::key::KeyId;
use crate::metrics::MetricStorage;
use crate::registry::{MetricId, Registry};

/// Streaming mean, sample standard deviation and max of a series of samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunningStats {
    n: u64,
    mean: f64,
    m2: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        self.n = self.n.saturating_add(1);
        let before = self.mean;
        self.mean = before + (x - before) / self.n as f64;
        self.m2 += (x - before) * (x - self.mean);
        self.max = self.max.max(x);
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stdev(&self) -> f64 {
        match self.n {
            0 | 1 => 0.0,
            n => (self.m2 / (n - 1) as f64).sqrt(),
        }
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// Growth of a monotonic counter between two reads; a reset reads as zero.
#[inline]
pub fn counter_delta(current: u64, previous: u64) -> u64 {
    current.saturating_sub(previous)
}

#[inline]
pub fn per_sec(delta: u64, dt_secs: f64) -> f64 {
    delta as f64 / dt_secs.max(1e-9)
}

/// Read over the series of one metric, bucketed by the value of one tag.
///
/// Series that do not carry the tag are skipped.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    registry: &'a Registry,
    metric: MetricId,
    tag: KeyId,
}

impl<'a> Query<'a> {
    pub(crate) fn new(registry: &'a Registry, metric: MetricId, tag: KeyId) -> Self {
        Self {
            registry,
            metric,
            tag,
        }
    }

    fn fold<T: Default>(self, mut add: impl FnMut(&mut T, &MetricStorage)) -> HashMap<KeyId, T> {
        let mut out: HashMap<KeyId, T> = HashMap::new();
        self.registry.visit_series(self.metric, |tags, storage| {
            if let Some(value) = tags.get(self.tag) {
                add(out.entry(value).or_default(), storage);
            }
        });
        out
    }

    /// Counter totals per tag value.
    pub fn counters(self) -> HashMap<KeyId, u64> {
        self.fold(|acc: &mut u64, storage| {
            if let MetricStorage::Counter(c) = storage {
                *acc = acc.saturating_add(c.load(Ordering::Relaxed));
            }
        })
    }

    /// `(total, hits)` per tag value.
    pub fn rates(self) -> HashMap<KeyId, (u64, u64)> {
        self.fold(|acc: &mut (u64, u64), storage| {
            if let MetricStorage::Rate(r) = storage {
                let (total, hits) = r.load();
                acc.0 = acc.0.saturating_add(total);
                acc.1 = acc.1.saturating_add(hits);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;
    use crate::tags::TagSet;

    #[test]
    fn counter_delta_clamps_resets() {
        assert_eq!(counter_delta(10, 7), 3);
        assert_eq!(counter_delta(10, 0), 10);
        assert_eq!(counter_delta(10, 999), 0);
        assert!((per_sec(3, 1.0) - 3.0).abs() < 1e-9);
        assert!(per_sec(10, 0.0).is_finite());
    }

    #[test]
    fn running_stats_matches_textbook_values() {
        let mut s = RunningStats::default();
        assert_eq!(s.stdev(), 0.0);
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            s.push(x);
        }
        assert_eq!(s.count(), 8);
        assert!((s.mean() - 5.0).abs() < 1e-9);
        assert!((s.stdev() - 2.138_089_935).abs() < 1e-6);
        assert_eq!(s.max(), 9.0);
    }

    #[test]
    fn counters_bucket_by_tag_and_skip_untagged() {
        let reg = Registry::default();
        let metric = reg.register("http_req_errors", MetricKind::Counter);
        let error = reg.resolve_key("error");

        for (label, n) in [("http_500", 4), ("error:timeout", 2)] {
            if let Some(h) = reg.get_handle(metric, reg.resolve_tags(&[("error", label)])) {
                h.increment(n);
            }
        }
        if let Some(h) = reg.get_handle(metric, TagSet::default()) {
            h.increment(100);
        }

        let by_label = reg.query(metric, error).counters();
        assert_eq!(by_label.len(), 2);
        assert_eq!(by_label.get(&reg.resolve_key("http_500")), Some(&4));
        assert_eq!(by_label.values().sum::<u64>(), 6);
    }

    #[test]
    fn rates_bucket_by_tag() {
        let reg = Registry::default();
        let metric = reg.register("checks", MetricKind::Rate);
        let check = reg.resolve_key("check");

        if let Some(h) = reg.get_handle(metric, reg.resolve_tags(&[("check", "a")])) {
            h.add_rate(3, 4);
        }
        if let Some(h) = reg.get_handle(metric, reg.resolve_tags(&[("check", "b")])) {
            h.add_rate(1, 4);
        }

        let by_name = reg.query(metric, check).rates();
        assert_eq!(by_name.get(&reg.resolve_key("a")), Some(&(4, 3)));
        assert_eq!(by_name.get(&reg.resolve_key("b")), Some(&(4, 1)));
    }
}
