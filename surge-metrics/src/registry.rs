use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::agg::Query;
use crate::key::{Interner, KeyId};
use crate::metrics::{MetricHandle, MetricKind, MetricSeriesSummary, MetricStorage};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug)]
struct MetricDef {
    name: KeyId,
    kind: MetricKind,
}

/// Concurrent store of named metrics, each split into tagged series.
///
/// Writers obtain a [`MetricHandle`] once and then update atomics (or a
/// sharded histogram) without touching the registry maps again.
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    storage: DashMap<MetricId, DashMap<TagSet, MetricStorage>>,
}

impl Registry {
    /// Registers `name` or returns the existing id. The kind of an existing
    /// metric is never changed.
    pub fn register(&self, name: &str, kind: MetricKind) -> MetricId {
        let name_id = self.interner.get_or_intern(name);

        let mut defs = self.defs.write();
        if let Some(idx) = defs.iter().position(|d| d.name == name_id) {
            return MetricId(idx as u32);
        }

        let id = MetricId(defs.len() as u32);
        defs.push(MetricDef {
            name: name_id,
            kind,
        });
        self.storage.insert(id, DashMap::new());
        id
    }

    pub fn lookup(&self, name: &str) -> Option<(MetricId, MetricKind)> {
        let name_id = self.interner.get(name)?;
        let defs = self.defs.read();
        defs.iter()
            .position(|d| d.name == name_id)
            .map(|idx| (MetricId(idx as u32), defs[idx].kind))
    }

    pub fn kind(&self, metric: MetricId) -> Option<MetricKind> {
        self.defs.read().get(metric.0 as usize).map(|d| d.kind)
    }

    pub fn resolve_key(&self, key: &str) -> KeyId {
        self.interner.get_or_intern(key)
    }

    pub fn resolve_key_id(&self, id: KeyId) -> Option<Arc<str>> {
        self.interner.resolve(id)
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        TagSet::from_pairs(
            tags.iter()
                .map(|(k, v)| (self.resolve_key(k), self.resolve_key(v))),
        )
    }

    /// Returns the handle for `(metric, tags)`, creating the series on first use.
    pub fn get_handle(&self, metric: MetricId, tags: TagSet) -> Option<MetricHandle> {
        let kind = self.kind(metric)?;
        let series_map = self.storage.get(&metric)?;

        if let Some(storage) = series_map.get(&tags) {
            return Some(storage.handle());
        }

        let storage = series_map
            .entry(tags)
            .or_insert_with(|| MetricStorage::new(kind));
        Some(storage.handle())
    }

    /// Registers `name` if needed and returns the handle of its `tags` series.
    pub fn series_handle(&self, name: &str, kind: MetricKind, tags: TagSet) -> MetricHandle {
        let metric = self.register(name, kind);
        let kind = self.kind(metric).unwrap_or(kind);
        self.storage
            .entry(metric)
            .or_default()
            .entry(tags)
            .or_insert_with(|| MetricStorage::new(kind))
            .handle()
    }

    pub(crate) fn visit_series(&self, metric: MetricId, mut f: impl FnMut(&TagSet, &MetricStorage)) {
        let Some(series_map) = self.storage.get(&metric) else {
            return;
        };
        for series in series_map.iter() {
            f(series.key(), series.value());
        }
    }

    /// Reads `metric` bucketed by the value of the `tag` key.
    pub fn query(&self, metric: MetricId, tag: KeyId) -> Query<'_> {
        Query::new(self, metric, tag)
    }

    fn resolve_string(&self, id: KeyId) -> String {
        self.interner
            .resolve(id)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    /// Point-in-time summary of every series, sorted by name then tags.
    pub fn summarize(&self) -> Vec<MetricSeriesSummary> {
        let mut out = Vec::new();
        let defs = self.defs.read();

        for entry in self.storage.iter() {
            let Some(def) = defs.get(entry.key().0 as usize) else {
                continue;
            };
            let name = self.resolve_string(def.name);

            for series in entry.value().iter() {
                let tags = series
                    .key()
                    .iter()
                    .map(|(k, v)| (self.resolve_string(k), self.resolve_string(v)))
                    .collect();

                out.push(MetricSeriesSummary {
                    name: name.clone(),
                    kind: def.kind,
                    tags,
                    values: series.value().value(),
                });
            }
        }

        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        out
    }
}
