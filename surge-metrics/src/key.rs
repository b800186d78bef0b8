use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

/// Interned identifier for a metric name, tag key or tag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<u32> for KeyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<KeyId> for u32 {
    fn from(v: KeyId) -> Self {
        v.0
    }
}

#[derive(Debug, Default)]
struct Table {
    ids: AHashMap<Arc<str>, KeyId>,
    names: Vec<Arc<str>>,
}

/// String interner shared by every series of a registry.
///
/// Lookups of already-known strings only take the read lock, so the hot path of
/// recording a sample with a fixed tag set never contends on a writer.
#[derive(Debug, Default)]
pub struct Interner {
    table: RwLock<Table>,
}

impl Interner {
    pub fn get_or_intern(&self, s: &str) -> KeyId {
        if let Some(&id) = self.table.read().ids.get(s) {
            return id;
        }

        let mut table = self.table.write();
        if let Some(&id) = table.ids.get(s) {
            return id;
        }

        let id = KeyId(table.names.len() as u32);
        let s: Arc<str> = Arc::from(s);
        table.names.push(s.clone());
        table.ids.insert(s, id);
        id
    }

    pub fn get(&self, s: &str) -> Option<KeyId> {
        self.table.read().ids.get(s).copied()
    }

    pub fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.table.read().names.get(id.0 as usize).cloned()
    }
}
