use smallvec::SmallVec;

use crate::key::KeyId;

/// Interned `(key, value)` tag pairs of one metric series, kept sorted by key.
///
/// Each key appears once; two sets with the same pairs hash and compare equal
/// whatever order they were built in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    pairs: SmallVec<[(KeyId, KeyId); 2]>,
}

impl TagSet {
    /// Builds a set from unordered pairs; the first value given for a key wins.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        let mut pairs: SmallVec<[(KeyId, KeyId); 2]> = pairs.into_iter().collect();
        pairs.sort_by_key(|(k, _)| *k);
        pairs.dedup_by_key(|(k, _)| *k);
        Self { pairs }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.pairs.iter().copied()
    }

    pub fn get(&self, key: KeyId) -> Option<KeyId> {
        self.pairs
            .binary_search_by_key(&key, |(k, _)| *k)
            .ok()
            .map(|idx| self.pairs[idx].1)
    }

    /// Copy of this set with `key` bound to `value`.
    #[must_use]
    pub fn with(&self, key: KeyId, value: KeyId) -> TagSet {
        let mut pairs = self.pairs.clone();
        match pairs.binary_search_by_key(&key, |(k, _)| *k) {
            Ok(idx) => pairs[idx].1 = value,
            Err(idx) => pairs.insert(idx, (key, value)),
        }
        TagSet { pairs }
    }
}
