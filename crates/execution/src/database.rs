//! Key-value state accessor.
//!
//! The execution core reads and writes all state through [`KvStore`], a flat
//! byte-keyed store. [`MemoryStore`] is the in-process implementation used by
//! tests and development setups. [`Overlay`] is a scoped view over any store:
//! writes stay private until the overlay is closed with `commit = true`, and
//! every key fetched from the base is recorded so parallel runs can be checked
//! for conflicts.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// Byte-keyed store backing all account, code, storage and queue records.
///
/// Implementations must be safe to read from several threads at once.
/// Serializing conflicting writes is the caller's job.
pub trait KvStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Write a value.
    fn set(&self, key: &[u8], value: Vec<u8>);

    /// Remove a value.
    fn delete(&self, key: &[u8]);
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        (**self).get(key)
    }

    fn set(&self, key: &[u8], value: Vec<u8>) {
        (**self).set(key, value)
    }

    fn delete(&self, key: &[u8]) {
        (**self).delete(key)
    }
}

/// In-memory store for testing and development.
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of every entry, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &[u8], value: Vec<u8>) {
        self.entries.insert(key.to_vec(), value);
    }

    fn delete(&self, key: &[u8]) {
        self.entries.remove(key);
    }
}

/// Keys read from the base and writes buffered by one [`Overlay`].
///
/// `None` in `writes` marks a deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayDiff {
    /// Keys fetched from the base store.
    pub reads: BTreeSet<Vec<u8>>,
    /// Buffered writes.
    pub writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl OverlayDiff {
    /// Whether any read or written key is in `written`.
    pub fn conflicts_with(&self, written: &HashSet<Vec<u8>>) -> bool {
        self.reads.iter().any(|k| written.contains(k))
            || self.writes.keys().any(|k| written.contains(k))
    }

    /// Write the buffered changes to `store`, recording each key in `written`.
    pub fn apply_to(self, store: &dyn KvStore, written: &mut HashSet<Vec<u8>>) {
        for (key, value) in self.writes {
            match value {
                Some(value) => store.set(&key, value),
                None => store.delete(&key),
            }
            written.insert(key);
        }
    }
}

/// Scoped, write-buffering view over a [`KvStore`].
pub struct Overlay<'a> {
    base: &'a dyn KvStore,
    pending: RwLock<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
    reads: RwLock<BTreeSet<Vec<u8>>>,
}

impl<'a> Overlay<'a> {
    /// Open an overlay over `base`.
    pub fn new(base: &'a dyn KvStore) -> Self {
        Self {
            base,
            pending: RwLock::new(BTreeMap::new()),
            reads: RwLock::new(BTreeSet::new()),
        }
    }

    /// Close the overlay, writing buffered changes to the base if `commit`.
    pub fn close(self, commit: bool) {
        if !commit {
            return;
        }
        for (key, value) in self.pending.into_inner() {
            match value {
                Some(value) => self.base.set(&key, value),
                None => self.base.delete(&key),
            }
        }
    }

    /// Close the overlay without writing, handing back what it touched.
    pub fn into_diff(self) -> OverlayDiff {
        OverlayDiff {
            reads: self.reads.into_inner(),
            writes: self.pending.into_inner(),
        }
    }

    /// Drop buffered writes and recorded reads, keeping the overlay open.
    pub fn clear_pending(&self) {
        self.pending.write().clear();
        self.reads.write().clear();
    }

    /// Number of buffered writes.
    pub fn pending_len(&self) -> usize {
        self.pending.read().len()
    }
}

impl KvStore for Overlay<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(value) = self.pending.read().get(key) {
            return value.clone();
        }
        self.reads.write().insert(key.to_vec());
        self.base.get(key)
    }

    fn set(&self, key: &[u8], value: Vec<u8>) {
        self.pending.write().insert(key.to_vec(), Some(value));
    }

    fn delete(&self, key: &[u8]) {
        self.pending.write().insert(key.to_vec(), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_basic() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set(b"a", vec![1]);
        assert_eq!(store.get(b"a"), Some(vec![1]));
        assert_eq!(store.len(), 1);

        store.delete(b"a");
        assert_eq!(store.get(b"a"), None);
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.set(b"k", vec![7]);
        assert_eq!(other.get(b"k"), Some(vec![7]));
    }

    #[test]
    fn test_overlay_reads_through_and_buffers() {
        let store = MemoryStore::new();
        store.set(b"a", vec![1]);

        let overlay = Overlay::new(&store);
        assert_eq!(overlay.get(b"a"), Some(vec![1]));
        overlay.set(b"a", vec![2]);
        overlay.set(b"b", vec![3]);
        assert_eq!(overlay.get(b"a"), Some(vec![2]));
        assert_eq!(store.get(b"a"), Some(vec![1]));
        assert_eq!(store.get(b"b"), None);

        overlay.close(true);
        assert_eq!(store.get(b"a"), Some(vec![2]));
        assert_eq!(store.get(b"b"), Some(vec![3]));
    }

    #[test]
    fn test_overlay_discard() {
        let store = MemoryStore::new();
        store.set(b"a", vec![1]);

        let overlay = Overlay::new(&store);
        overlay.delete(b"a");
        assert_eq!(overlay.get(b"a"), None);
        overlay.close(false);
        assert_eq!(store.get(b"a"), Some(vec![1]));
    }

    #[test]
    fn test_overlay_diff_records_base_reads_only() {
        let store = MemoryStore::new();
        let overlay = Overlay::new(&store);
        overlay.set(b"w", vec![1]);
        let _ = overlay.get(b"w");
        let _ = overlay.get(b"r");

        let diff = overlay.into_diff();
        assert!(diff.reads.contains(b"r".as_slice()));
        assert!(!diff.reads.contains(b"w".as_slice()));
        assert_eq!(diff.writes.get(b"w".as_slice()), Some(&Some(vec![1])));
    }

    #[test]
    fn test_overlay_diff_conflicts_and_apply() {
        let store = MemoryStore::new();
        let overlay = Overlay::new(&store);
        let _ = overlay.get(b"x");
        overlay.set(b"y", vec![9]);
        let diff = overlay.into_diff();

        let mut written = HashSet::new();
        assert!(!diff.conflicts_with(&written));
        written.insert(b"x".to_vec());
        assert!(diff.conflicts_with(&written));

        let mut applied = HashSet::new();
        diff.apply_to(&store, &mut applied);
        assert_eq!(store.get(b"y"), Some(vec![9]));
        assert!(applied.contains(b"y".as_slice()));
    }

    #[test]
    fn test_overlays_stack() {
        let store = MemoryStore::new();
        let outer = Overlay::new(&store);
        outer.set(b"a", vec![1]);
        {
            let inner = Overlay::new(&outer);
            assert_eq!(inner.get(b"a"), Some(vec![1]));
            inner.set(b"a", vec![2]);
            inner.close(true);
        }
        assert_eq!(outer.get(b"a"), Some(vec![2]));
        assert_eq!(store.get(b"a"), None);
    }
}
