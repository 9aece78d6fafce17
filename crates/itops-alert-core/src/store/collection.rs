// ── Concurrent document collection ──
//
// Lock-free storage for one index of the in-memory store. Documents
// are keyed by primary id; scans clone matching documents out so no
// shard lock is held across an await.

use std::hash::Hash;

use dashmap::DashMap;

pub(crate) struct DocumentCollection<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    by_id: DashMap<K, T>,
}

impl<K, T> DocumentCollection<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            by_id: DashMap::new(),
        }
    }

    /// Insert or replace a document. Returns `true` if the id was new.
    pub(crate) fn upsert(&self, id: K, doc: T) -> bool {
        self.by_id.insert(id, doc).is_none()
    }

    pub(crate) fn get(&self, id: &K) -> Option<T> {
        self.by_id.get(id).map(|r| r.value().clone())
    }

    /// Documents for `ids` in request order; missing ids are skipped.
    pub(crate) fn get_many(&self, ids: &[K]) -> Vec<T> {
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Mutate a document in place. Returns `false` if the id is unknown.
    pub(crate) fn update<F>(&self, id: &K, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        match self.by_id.get_mut(id) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    /// Clone out every document matching `pred`.
    pub(crate) fn filter<P>(&self, pred: P) -> Vec<T>
    where
        P: Fn(&T) -> bool,
    {
        self.by_id
            .iter()
            .filter(|r| pred(r.value()))
            .map(|r| r.value().clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }
}
