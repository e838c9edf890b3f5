use std::collections::HashMap;

use parking_lot::Mutex;

use crate::types::{NamespaceString, RecordId};

use super::EntryIdentifier;

/// In-memory mirror of the catalog's record store, keyed by catalog id.
///
/// Every access takes the single mutex for the duration of one map operation
/// only. Lookups of ids the caller guarantees to exist panic when the id is
/// missing: a miss there is a bug, not a runtime condition.
#[derive(Debug, Default)]
pub struct EntryMap {
    entries: Mutex<HashMap<RecordId, EntryIdentifier>>,
}

impl EntryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the entry for `id`. Panics if absent.
    pub fn get(&self, id: RecordId) -> EntryIdentifier {
        match self.entries.lock().get(&id) {
            Some(entry) => entry.clone(),
            None => panic!("no catalog entry for {id}"),
        }
    }

    pub fn find(&self, id: RecordId) -> Option<EntryIdentifier> {
        self.entries.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Add a fresh entry. Panics if the id is already cached.
    pub fn insert(&self, entry: EntryIdentifier) {
        let mut entries = self.entries.lock();
        let id = entry.catalog_id;
        assert!(
            !entries.contains_key(&id),
            "catalog entry {id} is already cached"
        );
        entries.insert(id, entry);
    }

    /// Put back an entry removed earlier, replacing whatever is cached.
    pub fn restore(&self, entry: EntryIdentifier) {
        self.entries.lock().insert(entry.catalog_id, entry);
    }

    pub fn erase(&self, id: RecordId) -> Option<EntryIdentifier> {
        self.entries.lock().remove(&id)
    }

    /// Point `id` at `nss` and return the namespace it had. Panics if absent.
    pub fn rename(&self, id: RecordId, nss: NamespaceString) -> NamespaceString {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(&id) else {
            panic!("cannot rename missing catalog entry {id}");
        };
        std::mem::replace(&mut entry.nss, nss)
    }

    /// Load an entry during single-threaded initialization, without locking.
    pub fn populate(&mut self, entry: EntryIdentifier) {
        self.entries.get_mut().insert(entry.catalog_id, entry);
    }

    pub fn clear(&mut self) {
        self.entries.get_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of every cached entry, ordered by catalog id.
    pub fn snapshot(&self) -> Vec<EntryIdentifier> {
        let mut entries: Vec<_> = self.entries.lock().values().cloned().collect();
        entries.sort_by_key(|e| e.catalog_id);
        entries
    }
}
