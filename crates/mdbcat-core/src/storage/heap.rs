//! In-memory multi-version record store.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::types::{Record, RecordId, Timestamp, TxnId};

use super::checkpoint::{self, CheckpointContents};
use super::record_store::{RecordCursor, RecordStore};
use super::recovery_unit::{Change, ReadView, RecoveryUnit};
use super::version::{self, RecordVersion, Stamp};

type VersionMap = BTreeMap<RecordId, Vec<RecordVersion>>;

/// A [`RecordStore`] keeping every record's version chain in memory.
///
/// Record ids come from an atomic counter starting at 1 and are never
/// handed out twice, even when the inserting unit aborts.
pub struct HeapRecordStore {
    ident: String,
    records: Mutex<VersionMap>,
    next_id: AtomicU64,
}

impl HeapRecordStore {
    pub fn new(ident: impl Into<String>) -> Self {
        Self {
            ident: ident.into(),
            records: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Restore a store from a checkpoint file. Every record is committed at
    /// stamp 0, so any recovery unit can read it.
    pub fn open_checkpoint(path: &Path) -> Result<Self, StorageError> {
        let contents = checkpoint::read_checkpoint(path)?;
        let records = contents
            .records
            .into_iter()
            .map(|(id, data)| (id, vec![RecordVersion::new(Stamp::Committed(0), data)]))
            .collect();
        debug!(ident = %contents.ident, path = %path.display(), "opened checkpoint");
        Ok(Self {
            ident: contents.ident,
            records: Mutex::new(records),
            next_id: AtomicU64::new(contents.next_id),
        })
    }

    /// Write the latest committed version of every record to `path`.
    pub fn checkpoint(&self, path: &Path) -> Result<usize, StorageError> {
        let records = self.committed_records();
        let count = records.len();
        checkpoint::write_checkpoint(
            path,
            &CheckpointContents {
                ident: self.ident.clone(),
                next_id: self.next_id.load(Ordering::SeqCst),
                records,
            },
        )?;
        Ok(count)
    }

    /// Latest committed bytes of every live record, in id order.
    pub fn committed_records(&self) -> Vec<(RecordId, Vec<u8>)> {
        let view = ReadView::latest_committed();
        self.records
            .lock()
            .iter()
            .filter_map(|(id, chain)| version::find_visible(chain, &view).map(|v| (*id, v.data.clone())))
            .collect()
    }

    /// Prune versions invisible to every snapshot at or after
    /// `oldest_snapshot`. Returns the number of versions removed.
    pub fn reclaim(&self, oldest_snapshot: Option<Timestamp>) -> usize {
        let mut records = self.records.lock();
        let mut removed = 0;
        records.retain(|_, chain| {
            removed += version::prune(chain, oldest_snapshot);
            !chain.is_empty()
        });
        if removed > 0 {
            debug!(ident = %self.ident, removed, "reclaimed record versions");
        }
        removed
    }

    /// Total number of stored versions, including superseded ones.
    pub fn version_count(&self) -> usize {
        self.records.lock().values().map(Vec::len).sum()
    }

    fn register<'a>(&'a self, ru: &mut RecoveryUnit<'a>, id: RecordId, kind: WriteKind) {
        ru.register_change(Box::new(RecordChange {
            store: self,
            id,
            txn: ru.txn_id(),
            kind,
        }));
    }

    /// Check that `view` may write to `id` and return its chain.
    fn writable<'m>(
        records: &'m mut VersionMap,
        id: RecordId,
        view: &ReadView,
    ) -> Result<&'m mut Vec<RecordVersion>, StorageError> {
        let chain = records
            .get_mut(&id)
            .ok_or(StorageError::RecordNotFound(id))?;
        if version::conflicts(chain, view) {
            return Err(StorageError::WriteConflict(id));
        }
        match chain.last() {
            Some(latest) if latest.is_visible(view) => Ok(chain),
            _ => Err(StorageError::RecordNotFound(id)),
        }
    }

    fn delete_visible<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        bounds: (Bound<RecordId>, Bound<RecordId>),
    ) -> Result<u64, StorageError> {
        let view = ru.view();
        let deleted = {
            let mut records = self.records.lock();
            let ids: Vec<RecordId> = records
                .range(bounds)
                .filter(|(_, chain)| version::find_visible(chain, &view).is_some())
                .map(|(id, _)| *id)
                .collect();
            // Check every record before stamping any, so a conflict leaves
            // nothing half-deleted.
            for id in &ids {
                Self::writable(&mut records, *id, &view)?;
            }
            for id in &ids {
                if let Some(latest) = records.get_mut(id).and_then(|chain| chain.last_mut()) {
                    latest.stop = Some(Stamp::Pending(view.txn_id));
                }
            }
            ids
        };
        for id in &deleted {
            self.register(ru, *id, WriteKind::Delete);
        }
        Ok(deleted.len() as u64)
    }
}

impl RecordStore for HeapRecordStore {
    fn ident(&self) -> &str {
        &self.ident
    }

    fn insert_record<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        data: &[u8],
    ) -> Result<RecordId, StorageError> {
        let id = RecordId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.records.lock().insert(
            id,
            vec![RecordVersion::new(Stamp::Pending(ru.txn_id()), data.to_vec())],
        );
        self.register(ru, id, WriteKind::Insert);
        Ok(id)
    }

    fn update_record<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        id: RecordId,
        data: &[u8],
    ) -> Result<(), StorageError> {
        let view = ru.view();
        {
            let mut records = self.records.lock();
            let chain = Self::writable(&mut records, id, &view)?;
            if let Some(latest) = chain.last_mut() {
                latest.stop = Some(Stamp::Pending(view.txn_id));
            }
            chain.push(RecordVersion::new(Stamp::Pending(view.txn_id), data.to_vec()));
        }
        self.register(ru, id, WriteKind::Update);
        Ok(())
    }

    fn delete_record<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        id: RecordId,
    ) -> Result<(), StorageError> {
        let view = ru.view();
        {
            let mut records = self.records.lock();
            let chain = Self::writable(&mut records, id, &view)?;
            if let Some(latest) = chain.last_mut() {
                latest.stop = Some(Stamp::Pending(view.txn_id));
            }
        }
        self.register(ru, id, WriteKind::Delete);
        Ok(())
    }

    fn find_record(
        &self,
        ru: &RecoveryUnit<'_>,
        id: RecordId,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let view = ru.view();
        let records = self.records.lock();
        Ok(records
            .get(&id)
            .and_then(|chain| version::find_visible(chain, &view))
            .map(|v| v.data.clone()))
    }

    fn get_cursor<'a>(&'a self, ru: &RecoveryUnit<'_>, forward: bool) -> Box<dyn RecordCursor + 'a> {
        Box::new(HeapCursor {
            store: self,
            view: ru.view(),
            forward,
            position: None,
        })
    }

    fn truncate<'a>(&'a self, ru: &mut RecoveryUnit<'a>) -> Result<u64, StorageError> {
        self.delete_visible(ru, (Bound::Unbounded, Bound::Unbounded))
    }

    fn range_truncate<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        min: RecordId,
        max: RecordId,
    ) -> Result<u64, StorageError> {
        if min > max {
            return Ok(0);
        }
        self.delete_visible(ru, (Bound::Included(min), Bound::Included(max)))
    }

    fn num_records(&self) -> u64 {
        self.records
            .lock()
            .values()
            .filter(|chain| chain.last().is_some_and(|v| v.stop.is_none()))
            .count() as u64
    }

    fn data_size(&self) -> u64 {
        self.records
            .lock()
            .values()
            .filter_map(|chain| chain.last().filter(|v| v.stop.is_none()))
            .map(|v| v.data.len() as u64)
            .sum()
    }
}

#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Insert,
    Update,
    Delete,
}

/// Stamps one write on commit, unwinds it on rollback.
struct RecordChange<'a> {
    store: &'a HeapRecordStore,
    id: RecordId,
    txn: TxnId,
    kind: WriteKind,
}

impl Change for RecordChange<'_> {
    fn commit(self: Box<Self>, commit_ts: Timestamp) {
        let mut records = self.store.records.lock();
        if let Some(chain) = records.get_mut(&self.id) {
            version::stamp_committed(chain, self.txn, commit_ts);
        }
    }

    fn rollback(self: Box<Self>) {
        let mut records = self.store.records.lock();
        let Some(chain) = records.get_mut(&self.id) else {
            return;
        };
        let pops = matches!(self.kind, WriteKind::Insert | WriteKind::Update);
        if pops && chain.last().is_some_and(|v| v.start.is_pending_for(self.txn)) {
            chain.pop();
        }
        let unstops = matches!(self.kind, WriteKind::Update | WriteKind::Delete);
        if unstops
            && let Some(latest) = chain.last_mut()
            && latest.stop.is_some_and(|s| s.is_pending_for(self.txn))
        {
            latest.stop = None;
        }
        if chain.is_empty() {
            records.remove(&self.id);
        }
    }
}

/// Cursor over a [`HeapRecordStore`] that re-reads the map on every step, so
/// it observes the unit's own writes made after it was opened.
struct HeapCursor<'a> {
    store: &'a HeapRecordStore,
    view: ReadView,
    forward: bool,
    position: Option<RecordId>,
}

impl HeapCursor<'_> {
    fn visible(&self, id: &RecordId, chain: &[RecordVersion]) -> Option<Record> {
        version::find_visible(chain, &self.view).map(|v| Record {
            id: *id,
            data: v.data.clone(),
        })
    }
}

impl RecordCursor for HeapCursor<'_> {
    fn next(&mut self) -> Result<Option<Record>, StorageError> {
        let store = self.store;
        let records = store.records.lock();
        let found = if self.forward {
            let lower = match self.position {
                Some(p) => Bound::Excluded(p),
                None => Bound::Unbounded,
            };
            records
                .range((lower, Bound::Unbounded))
                .find_map(|(id, chain)| self.visible(id, chain))
        } else {
            let upper = match self.position {
                Some(p) => Bound::Excluded(p),
                None => Bound::Unbounded,
            };
            records
                .range((Bound::Unbounded, upper))
                .rev()
                .find_map(|(id, chain)| self.visible(id, chain))
        };
        if let Some(record) = &found {
            self.position = Some(record.id);
        }
        Ok(found)
    }

    fn seek_exact(&mut self, id: RecordId) -> Result<Option<Record>, StorageError> {
        let store = self.store;
        let records = store.records.lock();
        self.position = Some(id);
        Ok(records.get(&id).and_then(|chain| self.visible(&id, chain)))
    }
}
