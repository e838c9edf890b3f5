use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::types::Timestamp;

/// Tracks the read timestamps of open recovery units.
///
/// Several units may read at the same timestamp, so each timestamp carries a
/// reference count. Version reclamation uses
/// [`oldest_active`](Self::oldest_active) to decide which superseded record
/// versions no snapshot can still observe.
pub struct SnapshotTracker {
    active: Mutex<BTreeMap<Timestamp, usize>>,
}

impl SnapshotTracker {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register a snapshot at `read_ts`. The returned guard deregisters it
    /// when dropped.
    pub fn register(&self, read_ts: Timestamp) -> SnapshotGuard<'_> {
        *self.active.lock().entry(read_ts).or_insert(0) += 1;
        SnapshotGuard {
            tracker: self,
            read_ts,
        }
    }

    /// Return the oldest active read timestamp, or `None` if nothing is open.
    pub fn oldest_active(&self) -> Option<Timestamp> {
        self.active.lock().keys().next().copied()
    }

    /// Return the number of open snapshots.
    pub fn active_count(&self) -> usize {
        self.active.lock().values().sum()
    }

    fn release(&self, read_ts: Timestamp) {
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(&read_ts) {
            *count -= 1;
            if *count == 0 {
                active.remove(&read_ts);
            }
        }
    }
}

impl Default for SnapshotTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that deregisters a snapshot when dropped.
pub struct SnapshotGuard<'a> {
    tracker: &'a SnapshotTracker,
    read_ts: Timestamp,
}

impl SnapshotGuard<'_> {
    pub fn read_ts(&self) -> Timestamp {
        self.read_ts
    }
}

impl Drop for SnapshotGuard<'_> {
    fn drop(&mut self) {
        self.tracker.release(self.read_ts);
    }
}
