//! Recovery units: the transactional context every catalog and record-store
//! operation runs in.
//!
//! A [`RecoveryUnit`] carries a transaction id and a read timestamp taken
//! from a shared [`TxnClock`]. Mutations register [`Change`]s against the
//! unit; on [`commit`](RecoveryUnit::commit) every change is committed in
//! registration order, on [`abort`](RecoveryUnit::abort) (or drop) every
//! change is rolled back in reverse order. Each change fires exactly once.

use parking_lot::Mutex;

use crate::types::{Timestamp, TxnId};

use super::snapshot::{SnapshotGuard, SnapshotTracker};

/// A compensating action registered against a recovery unit.
pub trait Change {
    /// Called once if the unit commits.
    fn commit(self: Box<Self>, commit_ts: Timestamp);
    /// Called once if the unit aborts.
    fn rollback(self: Box<Self>);
}

struct OnCommit<F>(F);

impl<F: FnOnce(Timestamp)> Change for OnCommit<F> {
    fn commit(self: Box<Self>, commit_ts: Timestamp) {
        (self.0)(commit_ts)
    }

    fn rollback(self: Box<Self>) {}
}

struct OnRollback<F>(F);

impl<F: FnOnce()> Change for OnRollback<F> {
    fn commit(self: Box<Self>, _commit_ts: Timestamp) {}

    fn rollback(self: Box<Self>) {
        (self.0)()
    }
}

struct ClockState {
    next_stamp: u64,
    /// Highest commit timestamp whose changes are fully applied.
    stable: Timestamp,
}

/// Hands out transaction ids and commit timestamps from a single counter.
///
/// Commits are serialized on `commit_lock` so that a newly opened unit never
/// reads at a timestamp whose changes are only partially applied.
pub struct TxnClock {
    state: Mutex<ClockState>,
    commit_lock: Mutex<()>,
    snapshots: SnapshotTracker,
}

impl TxnClock {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create a clock whose stable timestamp is `stable`. Used after loading
    /// a checkpoint whose records are committed at stamp 0.
    pub fn starting_at(stable: Timestamp) -> Self {
        Self {
            state: Mutex::new(ClockState {
                next_stamp: stable + 1,
                stable,
            }),
            commit_lock: Mutex::new(()),
            snapshots: SnapshotTracker::new(),
        }
    }

    /// Latest fully applied commit timestamp.
    pub fn stable_timestamp(&self) -> Timestamp {
        self.state.lock().stable
    }

    /// Oldest read timestamp still held by an open recovery unit.
    pub fn oldest_active_snapshot(&self) -> Option<Timestamp> {
        self.snapshots.oldest_active()
    }

    pub fn active_snapshots(&self) -> usize {
        self.snapshots.active_count()
    }

    fn next_txn(&self) -> (TxnId, Timestamp) {
        let mut state = self.state.lock();
        let txn_id = state.next_stamp;
        state.next_stamp += 1;
        (txn_id, state.stable)
    }
}

impl Default for TxnClock {
    fn default() -> Self {
        Self::new()
    }
}

/// What a recovery unit is allowed to see: its own pending writes plus
/// everything committed at or before `read_ts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadView {
    pub txn_id: TxnId,
    pub read_ts: Timestamp,
}

impl ReadView {
    /// A view of the latest committed state, ignoring every pending write.
    pub fn latest_committed() -> Self {
        Self {
            txn_id: 0,
            read_ts: Timestamp::MAX,
        }
    }
}

/// The transactional context of one operation.
pub struct RecoveryUnit<'a> {
    clock: &'a TxnClock,
    view: ReadView,
    changes: Vec<Box<dyn Change + 'a>>,
    finished: bool,
    _snapshot: SnapshotGuard<'a>,
}

impl<'a> RecoveryUnit<'a> {
    /// Open a unit reading at the clock's stable timestamp.
    pub fn begin(clock: &'a TxnClock) -> Self {
        let (txn_id, read_ts) = clock.next_txn();
        Self::with_view(clock, txn_id, read_ts)
    }

    /// Open a unit reading at an explicit, earlier timestamp.
    ///
    /// Versions superseded before the last reclamation pass may no longer be
    /// visible at very old timestamps.
    pub fn begin_at(clock: &'a TxnClock, read_ts: Timestamp) -> Self {
        let (txn_id, stable) = clock.next_txn();
        assert!(
            read_ts <= stable,
            "read timestamp {read_ts} is ahead of the stable timestamp {stable}"
        );
        Self::with_view(clock, txn_id, read_ts)
    }

    fn with_view(clock: &'a TxnClock, txn_id: TxnId, read_ts: Timestamp) -> Self {
        Self {
            clock,
            view: ReadView { txn_id, read_ts },
            changes: Vec::new(),
            finished: false,
            _snapshot: clock.snapshots.register(read_ts),
        }
    }

    pub fn txn_id(&self) -> TxnId {
        self.view.txn_id
    }

    pub fn read_timestamp(&self) -> Timestamp {
        self.view.read_ts
    }

    pub fn view(&self) -> ReadView {
        self.view
    }

    pub fn register_change(&mut self, change: Box<dyn Change + 'a>) {
        self.changes.push(change);
    }

    /// Register a callback that runs only if the unit commits.
    pub fn on_commit(&mut self, f: impl FnOnce(Timestamp) + 'a) {
        self.register_change(Box::new(OnCommit(f)));
    }

    /// Register a callback that runs only if the unit aborts.
    pub fn on_rollback(&mut self, f: impl FnOnce() + 'a) {
        self.register_change(Box::new(OnRollback(f)));
    }

    /// Commit every registered change and return the commit timestamp.
    pub fn commit(mut self) -> Timestamp {
        let clock = self.clock;
        let _serial = clock.commit_lock.lock();
        let commit_ts = {
            let mut state = clock.state.lock();
            let ts = state.next_stamp;
            state.next_stamp += 1;
            ts
        };
        for change in std::mem::take(&mut self.changes) {
            change.commit(commit_ts);
        }
        clock.state.lock().stable = commit_ts;
        self.finished = true;
        commit_ts
    }

    /// Roll back every registered change, newest first.
    pub fn abort(mut self) {
        self.rollback_all();
    }

    fn rollback_all(&mut self) {
        let changes = std::mem::take(&mut self.changes);
        for change in changes.into_iter().rev() {
            change.rollback();
        }
        self.finished = true;
    }
}

impl Drop for RecoveryUnit<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn test_commit_runs_commit_handlers_in_order() {
        let clock = TxnClock::new();
        let log = RefCell::new(Vec::new());

        let mut ru = RecoveryUnit::begin(&clock);
        ru.on_commit(|_| log.borrow_mut().push("first"));
        ru.on_rollback(|| log.borrow_mut().push("rollback"));
        ru.on_commit(|_| log.borrow_mut().push("second"));
        let ts = ru.commit();

        assert_eq!(*log.borrow(), vec!["first", "second"]);
        assert_eq!(clock.stable_timestamp(), ts);
    }

    #[test]
    fn test_abort_runs_rollback_handlers_newest_first() {
        let clock = TxnClock::new();
        let log = RefCell::new(Vec::new());

        let mut ru = RecoveryUnit::begin(&clock);
        ru.on_rollback(|| log.borrow_mut().push(1));
        ru.on_commit(|_| log.borrow_mut().push(99));
        ru.on_rollback(|| log.borrow_mut().push(2));
        ru.abort();

        assert_eq!(*log.borrow(), vec![2, 1]);
        assert_eq!(clock.stable_timestamp(), 0);
    }

    #[test]
    fn test_drop_without_commit_aborts() {
        let clock = TxnClock::new();
        let rolled_back = RefCell::new(false);
        {
            let mut ru = RecoveryUnit::begin(&clock);
            ru.on_rollback(|| *rolled_back.borrow_mut() = true);
        }
        assert!(*rolled_back.borrow());
    }

    #[test]
    fn test_commit_timestamps_increase_and_snapshots_advance() {
        let clock = TxnClock::new();

        let ru1 = RecoveryUnit::begin(&clock);
        let read1 = ru1.read_timestamp();
        let ts1 = ru1.commit();
        assert!(ts1 > read1);

        let ru2 = RecoveryUnit::begin(&clock);
        assert_eq!(ru2.read_timestamp(), ts1);
        let ts2 = ru2.commit();
        assert!(ts2 > ts1);
    }

    #[test]
    fn test_snapshots_are_tracked_while_open() {
        let clock = TxnClock::new();
        let first = RecoveryUnit::begin(&clock);
        RecoveryUnit::begin(&clock).commit();
        let second = RecoveryUnit::begin(&clock);

        assert_eq!(clock.active_snapshots(), 2);
        assert_eq!(clock.oldest_active_snapshot(), Some(first.read_timestamp()));

        drop(first);
        assert_eq!(clock.oldest_active_snapshot(), Some(second.read_timestamp()));
        drop(second);
        assert_eq!(clock.oldest_active_snapshot(), None);
    }

    #[test]
    fn test_begin_at_reads_in_the_past() {
        let clock = TxnClock::new();
        let ts = RecoveryUnit::begin(&clock).commit();
        RecoveryUnit::begin(&clock).commit();

        let ru = RecoveryUnit::begin_at(&clock, ts);
        assert_eq!(ru.read_timestamp(), ts);
    }

    #[test]
    #[should_panic(expected = "ahead of the stable timestamp")]
    fn test_begin_at_rejects_future_timestamps() {
        let clock = TxnClock::new();
        let _ru = RecoveryUnit::begin_at(&clock, 1_000);
    }
}
