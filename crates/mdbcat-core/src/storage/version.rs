//! Record versions and MVCC visibility rules.
//!
//! Every record id owns a version chain ordered oldest to newest. A version
//! is visible to a [`ReadView`] if:
//! - it was started by the reader's own transaction, or committed at or
//!   before the view's read timestamp, AND
//! - it was not stopped (deleted / superseded) by the reader's own
//!   transaction, nor by a commit at or before the read timestamp.

use crate::types::{Timestamp, TxnId};

use super::recovery_unit::ReadView;

/// When a version came into (or went out of) existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    /// Written by a transaction that has not committed yet.
    Pending(TxnId),
    /// Written by a transaction that committed at this timestamp.
    Committed(Timestamp),
}

impl Stamp {
    /// True if a reader with `view` observes this stamp as having happened.
    pub fn happened_for(self, view: &ReadView) -> bool {
        match self {
            Stamp::Pending(txn) => txn == view.txn_id,
            Stamp::Committed(ts) => ts <= view.read_ts,
        }
    }

    pub fn is_pending_for(self, txn: TxnId) -> bool {
        self == Stamp::Pending(txn)
    }
}

/// One version of a record's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordVersion {
    pub start: Stamp,
    pub stop: Option<Stamp>,
    pub data: Vec<u8>,
}

impl RecordVersion {
    pub fn new(start: Stamp, data: Vec<u8>) -> Self {
        Self {
            start,
            stop: None,
            data,
        }
    }

    pub fn is_visible(&self, view: &ReadView) -> bool {
        self.start.happened_for(view) && !self.stop.is_some_and(|s| s.happened_for(view))
    }
}

/// Walk the chain newest to oldest and return the first visible version.
pub fn find_visible<'c>(chain: &'c [RecordVersion], view: &ReadView) -> Option<&'c RecordVersion> {
    chain.iter().rev().find(|v| v.is_visible(view))
}

/// Decide whether `view` may write to a record whose chain is `chain`.
///
/// A write conflicts when another transaction holds a pending stamp on the
/// newest version, or when the newest version changed after the writer's
/// snapshot (first committer wins).
pub fn conflicts(chain: &[RecordVersion], view: &ReadView) -> bool {
    let Some(latest) = chain.last() else {
        return false;
    };
    let newer_than_snapshot = |stamp: Stamp| match stamp {
        Stamp::Committed(ts) => ts > view.read_ts,
        Stamp::Pending(txn) => txn != view.txn_id,
    };
    newer_than_snapshot(latest.start) || latest.stop.is_some_and(newer_than_snapshot)
}

/// Replace every `Pending(txn)` stamp in the chain with `Committed(ts)`.
pub fn stamp_committed(chain: &mut [RecordVersion], txn: TxnId, commit_ts: Timestamp) {
    for version in chain.iter_mut() {
        if version.start.is_pending_for(txn) {
            version.start = Stamp::Committed(commit_ts);
        }
        if version.stop.is_some_and(|s| s.is_pending_for(txn)) {
            version.stop = Some(Stamp::Committed(commit_ts));
        }
    }
}

/// Drop versions that no snapshot at or after `oldest_snapshot` can see.
///
/// With no active snapshot, every version stopped by a commit is garbage.
/// Returns the number of versions removed.
pub fn prune(chain: &mut Vec<RecordVersion>, oldest_snapshot: Option<Timestamp>) -> usize {
    let before = chain.len();
    chain.retain(|v| match v.stop {
        Some(Stamp::Committed(ts)) => oldest_snapshot.is_some_and(|oldest| ts > oldest),
        _ => true,
    });
    before - chain.len()
}
