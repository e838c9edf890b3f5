//! Cumulative catalog operation metrics.
//!
//! Each mutating catalog operation registers itself in an ordered set for as
//! long as it runs, via an [`OperationGuard`]. The set is keyed by start time
//! and a unique id, so the first element is always the oldest operation
//! still in flight.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Import,
    Remove,
    Rename,
    Update,
}

type OperationKey = (Instant, u64);

#[derive(Debug, Default)]
struct Counters {
    adds: AtomicU64,
    imports: AtomicU64,
    removes: AtomicU64,
    renames: AtomicU64,
    updates: AtomicU64,
    rolled_back: AtomicU64,
}

impl Counters {
    fn for_kind(&self, kind: OperationKind) -> &AtomicU64 {
        match kind {
            OperationKind::Add => &self.adds,
            OperationKind::Import => &self.imports,
            OperationKind::Remove => &self.removes,
            OperationKind::Rename => &self.renames,
            OperationKind::Update => &self.updates,
        }
    }
}

#[derive(Debug, Default)]
pub struct CatalogMetrics {
    active: Mutex<BTreeMap<OperationKey, OperationKind>>,
    next_id: AtomicU64,
    counters: Counters,
}

impl CatalogMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation as in flight until the guard drops.
    pub fn begin(&self, kind: OperationKind) -> OperationGuard<'_> {
        let key = (Instant::now(), self.next_id.fetch_add(1, Ordering::Relaxed));
        self.active.lock().insert(key, kind);
        OperationGuard { metrics: self, key }
    }

    pub fn record_commit(&self, kind: OperationKind) {
        self.counters.for_kind(kind).fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.counters.rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_operations(&self) -> usize {
        self.active.lock().len()
    }

    /// How long the oldest in-flight operation has been running.
    pub fn oldest_active_age(&self) -> Option<Duration> {
        self.active
            .lock()
            .keys()
            .next()
            .map(|(started, _)| started.elapsed())
    }

    pub fn committed(&self, kind: OperationKind) -> u64 {
        self.counters.for_kind(kind).load(Ordering::Relaxed)
    }

    pub fn report(&self) -> MetricsReport {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsReport {
            active_operations: self.active_operations(),
            oldest_active_micros: self
                .oldest_active_age()
                .map(|age| u64::try_from(age.as_micros()).unwrap_or(u64::MAX)),
            committed_adds: load(&self.counters.adds),
            committed_imports: load(&self.counters.imports),
            committed_removes: load(&self.counters.removes),
            committed_renames: load(&self.counters.renames),
            committed_updates: load(&self.counters.updates),
            rolled_back: load(&self.counters.rolled_back),
        }
    }

    fn finish(&self, key: &OperationKey) {
        self.active.lock().remove(key);
    }
}

/// Deregisters its operation from [`CatalogMetrics`] when dropped.
pub struct OperationGuard<'a> {
    metrics: &'a CatalogMetrics,
    key: OperationKey,
}

impl OperationGuard<'_> {
    pub fn elapsed(&self) -> Duration {
        self.key.0.elapsed()
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.metrics.finish(&self.key);
    }
}

/// Point-in-time view of [`CatalogMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsReport {
    pub active_operations: usize,
    pub oldest_active_micros: Option<u64>,
    pub committed_adds: u64,
    pub committed_imports: u64,
    pub committed_removes: u64,
    pub committed_renames: u64,
    pub committed_updates: u64,
    pub rolled_back: u64,
}
