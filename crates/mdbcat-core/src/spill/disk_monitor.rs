use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::StorageError;

type ThresholdFn = Box<dyn Fn() -> u64 + Send + Sync>;
type ActFn = Box<dyn Fn(u64, u64) + Send + Sync>;

struct Action {
    threshold: ThresholdFn,
    act: ActFn,
}

impl Action {
    fn run(&self, available: u64) {
        (self.act)(available, (self.threshold)())
    }
}

enum Probe {
    Directory(PathBuf),
    Simulated(AtomicU64),
}

/// Watches free disk space and tells registered actions about it.
///
/// Every check hands each action the available byte count together with
/// that action's threshold; the action decides what crossing it means.
pub struct DiskSpaceMonitor {
    probe: Probe,
    actions: Mutex<BTreeMap<u64, Arc<Action>>>,
    next_id: AtomicU64,
}

impl DiskSpaceMonitor {
    fn with_probe(probe: Probe) -> Arc<Self> {
        Arc::new(Self {
            probe,
            actions: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Monitor the filesystem holding `dir`.
    pub fn for_directory(dir: impl Into<PathBuf>) -> Arc<Self> {
        Self::with_probe(Probe::Directory(dir.into()))
    }

    /// Monitor a fake filesystem reporting `available` bytes.
    pub fn simulated(available: u64) -> Arc<Self> {
        Self::with_probe(Probe::Simulated(AtomicU64::new(available)))
    }

    /// Change what a simulated monitor reports. Ignored for a real directory.
    pub fn set_simulated_available(&self, available: u64) {
        if let Probe::Simulated(bytes) = &self.probe {
            bytes.store(available, Ordering::SeqCst);
        }
    }

    pub fn available_bytes(&self) -> Result<u64, StorageError> {
        match &self.probe {
            Probe::Directory(dir) => Ok(fs2::available_space(dir)?),
            Probe::Simulated(bytes) => Ok(bytes.load(Ordering::SeqCst)),
        }
    }

    /// Register an action. It stays registered until the guard drops.
    pub fn register_action(
        self: &Arc<Self>,
        threshold: impl Fn() -> u64 + Send + Sync + 'static,
        act: impl Fn(u64, u64) + Send + Sync + 'static,
    ) -> ActionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.actions.lock().insert(
            id,
            Arc::new(Action {
                threshold: Box::new(threshold),
                act: Box::new(act),
            }),
        );
        ActionGuard {
            monitor: Arc::clone(self),
            id,
        }
    }

    /// Probe once and run the action registered as `id`.
    pub fn run_action(&self, id: u64) -> Result<(), StorageError> {
        let action = self.actions.lock().get(&id).cloned();
        if let Some(action) = action {
            action.run(self.available_bytes()?);
        }
        Ok(())
    }

    /// Probe once and run every action. Returns the bytes seen.
    pub fn check(&self) -> Result<u64, StorageError> {
        let available = self.available_bytes()?;
        self.take_action(available);
        Ok(available)
    }

    /// Run every action as if `available` bytes were free.
    pub fn take_action(&self, available: u64) {
        let actions: Vec<Arc<Action>> = self.actions.lock().values().cloned().collect();
        debug!(available, actions = actions.len(), "running disk space actions");
        for action in actions {
            action.run(available);
        }
    }

    pub fn action_count(&self) -> usize {
        self.actions.lock().len()
    }

    fn deregister(&self, id: u64) {
        self.actions.lock().remove(&id);
    }
}

/// Keeps an action registered with a [`DiskSpaceMonitor`]; deregisters it
/// on drop.
pub struct ActionGuard {
    monitor: Arc<DiskSpaceMonitor>,
    id: u64,
}

impl ActionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Probe and run only this action.
    pub fn run(&self) -> Result<(), StorageError> {
        self.monitor.run_action(self.id)
    }
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        self.monitor.deregister(self.id);
    }
}
