use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::config::SpillTableOptions;
use crate::error::{Result, SpillError, StorageError};
use crate::storage::{RecordCursor, RecordStore, RecoveryUnit, TxnClock};
use crate::types::{Record, RecordId};

use super::disk_monitor::{ActionGuard, DiskSpaceMonitor};

/// Tracks whether the last disk check left the table unable to write.
struct DiskState {
    full: Arc<AtomicBool>,
    _registration: ActionGuard,
}

impl DiskState {
    fn register(monitor: &Arc<DiskSpaceMonitor>, threshold_bytes: u64) -> Result<Self> {
        let full = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&full);
        let registration = monitor.register_action(
            move || threshold_bytes,
            move |available, threshold| {
                let now_full = available <= threshold;
                let was_full = flag.swap(now_full, Ordering::SeqCst);
                if now_full && !was_full {
                    warn!(
                        available_bytes = available,
                        threshold_bytes = threshold,
                        "failing writes to spill table: remaining disk space is below the minimum"
                    );
                } else if !now_full && was_full {
                    warn!(available_bytes = available, "spill table writes resumed");
                }
            },
        );
        registration.run()?;
        Ok(Self {
            full,
            _registration: registration,
        })
    }

    fn full(&self) -> bool {
        self.full.load(Ordering::SeqCst)
    }
}

/// A scratch table for data that does not fit in memory.
///
/// Every write runs in its own recovery unit and is committed on success,
/// retrying on write conflicts. With a disk monitor attached, writes fail
/// with `OutOfDiskSpace` while free space is at or below the threshold.
/// Reads are never refused.
pub struct SpillTable {
    clock: TxnClock,
    rs: Arc<dyn RecordStore>,
    disk_state: Option<DiskState>,
}

impl SpillTable {
    pub fn new(rs: Arc<dyn RecordStore>) -> Self {
        Self {
            clock: TxnClock::new(),
            rs,
            disk_state: None,
        }
    }

    /// A table whose writes are gated on `monitor`. Checks disk space once
    /// immediately.
    pub fn with_disk_monitor(
        rs: Arc<dyn RecordStore>,
        monitor: &Arc<DiskSpaceMonitor>,
        options: SpillTableOptions,
    ) -> Result<Self> {
        Ok(Self {
            clock: TxnClock::new(),
            rs,
            disk_state: Some(DiskState::register(monitor, options.threshold_bytes)?),
        })
    }

    pub fn ident(&self) -> &str {
        self.rs.ident()
    }

    /// Insert every record, assigning each its new id.
    pub fn insert_records(&self, records: &mut [Record]) -> Result<()> {
        self.check_disk_space()?;
        for record in records.iter_mut() {
            record.id = self.write(|rs, ru| rs.insert_record(ru, &record.data))?;
        }
        Ok(())
    }

    pub fn find_record(&self, id: RecordId) -> Result<Option<Vec<u8>>> {
        let ru = RecoveryUnit::begin(&self.clock);
        Ok(self.rs.find_record(&ru, id)?)
    }

    pub fn update_record(&self, id: RecordId, data: &[u8]) -> Result<()> {
        self.check_disk_space()?;
        self.write(|rs, ru| rs.update_record(ru, id, data))
    }

    pub fn delete_record(&self, id: RecordId) -> Result<()> {
        self.check_disk_space()?;
        self.write(|rs, ru| rs.delete_record(ru, id))
    }

    /// A cursor over the committed contents at the time of the call.
    pub fn get_cursor(&self, forward: bool) -> SpillCursor<'_> {
        let ru = RecoveryUnit::begin(&self.clock);
        let inner = self.rs.get_cursor(&ru, forward);
        SpillCursor { _ru: ru, inner }
    }

    pub fn truncate(&self) -> Result<u64> {
        self.check_disk_space()?;
        self.write(|rs, ru| rs.truncate(ru))
    }

    pub fn range_truncate(&self, min: RecordId, max: RecordId) -> Result<u64> {
        self.check_disk_space()?;
        self.write(|rs, ru| rs.range_truncate(ru, min, max))
    }

    pub fn num_records(&self) -> u64 {
        self.rs.num_records()
    }

    pub fn data_size(&self) -> u64 {
        self.rs.data_size()
    }

    fn check_disk_space(&self) -> Result<()> {
        match &self.disk_state {
            Some(state) if state.full() => Err(SpillError::OutOfDiskSpace(
                "failed to write to spill table as disk space is too low".to_string(),
            )
            .into()),
            _ => Ok(()),
        }
    }

    /// Run `op` in a fresh unit and commit it, starting over on conflict.
    fn write<'s, T>(
        &'s self,
        mut op: impl FnMut(&'s dyn RecordStore, &mut RecoveryUnit<'s>) -> std::result::Result<T, StorageError>,
    ) -> Result<T> {
        loop {
            let mut ru = RecoveryUnit::begin(&self.clock);
            match op(self.rs.as_ref(), &mut ru) {
                Ok(value) => {
                    ru.commit();
                    return Ok(value);
                }
                Err(StorageError::WriteConflict(id)) => {
                    ru.abort();
                    warn!(ident = self.rs.ident(), record = %id, "spill table write conflict, retrying");
                    std::thread::yield_now();
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Cursor returned by [`SpillTable::get_cursor`]. Holds its snapshot open.
pub struct SpillCursor<'a> {
    _ru: RecoveryUnit<'a>,
    inner: Box<dyn RecordCursor + 'a>,
}

impl RecordCursor for SpillCursor<'_> {
    fn next(&mut self) -> std::result::Result<Option<Record>, StorageError> {
        self.inner.next()
    }

    fn seek_exact(&mut self, id: RecordId) -> std::result::Result<Option<Record>, StorageError> {
        self.inner.seek_exact(id)
    }
}
