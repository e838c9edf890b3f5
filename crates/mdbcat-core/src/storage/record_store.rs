use crate::error::StorageError;
use crate::types::{Record, RecordId};

use super::recovery_unit::RecoveryUnit;

/// A transactional container of records keyed by [`RecordId`].
///
/// Every mutation takes the caller's recovery unit and registers its own
/// compensating change there, so an aborted unit leaves the store exactly as
/// it was. Reads see the unit's pending writes plus everything committed at
/// or before its read timestamp.
pub trait RecordStore: Send + Sync {
    /// Name of the physical table backing this store.
    fn ident(&self) -> &str;

    /// Insert a record and return its freshly assigned id.
    fn insert_record<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        data: &[u8],
    ) -> Result<RecordId, StorageError>;

    /// Replace the bytes of an existing record.
    fn update_record<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        id: RecordId,
        data: &[u8],
    ) -> Result<(), StorageError>;

    /// Delete an existing record.
    fn delete_record<'a>(&'a self, ru: &mut RecoveryUnit<'a>, id: RecordId)
    -> Result<(), StorageError>;

    /// Point lookup.
    fn find_record(&self, ru: &RecoveryUnit<'_>, id: RecordId)
    -> Result<Option<Vec<u8>>, StorageError>;

    /// Open a cursor reading with the unit's view.
    fn get_cursor<'a>(&'a self, ru: &RecoveryUnit<'_>, forward: bool)
    -> Box<dyn RecordCursor + 'a>;

    /// Delete every visible record. Returns the number removed.
    fn truncate<'a>(&'a self, ru: &mut RecoveryUnit<'a>) -> Result<u64, StorageError>;

    /// Delete every visible record with `min <= id <= max`.
    fn range_truncate<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        min: RecordId,
        max: RecordId,
    ) -> Result<u64, StorageError>;

    /// Number of live records, counting uncommitted writes.
    fn num_records(&self) -> u64;

    /// Total bytes of live records, counting uncommitted writes.
    fn data_size(&self) -> u64;
}

/// A positioned reader over a record store.
pub trait RecordCursor {
    /// Advance to the next visible record in the cursor's direction.
    fn next(&mut self) -> Result<Option<Record>, StorageError>;

    /// Position on exactly `id`. Returns `None` if it is not visible; a later
    /// [`next`](Self::next) continues after `id` either way.
    fn seek_exact(&mut self, id: RecordId) -> Result<Option<Record>, StorageError>;
}
