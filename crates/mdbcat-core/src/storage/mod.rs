//! Storage collaborators: recovery units, MVCC record stores, checkpoints.

pub mod checkpoint;
pub mod heap;
pub mod lock;
pub mod record_store;
pub mod recovery_unit;
pub mod snapshot;
pub mod version;

pub use heap::HeapRecordStore;
pub use record_store::{RecordCursor, RecordStore};
pub use recovery_unit::{Change, ReadView, RecoveryUnit, TxnClock};
