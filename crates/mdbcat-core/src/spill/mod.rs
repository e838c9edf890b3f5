//! Spill tables: scratch record stores whose writes stop when the disk
//! runs low on space.

pub mod disk_monitor;
pub mod table;

pub use disk_monitor::{ActionGuard, DiskSpaceMonitor};
pub use table::{SpillCursor, SpillTable};
