//! Physical storage driver: creates, imports and drops the record stores and
//! sorted data interfaces (indexes) named by idents.

pub mod memory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::storage::RecordStore;
use crate::types::{Document, NamespaceString};

pub use memory::InMemoryKvEngine;

/// Physical options of a collection's record store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStoreOptions {
    pub capped: bool,
    pub max_size_bytes: Option<u64>,
}

/// What the engine needs to build an index structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub index_name: String,
    pub spec: Document,
    pub unique: bool,
}

/// Flags steering how damaged storage metadata is treated on import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Panic instead of returning an error when an ident's metadata is malformed.
    pub panic_on_corrupt_metadata: bool,
    /// Accept malformed metadata and rebuild it.
    pub repair: bool,
}

/// The engine object that owns physical storage.
///
/// Implementations are shared between every catalog in the process.
pub trait KvEngine: Send + Sync {
    /// Create an empty record store. Fails with `IdentExists` if taken.
    fn create_record_store(
        &self,
        nss: &NamespaceString,
        ident: &str,
        options: &RecordStoreOptions,
    ) -> Result<(), EngineError>;

    /// Open an existing record store, or `None` if `ident` names none.
    fn get_record_store(
        &self,
        nss: &NamespaceString,
        ident: &str,
        options: &RecordStoreOptions,
        uuid: Option<Uuid>,
    ) -> Option<Arc<dyn RecordStore>>;

    /// Adopt a record store described by `storage_metadata[ident]`.
    fn import_record_store(
        &self,
        ident: &str,
        storage_metadata: &Document,
        options: ImportOptions,
    ) -> Result<(), EngineError>;

    fn create_sorted_data_interface(
        &self,
        nss: &NamespaceString,
        uuid: Uuid,
        ident: &str,
        config: &IndexConfig,
    ) -> Result<(), EngineError>;

    /// Adopt an index described by `storage_metadata[ident]`.
    fn import_sorted_data_interface(
        &self,
        ident: &str,
        storage_metadata: &Document,
        options: ImportOptions,
    ) -> Result<(), EngineError>;

    fn drop_sorted_data_interface(&self, ident: &str) -> Result<(), EngineError>;

    /// Drop any ident. `has_size_info` is set for record stores whose size
    /// accounting must be discarded too.
    fn drop_ident(&self, ident: &str, has_size_info: bool) -> Result<(), EngineError>;

    /// Undo an import without touching the underlying files.
    fn drop_ident_for_import(&self, ident: &str) -> Result<(), EngineError>;

    fn has_ident(&self, ident: &str) -> bool;

    /// Every ident the engine knows, sorted.
    fn all_idents(&self) -> Vec<String>;
}
