use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::storage::{HeapRecordStore, RecordStore};
use crate::types::{Document, NamespaceString};

use super::{ImportOptions, IndexConfig, KvEngine, RecordStoreOptions};

/// What an ident names.
#[derive(Clone)]
pub enum IdentKind {
    RecordStore {
        store: Arc<HeapRecordStore>,
        options: RecordStoreOptions,
    },
    SortedData {
        config: Option<IndexConfig>,
    },
}

impl IdentKind {
    pub fn is_record_store(&self) -> bool {
        matches!(self, IdentKind::RecordStore { .. })
    }
}

/// A [`KvEngine`] whose record stores are [`HeapRecordStore`]s and whose
/// indexes are bookkeeping entries only.
///
/// Physical creation and drops are not transactional; callers undo them with
/// rollback hooks.
#[derive(Default)]
pub struct InMemoryKvEngine {
    idents: Mutex<BTreeMap<String, IdentKind>>,
}

impl InMemoryKvEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up what `ident` currently names.
    pub fn describe_ident(&self, ident: &str) -> Option<IdentKind> {
        self.idents.lock().get(ident).cloned()
    }

    fn create(&self, ident: &str, kind: IdentKind) -> Result<(), EngineError> {
        let mut idents = self.idents.lock();
        if idents.contains_key(ident) {
            return Err(EngineError::IdentExists(ident.to_string()));
        }
        idents.insert(ident.to_string(), kind);
        Ok(())
    }

    fn remove(&self, ident: &str) -> Result<IdentKind, EngineError> {
        self.idents
            .lock()
            .remove(ident)
            .ok_or_else(|| EngineError::NoSuchIdent(ident.to_string()))
    }

    /// Check `storage_metadata[ident]` before adopting `ident`.
    fn validate_import(
        ident: &str,
        storage_metadata: &Document,
        options: ImportOptions,
    ) -> Result<(), EngineError> {
        let Some(entry) = storage_metadata.get(ident) else {
            return Err(EngineError::BadMetadata(format!(
                "storage metadata has no entry for ident '{ident}'"
            )));
        };
        if entry.is_object() {
            return Ok(());
        }
        if options.panic_on_corrupt_metadata {
            panic!("corrupt storage metadata for ident '{ident}': {entry}");
        }
        if options.repair {
            warn!(ident, "repairing corrupt storage metadata on import");
            return Ok(());
        }
        Err(EngineError::BadMetadata(format!(
            "storage metadata for ident '{ident}' must be an object"
        )))
    }
}

impl KvEngine for InMemoryKvEngine {
    fn create_record_store(
        &self,
        nss: &NamespaceString,
        ident: &str,
        options: &RecordStoreOptions,
    ) -> Result<(), EngineError> {
        self.create(
            ident,
            IdentKind::RecordStore {
                store: Arc::new(HeapRecordStore::new(ident)),
                options: options.clone(),
            },
        )?;
        debug!(%nss, ident, "created record store");
        Ok(())
    }

    fn get_record_store(
        &self,
        _nss: &NamespaceString,
        ident: &str,
        _options: &RecordStoreOptions,
        _uuid: Option<Uuid>,
    ) -> Option<Arc<dyn RecordStore>> {
        match self.idents.lock().get(ident) {
            Some(IdentKind::RecordStore { store, .. }) => {
                Some(Arc::clone(store) as Arc<dyn RecordStore>)
            }
            _ => None,
        }
    }

    fn import_record_store(
        &self,
        ident: &str,
        storage_metadata: &Document,
        options: ImportOptions,
    ) -> Result<(), EngineError> {
        Self::validate_import(ident, storage_metadata, options)?;
        self.create(
            ident,
            IdentKind::RecordStore {
                store: Arc::new(HeapRecordStore::new(ident)),
                options: RecordStoreOptions::default(),
            },
        )?;
        debug!(ident, "imported record store");
        Ok(())
    }

    fn create_sorted_data_interface(
        &self,
        nss: &NamespaceString,
        _uuid: Uuid,
        ident: &str,
        config: &IndexConfig,
    ) -> Result<(), EngineError> {
        self.create(
            ident,
            IdentKind::SortedData {
                config: Some(config.clone()),
            },
        )?;
        debug!(%nss, ident, index = %config.index_name, "created sorted data interface");
        Ok(())
    }

    fn import_sorted_data_interface(
        &self,
        ident: &str,
        storage_metadata: &Document,
        options: ImportOptions,
    ) -> Result<(), EngineError> {
        Self::validate_import(ident, storage_metadata, options)?;
        self.create(ident, IdentKind::SortedData { config: None })?;
        debug!(ident, "imported sorted data interface");
        Ok(())
    }

    fn drop_sorted_data_interface(&self, ident: &str) -> Result<(), EngineError> {
        let mut idents = self.idents.lock();
        match idents.get(ident) {
            Some(IdentKind::SortedData { .. }) => {
                idents.remove(ident);
                Ok(())
            }
            _ => Err(EngineError::NoSuchIdent(ident.to_string())),
        }
    }

    fn drop_ident(&self, ident: &str, has_size_info: bool) -> Result<(), EngineError> {
        self.remove(ident)?;
        debug!(ident, has_size_info, "dropped ident");
        Ok(())
    }

    fn drop_ident_for_import(&self, ident: &str) -> Result<(), EngineError> {
        self.remove(ident)?;
        debug!(ident, "dropped imported ident");
        Ok(())
    }

    fn has_ident(&self, ident: &str) -> bool {
        self.idents.lock().contains_key(ident)
    }

    fn all_idents(&self) -> Vec<String> {
        self.idents.lock().keys().cloned().collect()
    }
}
