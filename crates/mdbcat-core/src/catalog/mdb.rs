//! The catalog façade.
//!
//! Every mutation follows the same order: write the record store, then apply
//! the change to the entry map under its mutex, then register the hook that
//! undoes the map change if the recovery unit aborts. A reader that sees a
//! cached entry can therefore rely on its record having been written. The
//! record store undoes its own writes on abort.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CatalogOptions;
use crate::engine::{ImportOptions, KvEngine, RecordStoreOptions};
use crate::error::{CatalogError, Error, Result, StorageError};
use crate::metrics::{CatalogMetrics, OperationKind};
use crate::storage::{Change, RecordCursor, RecordStore, RecoveryUnit};
use crate::types::{Document, NamespaceString, RecordId, Timestamp};

use super::codec;
use super::entry_map::EntryMap;
use super::feature_document::is_feature_document;
use super::EntryIdentifier;

pub struct MdbCatalog {
    rs: Arc<dyn RecordStore>,
    engine: Arc<dyn KvEngine>,
    options: CatalogOptions,
    entries: EntryMap,
    metrics: CatalogMetrics,
}

/// Erases a freshly added entry from the map if its unit aborts.
struct AddIdentChange<'a> {
    catalog: &'a MdbCatalog,
    catalog_id: RecordId,
    kind: OperationKind,
}

impl Change for AddIdentChange<'_> {
    fn commit(self: Box<Self>, _commit_ts: Timestamp) {
        self.catalog.metrics.record_commit(self.kind);
    }

    fn rollback(self: Box<Self>) {
        self.catalog.entries.erase(self.catalog_id);
        self.catalog.metrics.record_rollback();
    }
}

impl MdbCatalog {
    pub fn new(
        rs: Arc<dyn RecordStore>,
        engine: Arc<dyn KvEngine>,
        options: CatalogOptions,
    ) -> Self {
        Self {
            rs,
            engine,
            options,
            entries: EntryMap::new(),
            metrics: CatalogMetrics::new(),
        }
    }

    /// Load the entry map from the record store.
    ///
    /// Takes `&mut self`: nothing else may touch the catalog until this
    /// returns. Returns the number of entries loaded.
    pub fn init(&mut self, ru: &RecoveryUnit<'_>) -> Result<usize> {
        self.entries.clear();
        let mut cursor = self.rs.get_cursor(ru, true);
        while let Some(record) = cursor.next()? {
            let doc = codec::decode_document(&record.data)?;
            if is_feature_document(&doc) {
                continue;
            }
            self.entries.populate(codec::decode_entry(record.id, &doc)?);
        }
        debug!(entries = self.entries.len(), "loaded catalog");
        Ok(self.entries.len())
    }

    /// Decode every entry straight from the record store.
    pub fn get_all_catalog_entries(&self, ru: &RecoveryUnit<'_>) -> Result<Vec<EntryIdentifier>> {
        let mut entries = Vec::new();
        self.for_each_entry_document(ru, |id, doc| {
            entries.push(codec::decode_entry(id, doc)?);
            Ok(())
        })?;
        Ok(entries)
    }

    /// Cached entry for `catalog_id`. Panics if it is not cached.
    pub fn get_entry(&self, catalog_id: RecordId) -> EntryIdentifier {
        self.entries.get(catalog_id)
    }

    /// Cached entry for `catalog_id`, if any.
    pub fn find_entry(&self, catalog_id: RecordId) -> Option<EntryIdentifier> {
        self.entries.find(catalog_id)
    }

    /// Copy of every cached entry, ordered by catalog id.
    pub fn cached_entries(&self) -> Vec<EntryIdentifier> {
        self.entries.snapshot()
    }

    /// The raw record at `catalog_id`, or an empty document if there is none.
    pub fn get_raw_catalog_entry(
        &self,
        ru: &RecoveryUnit<'_>,
        catalog_id: RecordId,
    ) -> Result<Document> {
        let mut cursor = self.rs.get_cursor(ru, true);
        self.find_raw_entry(cursor.as_mut(), catalog_id)
    }

    /// Namespace of `catalog_id`, from the cache or else from the record
    /// store at the unit's read timestamp. Panics if neither has it.
    pub fn get_nss_from_catalog(
        &self,
        ru: &RecoveryUnit<'_>,
        catalog_id: RecordId,
    ) -> Result<NamespaceString> {
        if let Some(entry) = self.entries.find(catalog_id) {
            return Ok(entry.nss);
        }
        let doc = self.get_raw_catalog_entry(ru, catalog_id)?;
        if doc.is_empty() {
            panic!(
                "namespace not found for {catalog_id} at timestamp {}",
                ru.read_timestamp()
            );
        }
        codec::namespace(&doc)
    }

    /// Overwrite the record at `catalog_id`. The cached entry is unchanged.
    ///
    /// A write conflict is returned for the caller to retry; any other
    /// storage failure means the catalog is corrupt and panics.
    pub fn put_updated_entry<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        catalog_id: RecordId,
        doc: &Document,
    ) -> Result<()> {
        let _op = self.metrics.begin(OperationKind::Update);
        debug!(catalog_id = %catalog_id, "recording new metadata");
        self.write_entry(ru, catalog_id, doc)?;
        ru.on_commit(move |_| self.metrics.record_commit(OperationKind::Update));
        Ok(())
    }

    /// Overwrite the record at `catalog_id` and point its cached entry at
    /// `to_nss`. Storage failures are handled as in
    /// [`put_updated_entry`](Self::put_updated_entry).
    pub fn put_renamed_entry<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        catalog_id: RecordId,
        to_nss: &NamespaceString,
        doc: &Document,
    ) -> Result<()> {
        let _op = self.metrics.begin(OperationKind::Rename);
        self.write_entry(ru, catalog_id, doc)?;

        let from_nss = self.entries.rename(catalog_id, to_nss.clone());
        debug!(catalog_id = %catalog_id, from = %from_nss, to = %to_nss, "renamed catalog entry");
        ru.on_commit(move |_| self.metrics.record_commit(OperationKind::Rename));
        ru.on_rollback(move || {
            self.entries.rename(catalog_id, from_nss);
            self.metrics.record_rollback();
        });
        Ok(())
    }

    /// Every collection and index ident in the record store.
    pub fn get_all_idents(&self, ru: &RecoveryUnit<'_>) -> Result<Vec<String>> {
        let mut idents = Vec::new();
        self.for_each_entry_document(ru, |_, doc| {
            idents.push(codec::ident(doc)?.to_string());
            idents.extend(codec::index_idents(doc)?);
            Ok(())
        })?;
        Ok(idents)
    }

    /// Ident of index `index_name`, or `""` if the entry has no such index.
    pub fn get_index_ident(
        &self,
        ru: &RecoveryUnit<'_>,
        catalog_id: RecordId,
        index_name: &str,
    ) -> Result<String> {
        let doc = self.get_raw_catalog_entry(ru, catalog_id)?;
        Ok(codec::index_ident(&doc, index_name)?)
    }

    /// Every index ident of the entry, in document order.
    pub fn get_index_idents(
        &self,
        ru: &RecoveryUnit<'_>,
        catalog_id: RecordId,
    ) -> Result<Vec<String>> {
        let doc = self.get_raw_catalog_entry(ru, catalog_id)?;
        Ok(codec::index_idents(&doc)?)
    }

    /// Read-only cursor over the catalog's record store.
    pub fn get_cursor<'c>(
        &'c self,
        ru: &RecoveryUnit<'_>,
        forward: bool,
    ) -> Box<dyn RecordCursor + 'c> {
        self.rs.get_cursor(ru, forward)
    }

    /// Add an entry without creating any physical storage for it.
    pub fn add_orphaned_entry<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        ident: &str,
        nss: &NamespaceString,
        doc: &Document,
    ) -> Result<EntryIdentifier> {
        let _op = self.metrics.begin(OperationKind::Add);
        self.add_entry(ru, ident, nss, doc, OperationKind::Add)
    }

    /// Add an entry and create its record store.
    ///
    /// If the unit aborts, the record store is dropped on a best-effort
    /// basis: a failed drop is logged and leaks the ident.
    pub fn initialize_new_entry<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        uuid: Option<Uuid>,
        ident: &str,
        nss: &NamespaceString,
        rs_options: &RecordStoreOptions,
        doc: &Document,
    ) -> Result<(RecordId, Arc<dyn RecordStore>)> {
        let _op = self.metrics.begin(OperationKind::Add);
        let entry = self.add_entry(ru, ident, nss, doc, OperationKind::Add)?;

        self.engine.create_record_store(nss, ident, rs_options)?;
        let dropped = entry.ident.clone();
        ru.on_rollback(move || {
            if let Err(e) = self.engine.drop_ident(&dropped, true) {
                warn!(ident = %dropped, error = %e, "failed to drop record store on rollback");
            }
        });

        let Some(rs) = self.engine.get_record_store(nss, ident, rs_options, uuid) else {
            panic!("record store '{ident}' missing right after creation");
        };
        Ok((entry.catalog_id, rs))
    }

    /// Add an entry for a collection whose files already exist and adopt
    /// its record store and every index named in `idxIdent`.
    ///
    /// Each adopted ident gets its own hook that un-imports it if the unit
    /// aborts.
    #[allow(clippy::too_many_arguments)]
    pub fn import_catalog_entry<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        nss: &NamespaceString,
        uuid: Uuid,
        rs_options: &RecordStoreOptions,
        doc: &Document,
        storage_metadata: &Document,
        import_options: ImportOptions,
    ) -> Result<(RecordId, Arc<dyn RecordStore>)> {
        let _op = self.metrics.begin(OperationKind::Import);
        let ident = codec::ident(doc)?.to_string();
        let index_idents = codec::index_idents(doc)?;
        let entry = self.add_entry(ru, &ident, nss, doc, OperationKind::Import)?;

        self.engine
            .import_record_store(&entry.ident, storage_metadata, import_options)?;
        self.drop_import_on_rollback(ru, entry.ident.clone());

        for index_ident in index_idents {
            self.engine
                .import_sorted_data_interface(&index_ident, storage_metadata, import_options)?;
            self.drop_import_on_rollback(ru, index_ident);
        }

        let Some(rs) = self
            .engine
            .get_record_store(nss, &entry.ident, rs_options, Some(uuid))
        else {
            panic!("record store '{}' missing right after import", entry.ident);
        };
        debug!(catalog_id = %entry.catalog_id, ns = %nss, "imported catalog entry");
        Ok((entry.catalog_id, rs))
    }

    /// Delete the entry at `catalog_id`.
    ///
    /// Fails with `NamespaceNotFound` if it is not cached.
    pub fn remove_entry<'a>(&'a self, ru: &mut RecoveryUnit<'a>, catalog_id: RecordId) -> Result<()> {
        let Some(entry) = self.entries.find(catalog_id) else {
            return Err(CatalogError::NamespaceNotFound(format!(
                "collection not found: {catalog_id}"
            ))
            .into());
        };
        let _op = self.metrics.begin(OperationKind::Remove);

        debug!(catalog_id = %catalog_id, ns = %entry.nss, "deleting metadata");
        self.rs.delete_record(ru, catalog_id)?;
        self.entries.erase(catalog_id);

        ru.on_commit(move |_| self.metrics.record_commit(OperationKind::Remove));
        ru.on_rollback(move || {
            self.entries.restore(entry);
            self.metrics.record_rollback();
        });
        Ok(())
    }

    pub fn is_using_directory_per_db(&self) -> bool {
        self.options.directory_per_db
    }

    pub fn is_using_directory_for_indexes(&self) -> bool {
        self.options.directory_for_indexes
    }

    pub fn options(&self) -> &CatalogOptions {
        &self.options
    }

    pub fn engine(&self) -> &Arc<dyn KvEngine> {
        &self.engine
    }

    pub fn record_store(&self) -> &Arc<dyn RecordStore> {
        &self.rs
    }

    pub fn metrics(&self) -> &CatalogMetrics {
        &self.metrics
    }

    fn add_entry<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        ident: &str,
        nss: &NamespaceString,
        doc: &Document,
        kind: OperationKind,
    ) -> Result<EntryIdentifier> {
        let bytes = codec::encode_document(doc)?;
        let catalog_id = self.rs.insert_record(ru, &bytes)?;

        let entry = EntryIdentifier::new(catalog_id, ident, nss.clone());
        self.entries.insert(entry.clone());
        ru.register_change(Box::new(AddIdentChange {
            catalog: self,
            catalog_id,
            kind,
        }));

        debug!(catalog_id = %catalog_id, ns = %nss, ident, "stored catalog entry");
        Ok(entry)
    }

    fn write_entry<'a>(
        &'a self,
        ru: &mut RecoveryUnit<'a>,
        catalog_id: RecordId,
        doc: &Document,
    ) -> Result<()> {
        let bytes = codec::encode_document(doc)?;
        match self.rs.update_record(ru, catalog_id, &bytes) {
            Ok(()) => Ok(()),
            Err(StorageError::WriteConflict(id)) => Err(StorageError::WriteConflict(id).into()),
            Err(e) => panic!("failed to write catalog entry {catalog_id}: {e}"),
        }
    }

    fn drop_import_on_rollback<'a>(&'a self, ru: &mut RecoveryUnit<'a>, ident: String) {
        ru.on_rollback(move || {
            if let Err(e) = self.engine.drop_ident_for_import(&ident) {
                warn!(ident = %ident, error = %e, "failed to drop imported ident on rollback");
            }
        });
    }

    fn find_raw_entry(
        &self,
        cursor: &mut (dyn RecordCursor + '_),
        catalog_id: RecordId,
    ) -> Result<Document> {
        match cursor.seek_exact(catalog_id)? {
            Some(record) => Ok(codec::decode_document(&record.data)?),
            None => Ok(Document::new()),
        }
    }

    /// Run `f` over every non-feature record, in catalog id order.
    fn for_each_entry_document(
        &self,
        ru: &RecoveryUnit<'_>,
        mut f: impl FnMut(RecordId, &Document) -> std::result::Result<(), Error>,
    ) -> Result<()> {
        let mut cursor = self.rs.get_cursor(ru, true);
        while let Some(record) = cursor.next()? {
            let doc = codec::decode_document(&record.data)?;
            if is_feature_document(&doc) {
                continue;
            }
            f(record.id, &doc)?;
        }
        Ok(())
    }
}
