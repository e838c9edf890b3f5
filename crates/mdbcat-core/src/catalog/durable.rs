//! Collection-level catalog operations built on [`MdbCatalog`].
//!
//! These keep the `md` and `idxIdent` fields of a record in step with each
//! other and drive the engine for index creation and collection import.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::{ImportOptions, IndexConfig, KvEngine};
use crate::error::{CatalogError, CodecError, Result};
use crate::storage::{RecordStore, RecoveryUnit};
use crate::types::{Document, NamespaceString, RecordId};

use super::codec;
use super::feature_document::is_feature_document;
use super::ident;
use super::metadata::{CatalogEntryMetaData, CollectionOptions};
use super::MdbCatalog;

/// A fully decoded catalog record.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub catalog_id: RecordId,
    pub ident: String,
    pub idx_ident: Document,
    pub metadata: Option<CatalogEntryMetaData>,
}

/// Result of [`import_collection`].
pub struct ImportResult {
    pub catalog_id: RecordId,
    pub rs: Arc<dyn RecordStore>,
    pub uuid: Uuid,
}

/// Decode `doc`. Empty documents and the feature document yield `None`.
pub fn parse_catalog_entry(catalog_id: RecordId, doc: &Document) -> Result<Option<CatalogEntry>> {
    if doc.is_empty() || is_feature_document(doc) {
        return Ok(None);
    }

    let idx_ident = match doc.get(codec::IDX_IDENT_FIELD) {
        None => Document::new(),
        Some(serde_json::Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(CodecError::WrongType {
                field: codec::IDX_IDENT_FIELD,
                expected: "an object",
            }
            .into());
        }
    };
    let metadata = match doc.get(codec::MD_FIELD) {
        Some(md) if md.is_object() => Some(CatalogEntryMetaData::from_value(md)?),
        _ => None,
    };

    Ok(Some(CatalogEntry {
        catalog_id,
        ident: codec::ident(doc)?.to_string(),
        idx_ident,
        metadata,
    }))
}

pub fn get_parsed_catalog_entry(
    catalog: &MdbCatalog,
    ru: &RecoveryUnit<'_>,
    catalog_id: RecordId,
) -> Result<Option<CatalogEntry>> {
    let doc = catalog.get_raw_catalog_entry(ru, catalog_id)?;
    parse_catalog_entry(catalog_id, &doc)
}

/// Find the live entry for `nss` by scanning the record store.
pub fn scan_for_catalog_entry_by_nss(
    catalog: &MdbCatalog,
    ru: &RecoveryUnit<'_>,
    nss: &NamespaceString,
) -> Result<Option<CatalogEntry>> {
    let mut cursor = catalog.get_cursor(ru, true);
    while let Some(record) = cursor.next()? {
        let doc = codec::decode_document(&record.data)?;
        if is_feature_document(&doc) {
            continue;
        }
        if codec::namespace(&doc)? == *nss {
            return parse_catalog_entry(record.id, &doc);
        }
    }
    Ok(None)
}

/// Find the entry whose collection UUID is `uuid` by scanning the record store.
pub fn scan_for_catalog_entry_by_uuid(
    catalog: &MdbCatalog,
    ru: &RecoveryUnit<'_>,
    uuid: Uuid,
) -> Result<Option<CatalogEntry>> {
    let mut cursor = catalog.get_cursor(ru, true);
    while let Some(record) = cursor.next()? {
        let doc = codec::decode_document(&record.data)?;
        let Some(entry) = parse_catalog_entry(record.id, &doc)? else {
            continue;
        };
        if entry
            .metadata
            .as_ref()
            .is_some_and(|md| md.options.uuid == Some(uuid))
        {
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

/// A fresh collection ident following the catalog's directory layout.
pub fn new_collection_ident(catalog: &MdbCatalog, nss: &NamespaceString) -> String {
    ident::generate_new_collection_ident(
        nss.db(),
        catalog.is_using_directory_per_db(),
        catalog.is_using_directory_for_indexes(),
    )
}

/// A fresh index ident following the catalog's directory layout.
pub fn new_index_ident(catalog: &MdbCatalog, nss: &NamespaceString) -> String {
    ident::generate_new_index_ident(
        nss.db(),
        catalog.is_using_directory_per_db(),
        catalog.is_using_directory_for_indexes(),
    )
}

/// Rewrite the `md` field of an entry and bring `idxIdent` in line with it.
///
/// Indexes that already have an ident keep it, new indexes get a fresh one,
/// and idents of indexes no longer in `md` are dropped from the map. Every
/// other field is left as it was.
///
/// Panics if an index carries a build UUID while marked ready.
pub fn put_metadata<'a>(
    catalog: &'a MdbCatalog,
    ru: &mut RecoveryUnit<'a>,
    catalog_id: RecordId,
    md: &CatalogEntryMetaData,
) -> Result<()> {
    let existing = catalog.get_raw_catalog_entry(ru, catalog_id)?;
    let old_idents = match existing.get(codec::IDX_IDENT_FIELD) {
        Some(serde_json::Value::Object(map)) => map.clone(),
        _ => Document::new(),
    };

    let mut new_idents = Document::new();
    for index in md.indexes.iter().filter(|index| index.is_present()) {
        let name = index.name();
        assert!(
            !(index.build_uuid.is_some() && index.ready),
            "index '{name}' has a build UUID but is marked ready"
        );
        match old_idents.get(name) {
            Some(serde_json::Value::String(ident)) => {
                new_idents.insert(name.to_string(), ident.clone().into());
            }
            _ => {
                let ident = new_index_ident(catalog, &md.ns);
                debug!(catalog_id = %catalog_id, index = name, ident = %ident, "assigned index ident");
                new_idents.insert(name.to_string(), ident.into());
            }
        }
    }

    let doc = codec::with_metadata(existing, md.to_value()?);
    let doc = codec::with_index_idents(doc, new_idents);
    catalog.put_updated_entry(ru, catalog_id, &doc)
}

/// Add a catalog entry for a new collection and create its record store.
///
/// Panics if `nss` names only a database.
pub fn create_collection<'a>(
    catalog: &'a MdbCatalog,
    ru: &mut RecoveryUnit<'a>,
    nss: &NamespaceString,
    ident: &str,
    options: &CollectionOptions,
) -> Result<(RecordId, Arc<dyn RecordStore>)> {
    assert!(!nss.is_db_only(), "cannot create a collection named '{nss}'");

    let md = CatalogEntryMetaData::for_new_collection(nss, options);
    let doc = codec::build_entry(ident, Document::new(), md.to_value()?, nss);
    catalog.initialize_new_entry(
        ru,
        options.uuid,
        ident,
        nss,
        &options.record_store_options(),
        &doc,
    )
}

/// Create the sorted data interface for an index already listed in the
/// entry's `idxIdent`. The index is dropped on a best-effort basis if the
/// unit aborts.
pub fn create_index<'a>(
    catalog: &'a MdbCatalog,
    ru: &mut RecoveryUnit<'a>,
    catalog_id: RecordId,
    nss: &NamespaceString,
    options: &CollectionOptions,
    config: &IndexConfig,
) -> Result<()> {
    let ident = catalog.get_index_ident(ru, catalog_id, &config.index_name)?;
    if ident.is_empty() {
        return Err(CatalogError::BadValue(format!(
            "index '{}' has no ident in catalog entry {catalog_id}",
            config.index_name
        ))
        .into());
    }
    let Some(uuid) = options.uuid else {
        panic!("collection '{nss}' has no UUID");
    };

    let engine = catalog.engine();
    engine.create_sorted_data_interface(nss, uuid, &ident, config)?;
    ru.on_rollback(move || {
        if let Err(e) = engine.drop_ident(&ident, false) {
            warn!(ident = %ident, error = %e, "failed to drop index on rollback");
        }
    });
    Ok(())
}

/// Import a collection from a catalog record taken from another catalog.
///
/// `metadata` must carry an `md` object and an `ident`. With
/// `generate_new_uuid`, the collection receives a fresh UUID.
pub fn import_collection<'a>(
    catalog: &'a MdbCatalog,
    ru: &mut RecoveryUnit<'a>,
    nss: &NamespaceString,
    metadata: &Document,
    storage_metadata: &Document,
    generate_new_uuid: bool,
    import_options: ImportOptions,
) -> Result<ImportResult> {
    assert!(!nss.is_db_only(), "cannot import a collection named '{nss}'");

    let Some(md_value) = metadata.get(codec::MD_FIELD).filter(|v| v.is_object()) else {
        return Err(CatalogError::BadValue("malformed catalog metadata".to_string()).into());
    };
    let mut md = CatalogEntryMetaData::from_value(md_value)?;
    if !metadata.contains_key(codec::IDENT_FIELD) {
        return Err(CatalogError::BadValue(
            "attempted to import catalog entry without an ident".to_string(),
        )
        .into());
    }

    let doc = if generate_new_uuid {
        md.options.uuid = Some(Uuid::new_v4());
        codec::with_metadata(metadata.clone(), md.to_value()?)
    } else {
        metadata.clone()
    };
    let Some(uuid) = md.options.uuid else {
        return Err(CatalogError::BadValue(format!(
            "imported collection '{nss}' has no UUID"
        ))
        .into());
    };

    let (catalog_id, rs) = catalog.import_catalog_entry(
        ru,
        nss,
        uuid,
        &md.options.record_store_options(),
        &doc,
        storage_metadata,
        import_options,
    )?;
    Ok(ImportResult {
        catalog_id,
        rs,
        uuid,
    })
}

/// Point the entry at `to_nss` and store `md` alongside.
pub fn rename_collection<'a>(
    catalog: &'a MdbCatalog,
    ru: &mut RecoveryUnit<'a>,
    catalog_id: RecordId,
    to_nss: &NamespaceString,
    md: &CatalogEntryMetaData,
) -> Result<()> {
    let old = catalog.get_raw_catalog_entry(ru, catalog_id)?;
    if old.is_empty() {
        return Err(CatalogError::NamespaceNotFound(format!(
            "collection not found: {catalog_id}"
        ))
        .into());
    }
    let doc = codec::with_metadata(codec::with_namespace(old, to_nss), md.to_value()?);
    catalog.put_renamed_entry(ru, catalog_id, to_nss, &doc)
}

/// Remove a collection's entry. Panics if the entry still lists indexes.
pub fn drop_collection<'a>(
    catalog: &'a MdbCatalog,
    ru: &mut RecoveryUnit<'a>,
    catalog_id: RecordId,
) -> Result<()> {
    if let Some(entry) = get_parsed_catalog_entry(catalog, ru, catalog_id)?
        && let Some(md) = &entry.metadata
    {
        assert_eq!(
            md.total_index_count(),
            0,
            "collection {catalog_id} still has indexes"
        );
    }
    catalog.remove_entry(ru, catalog_id)
}

/// Throw away a half-built index and start over with an empty one under the
/// same ident.
pub fn drop_and_recreate_index_ident_for_resume(
    engine: &dyn KvEngine,
    nss: &NamespaceString,
    options: &CollectionOptions,
    config: &IndexConfig,
    ident: &str,
) -> Result<()> {
    engine.drop_sorted_data_interface(ident)?;
    let Some(uuid) = options.uuid else {
        panic!("collection '{nss}' has no UUID");
    };
    engine.create_sorted_data_interface(nss, uuid, ident, config)?;
    Ok(())
}

/// Names of every index of the entry whose build has completed.
pub fn get_ready_indexes(
    catalog: &MdbCatalog,
    ru: &RecoveryUnit<'_>,
    catalog_id: RecordId,
) -> Result<BTreeSet<String>> {
    let Some(entry) = get_parsed_catalog_entry(catalog, ru, catalog_id)? else {
        return Ok(BTreeSet::new());
    };
    Ok(entry
        .metadata
        .map(|md| md.ready_index_names().into_iter().collect())
        .unwrap_or_default())
}

pub fn is_index_present(
    catalog: &MdbCatalog,
    ru: &RecoveryUnit<'_>,
    catalog_id: RecordId,
    index_name: &str,
) -> Result<bool> {
    let Some(entry) = get_parsed_catalog_entry(catalog, ru, catalog_id)? else {
        return Ok(false);
    };
    Ok(entry
        .metadata
        .is_some_and(|md| md.find_index_offset(index_name).is_some()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::catalog::feature_document::build_feature_document;
    use crate::catalog::metadata::IndexMetaData;
    use crate::config::CatalogOptions;
    use crate::engine::InMemoryKvEngine;
    use crate::storage::{HeapRecordStore, TxnClock};

    fn catalog() -> MdbCatalog {
        MdbCatalog::new(
            Arc::new(HeapRecordStore::new("_mdb_catalog")),
            Arc::new(InMemoryKvEngine::new()),
            CatalogOptions::default(),
        )
    }

    fn nss(ns: &str) -> NamespaceString {
        NamespaceString::parse(ns).unwrap()
    }

    fn index(name: &str) -> IndexMetaData {
        IndexMetaData::new(json!({"key": {name: 1}, "name": name}).as_object().unwrap().clone())
    }

    fn index_config(name: &str) -> IndexConfig {
        IndexConfig {
            index_name: name.to_string(),
            spec: index(name).spec,
            unique: false,
        }
    }

    #[test]
    fn test_parse_skips_empty_and_feature_documents() {
        assert!(parse_catalog_entry(RecordId(1), &Document::new()).unwrap().is_none());
        assert!(
            parse_catalog_entry(RecordId(1), &build_feature_document(0, 0))
                .unwrap()
                .is_none()
        );

        let doc = codec::simple_entry("coll-1", &nss("db.foo"));
        let entry = parse_catalog_entry(RecordId(2), &doc).unwrap().unwrap();
        assert_eq!(entry.ident, "coll-1");
        assert!(entry.idx_ident.is_empty());
        assert!(entry.metadata.is_none());
    }

    #[test]
    fn test_create_collection_and_scan() {
        let clock = TxnClock::new();
        let catalog = catalog();
        let options = CollectionOptions::with_new_uuid();
        let uuid = options.uuid.unwrap();

        let mut ru = RecoveryUnit::begin(&clock);
        let (id, _rs) =
            create_collection(&catalog, &mut ru, &nss("db.foo"), "coll-1", &options).unwrap();
        ru.commit();

        let ru = RecoveryUnit::begin(&clock);
        let by_nss = scan_for_catalog_entry_by_nss(&catalog, &ru, &nss("db.foo"))
            .unwrap()
            .unwrap();
        assert_eq!(by_nss.catalog_id, id);
        let by_uuid = scan_for_catalog_entry_by_uuid(&catalog, &ru, uuid).unwrap().unwrap();
        assert_eq!(by_uuid.catalog_id, id);
        assert!(
            scan_for_catalog_entry_by_uuid(&catalog, &ru, Uuid::new_v4())
                .unwrap()
                .is_none()
        );
        assert!(
            scan_for_catalog_entry_by_nss(&catalog, &ru, &nss("db.bar"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_put_metadata_keeps_existing_index_idents() {
        let clock = TxnClock::new();
        let catalog = catalog();
        let options = CollectionOptions::with_new_uuid();
        let foo = nss("db.foo");

        let mut ru = RecoveryUnit::begin(&clock);
        let (id, _) = create_collection(&catalog, &mut ru, &foo, "coll-1", &options).unwrap();

        let mut md = CatalogEntryMetaData::for_new_collection(&foo, &options);
        md.indexes.push(index("_id_"));
        put_metadata(&catalog, &mut ru, id, &md).unwrap();
        let first = catalog.get_index_ident(&ru, id, "_id_").unwrap();
        assert!(ident::is_index_ident(&first));

        md.indexes.push(index("a_1"));
        put_metadata(&catalog, &mut ru, id, &md).unwrap();
        assert_eq!(catalog.get_index_ident(&ru, id, "_id_").unwrap(), first);
        assert_eq!(catalog.get_index_idents(&ru, id).unwrap().len(), 2);

        let raw = catalog.get_raw_catalog_entry(&ru, id).unwrap();
        let keys: Vec<&str> = raw.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["ident", "idxIdent", "md", "ns"]);
    }

    #[test]
    #[should_panic(expected = "marked ready")]
    fn test_put_metadata_rejects_ready_index_with_build_uuid() {
        let clock = TxnClock::new();
        let catalog = catalog();
        let options = CollectionOptions::with_new_uuid();
        let foo = nss("db.foo");

        let mut ru = RecoveryUnit::begin(&clock);
        let (id, _) = create_collection(&catalog, &mut ru, &foo, "coll-1", &options).unwrap();
        let mut md = CatalogEntryMetaData::for_new_collection(&foo, &options);
        md.indexes.push(IndexMetaData {
            ready: true,
            build_uuid: Some(Uuid::new_v4()),
            ..index("a_1")
        });
        let _ = put_metadata(&catalog, &mut ru, id, &md);
    }

    #[test]
    fn test_create_index_and_ready_indexes() {
        let clock = TxnClock::new();
        let catalog = catalog();
        let options = CollectionOptions::with_new_uuid();
        let foo = nss("db.foo");

        let mut ru = RecoveryUnit::begin(&clock);
        let (id, _) = create_collection(&catalog, &mut ru, &foo, "coll-1", &options).unwrap();
        let mut md = CatalogEntryMetaData::for_new_collection(&foo, &options);
        md.indexes.push(IndexMetaData {
            ready: true,
            ..index("_id_")
        });
        md.indexes.push(index("a_1"));
        put_metadata(&catalog, &mut ru, id, &md).unwrap();

        create_index(&catalog, &mut ru, id, &foo, &options, &index_config("a_1")).unwrap();
        let ident = catalog.get_index_ident(&ru, id, "a_1").unwrap();
        assert!(catalog.engine().has_ident(&ident));

        assert!(is_index_present(&catalog, &ru, id, "a_1").unwrap());
        assert!(!is_index_present(&catalog, &ru, id, "b_1").unwrap());
        let ready = get_ready_indexes(&catalog, &ru, id).unwrap();
        assert_eq!(ready.into_iter().collect::<Vec<_>>(), vec!["_id_".to_string()]);

        assert!(create_index(&catalog, &mut ru, id, &foo, &options, &index_config("zzz")).is_err());

        ru.abort();
        assert!(!catalog.engine().has_ident(&ident));
        assert!(!catalog.engine().has_ident("coll-1"));
    }

    #[test]
    fn test_rename_collection_round_trip_is_byte_identical() {
        let clock = TxnClock::new();
        let catalog = catalog();
        let options = CollectionOptions::with_new_uuid();
        let foo = nss("db.foo");
        let bar = nss("db.bar");

        let mut ru = RecoveryUnit::begin(&clock);
        let (id, _) = create_collection(&catalog, &mut ru, &foo, "coll-1", &options).unwrap();
        ru.commit();

        let ru = RecoveryUnit::begin(&clock);
        let before = codec::encode_document(&catalog.get_raw_catalog_entry(&ru, id).unwrap()).unwrap();
        drop(ru);

        let mut ru = RecoveryUnit::begin(&clock);
        let mut md = CatalogEntryMetaData::for_new_collection(&bar, &options);
        rename_collection(&catalog, &mut ru, id, &bar, &md).unwrap();
        assert_eq!(catalog.get_entry(id).nss, bar);
        md.ns = foo.clone();
        rename_collection(&catalog, &mut ru, id, &foo, &md).unwrap();
        ru.commit();

        let ru = RecoveryUnit::begin(&clock);
        let after = codec::encode_document(&catalog.get_raw_catalog_entry(&ru, id).unwrap()).unwrap();
        assert_eq!(before, after);
        assert_eq!(catalog.get_entry(id).nss, foo);
    }

    #[test]
    fn test_import_collection() {
        let clock = TxnClock::new();
        let catalog = catalog();
        let foo = nss("db.foo");
        let options = CollectionOptions::with_new_uuid();
        let old_uuid = options.uuid.unwrap();

        let md = CatalogEntryMetaData::for_new_collection(&foo, &options);
        let mut idx = Document::new();
        idx.insert("_id_".to_string(), json!("index-7"));
        let metadata = codec::build_entry("coll-7", idx, md.to_value().unwrap(), &foo);
        let storage = json!({"coll-7": {}, "index-7": {}}).as_object().unwrap().clone();

        let mut ru = RecoveryUnit::begin(&clock);
        let result = import_collection(
            &catalog,
            &mut ru,
            &foo,
            &metadata,
            &storage,
            true,
            ImportOptions::default(),
        )
        .unwrap();
        assert_ne!(result.uuid, old_uuid);
        assert_eq!(result.rs.ident(), "coll-7");
        assert!(catalog.engine().has_ident("index-7"));
        let found = scan_for_catalog_entry_by_uuid(&catalog, &ru, result.uuid).unwrap();
        assert_eq!(found.unwrap().catalog_id, result.catalog_id);
        ru.abort();

        assert!(catalog.engine().all_idents().is_empty());
        assert!(catalog.find_entry(result.catalog_id).is_none());
    }

    #[test]
    fn test_import_collection_validates_metadata() {
        let clock = TxnClock::new();
        let catalog = catalog();
        let foo = nss("db.foo");
        let mut ru = RecoveryUnit::begin(&clock);

        let no_md = codec::simple_entry("coll-1", &foo);
        let err = import_collection(&catalog, &mut ru, &foo, &no_md, &Document::new(), false, ImportOptions::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("malformed catalog metadata"));

        let md = CatalogEntryMetaData::for_new_collection(&foo, &CollectionOptions::with_new_uuid());
        let mut no_ident = Document::new();
        no_ident.insert("md".to_string(), md.to_value().unwrap());
        let err = import_collection(&catalog, &mut ru, &foo, &no_ident, &Document::new(), false, ImportOptions::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("without an ident"));
    }

    #[test]
    fn test_drop_collection() {
        let clock = TxnClock::new();
        let catalog = catalog();
        let foo = nss("db.foo");
        let options = CollectionOptions::with_new_uuid();

        let mut ru = RecoveryUnit::begin(&clock);
        let (id, _) = create_collection(&catalog, &mut ru, &foo, "coll-1", &options).unwrap();
        drop_collection(&catalog, &mut ru, id).unwrap();
        assert!(catalog.find_entry(id).is_none());
        assert!(drop_collection(&catalog, &mut ru, id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_drop_and_recreate_index_ident_for_resume() {
        let engine = InMemoryKvEngine::new();
        let foo = nss("db.foo");
        let options = CollectionOptions::with_new_uuid();
        let config = index_config("a_1");
        let uuid = options.uuid.unwrap();
        engine
            .create_sorted_data_interface(&foo, uuid, "index-1", &config)
            .unwrap();

        drop_and_recreate_index_ident_for_resume(&engine, &foo, &options, &config, "index-1").unwrap();
        assert!(engine.has_ident("index-1"));
        assert!(
            drop_and_recreate_index_ident_for_resume(&engine, &foo, &options, &config, "index-2")
                .is_err()
        );
    }
}
