use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mdbcat_core::catalog::codec;
use mdbcat_core::catalog::durable;
use mdbcat_core::catalog::feature_document::{build_feature_document, is_feature_document};
use mdbcat_core::catalog::metadata::CollectionOptions;
use mdbcat_core::config::CatalogOptions;
use mdbcat_core::engine::InMemoryKvEngine;
use mdbcat_core::error::{CatalogError, Error, Result, StorageError};
use mdbcat_core::storage::{HeapRecordStore, RecordStore, RecoveryUnit, TxnClock};
use mdbcat_core::types::{Document, NamespaceString, RecordId};
use mdbcat_core::{EntryIdentifier, MdbCatalog};
use serde::Serialize;
use tracing::{debug, info};

use crate::commands::Command;

/// Ident of the record store backing the catalog.
pub const CATALOG_IDENT: &str = "_mdb_catalog";

/// Structured result from executing a command.
#[derive(Debug)]
pub enum CommandResult {
    /// Mutation succeeded.
    Ok(String),
    /// Every cached entry (LIST).
    Entries(Vec<EntryIdentifier>),
    /// Every ident (IDENTS).
    Idents(Vec<String>),
    /// Raw document at a catalog id (SHOW); `None` if nothing is stored there.
    Document(RecordId, Option<Document>),
    /// Index idents of one entry (INDEX-IDENTS).
    IndexIdents(RecordId, Vec<String>),
    /// Integrity report (VERIFY).
    Verify(VerifyReport),
}

/// What `verify` found in a checkpoint.
#[derive(Debug, Default, Serialize)]
pub struct VerifyReport {
    pub records: u64,
    pub entries: usize,
    pub feature_documents: usize,
    pub idents: usize,
    pub undecodable: Vec<u64>,
    pub duplicate_namespaces: Vec<String>,
    pub duplicate_idents: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.undecodable.is_empty()
            && self.duplicate_namespaces.is_empty()
            && self.duplicate_idents.is_empty()
            && self.feature_documents <= 1
    }
}

/// A catalog loaded from a checkpoint file.
pub struct Session {
    path: PathBuf,
    rs: Arc<HeapRecordStore>,
    clock: TxnClock,
    catalog: MdbCatalog,
}

impl Session {
    pub fn open(path: &Path, options: CatalogOptions) -> Result<Self> {
        let rs = Arc::new(HeapRecordStore::open_checkpoint(path)?);
        let clock = TxnClock::new();
        let mut catalog = MdbCatalog::new(
            Arc::clone(&rs) as Arc<dyn RecordStore>,
            Arc::new(InMemoryKvEngine::new()),
            options,
        );
        let loaded = catalog.init(&RecoveryUnit::begin(&clock))?;
        debug!(path = %path.display(), entries = loaded, "opened catalog");
        Ok(Self {
            path: path.to_path_buf(),
            rs,
            clock,
            catalog,
        })
    }

    fn save(&self) -> Result<()> {
        let written = self.rs.checkpoint(&self.path)?;
        info!(path = %self.path.display(), records = written, "wrote catalog checkpoint");
        Ok(())
    }

    fn list(&self) -> CommandResult {
        CommandResult::Entries(self.catalog.cached_entries())
    }

    fn idents(&self) -> Result<CommandResult> {
        let ru = RecoveryUnit::begin(&self.clock);
        Ok(CommandResult::Idents(self.catalog.get_all_idents(&ru)?))
    }

    fn show(&self, id: RecordId) -> Result<CommandResult> {
        let ru = RecoveryUnit::begin(&self.clock);
        let doc = self.catalog.get_raw_catalog_entry(&ru, id)?;
        Ok(CommandResult::Document(id, (!doc.is_empty()).then_some(doc)))
    }

    fn index_idents(&self, id: RecordId) -> Result<CommandResult> {
        self.require_entry(id)?;
        let ru = RecoveryUnit::begin(&self.clock);
        Ok(CommandResult::IndexIdents(
            id,
            self.catalog.get_index_idents(&ru, id)?,
        ))
    }

    fn add(&self, ns: &str, ident: Option<String>) -> Result<CommandResult> {
        let nss = collection_namespace(ns)?;
        self.require_unused(&nss)?;
        let ident = ident.unwrap_or_else(|| durable::new_collection_ident(&self.catalog, &nss));

        let mut ru = RecoveryUnit::begin(&self.clock);
        let (id, _rs) = durable::create_collection(
            &self.catalog,
            &mut ru,
            &nss,
            &ident,
            &CollectionOptions::with_new_uuid(),
        )?;
        ru.commit();
        self.save()?;
        Ok(CommandResult::Ok(format!("Added {nss} as {id} ({ident}).")))
    }

    fn rename(&self, id: RecordId, ns: &str) -> Result<CommandResult> {
        let to = collection_namespace(ns)?;
        let from = self.require_entry(id)?.nss;
        self.require_unused(&to)?;

        let mut ru = RecoveryUnit::begin(&self.clock);
        let parsed = durable::get_parsed_catalog_entry(&self.catalog, &ru, id)?;
        match parsed.and_then(|entry| entry.metadata) {
            Some(mut md) => {
                md.ns = to.clone();
                durable::rename_collection(&self.catalog, &mut ru, id, &to, &md)?;
            }
            None => {
                let doc = codec::with_namespace(self.catalog.get_raw_catalog_entry(&ru, id)?, &to);
                self.catalog.put_renamed_entry(&mut ru, id, &to, &doc)?;
            }
        }
        ru.commit();
        self.save()?;
        Ok(CommandResult::Ok(format!("Renamed {from} to {to}.")))
    }

    fn remove(&self, id: RecordId) -> Result<CommandResult> {
        let mut ru = RecoveryUnit::begin(&self.clock);
        self.catalog.remove_entry(&mut ru, id)?;
        ru.commit();
        self.save()?;
        Ok(CommandResult::Ok(format!("Removed {id}.")))
    }

    fn require_entry(&self, id: RecordId) -> Result<EntryIdentifier> {
        self.catalog
            .find_entry(id)
            .ok_or_else(|| CatalogError::NamespaceNotFound(format!("no catalog entry {id}")).into())
    }

    fn require_unused(&self, nss: &NamespaceString) -> Result<()> {
        if self.catalog.cached_entries().iter().any(|e| e.nss == *nss) {
            return Err(CatalogError::BadValue(format!("namespace {nss} already exists")).into());
        }
        Ok(())
    }
}

fn collection_namespace(ns: &str) -> Result<NamespaceString> {
    let nss = NamespaceString::parse(ns)?;
    if nss.is_db_only() {
        return Err(CatalogError::BadValue(format!("'{ns}' does not name a collection")).into());
    }
    Ok(nss)
}

/// Write a catalog checkpoint holding only the feature document.
pub fn init(path: &Path, force: bool) -> Result<CommandResult> {
    if path.exists() && !force {
        return Err(StorageError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists (use --force to overwrite)", path.display()),
        ))
        .into());
    }
    let clock = TxnClock::new();
    let rs = HeapRecordStore::new(CATALOG_IDENT);
    let mut ru = RecoveryUnit::begin(&clock);
    rs.insert_record(&mut ru, &codec::encode_document(&build_feature_document(0, 0))?)?;
    ru.commit();
    rs.checkpoint(path)?;
    Ok(CommandResult::Ok(format!("Initialized {}.", path.display())))
}

/// Check a checkpoint without trusting it: the checksum is verified on load
/// and every record is decoded individually.
pub fn verify(path: &Path) -> Result<CommandResult> {
    let rs = HeapRecordStore::open_checkpoint(path)?;
    let mut report = VerifyReport {
        records: rs.num_records(),
        ..VerifyReport::default()
    };

    let mut namespaces: BTreeMap<String, usize> = BTreeMap::new();
    let mut idents: BTreeMap<String, usize> = BTreeMap::new();
    for (id, data) in rs.committed_records() {
        let doc = match codec::decode_document(&data) {
            Ok(doc) => doc,
            Err(_) => {
                report.undecodable.push(id.as_u64());
                continue;
            }
        };
        if is_feature_document(&doc) {
            report.feature_documents += 1;
            continue;
        }
        let Ok(entry) = codec::decode_entry(id, &doc) else {
            report.undecodable.push(id.as_u64());
            continue;
        };
        report.entries += 1;
        *namespaces.entry(entry.nss.to_string()).or_default() += 1;
        *idents.entry(entry.ident).or_default() += 1;
        for index_ident in codec::index_idents(&doc).unwrap_or_default() {
            *idents.entry(index_ident).or_default() += 1;
        }
    }

    report.idents = idents.len();
    report.duplicate_namespaces = duplicates(namespaces);
    report.duplicate_idents = duplicates(idents);
    Ok(CommandResult::Verify(report))
}

fn duplicates(counts: BTreeMap<String, usize>) -> Vec<String> {
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(key, _)| key)
        .collect()
}

/// Execute a command against the catalog checkpoint at `path`.
pub fn execute(path: &Path, options: CatalogOptions, cmd: Command) -> Result<CommandResult> {
    debug!(?cmd, mutation = cmd.is_mutation(), "executing command");
    match cmd {
        Command::Init { force } => init(path, force),
        Command::Verify => verify(path),
        Command::List => Ok(Session::open(path, options)?.list()),
        Command::Idents => Session::open(path, options)?.idents(),
        Command::Show { id } => Session::open(path, options)?.show(RecordId(id)),
        Command::IndexIdents { id } => Session::open(path, options)?.index_idents(RecordId(id)),
        Command::Add { ns, ident } => Session::open(path, options)?.add(&ns, ident),
        Command::Rename { id, ns } => Session::open(path, options)?.rename(RecordId(id), &ns),
        Command::Remove { id } => Session::open(path, options)?.remove(RecordId(id)),
    }
}

/// Process exit code for a failed command: 2 for a missing entry, 1 otherwise.
pub fn exit_code(err: &Error) -> i32 {
    if err.is_not_found() { 2 } else { 1 }
}
