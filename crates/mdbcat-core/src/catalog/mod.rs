//! The durable ident catalog: a record store mapping namespaces to idents,
//! mirrored by an in-memory entry map.

pub mod codec;
pub mod durable;
pub mod entry_map;
pub mod feature_document;
pub mod ident;
pub mod mdb;
pub mod metadata;

use serde::Serialize;

use crate::types::{NamespaceString, RecordId};

pub use mdb::MdbCatalog;

/// One collection's storage binding as cached by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryIdentifier {
    pub catalog_id: RecordId,
    pub ident: String,
    pub nss: NamespaceString,
}

impl EntryIdentifier {
    pub fn new(catalog_id: RecordId, ident: impl Into<String>, nss: NamespaceString) -> Self {
        Self {
            catalog_id,
            ident: ident.into(),
            nss,
        }
    }
}
