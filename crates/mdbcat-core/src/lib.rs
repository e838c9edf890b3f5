//! # mdbcat
//!
//! The durable ident catalog of a transactional storage engine.
//!
//! The catalog is a record store mapping every collection's namespace to the
//! ident of the physical table holding it, plus the idents of its indexes.
//! An in-memory entry map mirrors the record store and is kept consistent
//! with it across commits and rollbacks of the recovery unit each operation
//! runs in.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mdbcat_core::catalog::durable;
//! use mdbcat_core::catalog::metadata::CollectionOptions;
//! use mdbcat_core::catalog::MdbCatalog;
//! use mdbcat_core::config::CatalogOptions;
//! use mdbcat_core::engine::InMemoryKvEngine;
//! use mdbcat_core::storage::{HeapRecordStore, RecoveryUnit, TxnClock};
//! use mdbcat_core::types::NamespaceString;
//!
//! let clock = TxnClock::new();
//! let mut catalog = MdbCatalog::new(
//!     Arc::new(HeapRecordStore::new("_mdb_catalog")),
//!     Arc::new(InMemoryKvEngine::new()),
//!     CatalogOptions::default(),
//! );
//! catalog.init(&RecoveryUnit::begin(&clock)).unwrap();
//!
//! let nss = NamespaceString::parse("shop.orders").unwrap();
//! let ident = durable::new_collection_ident(&catalog, &nss);
//! let mut ru = RecoveryUnit::begin(&clock);
//! let (catalog_id, _rs) = durable::create_collection(
//!     &catalog,
//!     &mut ru,
//!     &nss,
//!     &ident,
//!     &CollectionOptions::with_new_uuid(),
//! )
//! .unwrap();
//! ru.commit();
//!
//! assert_eq!(catalog.get_entry(catalog_id).nss, nss);
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod spill;
pub mod storage;
pub mod types;

pub use catalog::{EntryIdentifier, MdbCatalog};
pub use error::{Error, Result};
