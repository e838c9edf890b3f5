//! Error types for all catalog and storage operations.

use std::io;
use thiserror::Error;

use crate::types::RecordId;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Spill(#[from] SpillError),
}

impl Error {
    /// True for the not-found status returned by tolerant catalog lookups.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Catalog(CatalogError::NamespaceNotFound(_)))
    }

    /// True when the caller may retry the whole transaction.
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, Error::Storage(StorageError::WriteConflict(_)))
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupted checkpoint: {0}")]
    CorruptedCheckpoint(String),

    #[error("invalid magic bytes")]
    InvalidMagic,

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u32),

    #[error("checkpoint file is locked")]
    FileLocked,

    #[error("write conflict on {0}")]
    WriteConflict(RecordId),

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode catalog document: {0}")]
    Encode(String),

    #[error("failed to decode catalog document: {0}")]
    Decode(String),

    #[error("catalog document is missing field '{0}'")]
    MissingField(&'static str),

    #[error("catalog field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("bad value: {0}")]
    BadValue(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("ident already exists: {0}")]
    IdentExists(String),

    #[error("no such ident: {0}")]
    NoSuchIdent(String),

    #[error("bad storage metadata: {0}")]
    BadMetadata(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum SpillError {
    #[error("out of disk space: {0}")]
    OutOfDiskSpace(String),
}

pub type Result<T> = std::result::Result<T, Error>;
