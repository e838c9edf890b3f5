//! Checkpoint files: a durable image of a record store's committed records.
//!
//! Layout (all integers little-endian):
//! ```text
//! [0..4]    magic: "MDBC"
//! [4..8]    version: u32 (1)
//! [8..16]   next_id: u64
//! [16..24]  record_count: u64
//! [24..28]  ident_len: u32, followed by the ident bytes (UTF-8)
//! records:  id: u64, data_len: u32, data bytes; repeated record_count times
//! trailer:  xxhash64 of every preceding byte: u64
//! ```
//!
//! Files are written to `<path>.tmp` and renamed into place while holding an
//! exclusive [`FileLock`].

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::debug;
use xxhash_rust::xxh64::xxh64;

use crate::error::StorageError;
use crate::types::RecordId;

use super::lock::FileLock;

/// Magic bytes identifying a checkpoint file.
pub const MAGIC: &[u8; 4] = b"MDBC";

/// Current checkpoint format version.
pub const VERSION: u32 = 1;

const TRAILER_LEN: usize = 8;

/// Everything a checkpoint carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointContents {
    pub ident: String,
    pub next_id: u64,
    pub records: Vec<(RecordId, Vec<u8>)>,
}

/// Serialize `contents` into the checkpoint byte layout.
pub fn encode(contents: &CheckpointContents) -> Result<Vec<u8>, StorageError> {
    let ident_len = u32::try_from(contents.ident.len())
        .map_err(|_| StorageError::CorruptedCheckpoint("ident too long".to_string()))?;

    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());
    buf.extend_from_slice(&contents.next_id.to_le_bytes());
    buf.extend_from_slice(&(contents.records.len() as u64).to_le_bytes());
    buf.extend_from_slice(&ident_len.to_le_bytes());
    buf.extend_from_slice(contents.ident.as_bytes());
    for (id, data) in &contents.records {
        let len = u32::try_from(data.len()).map_err(|_| {
            StorageError::CorruptedCheckpoint(format!("{id} is too large to checkpoint"))
        })?;
        buf.extend_from_slice(&id.as_u64().to_le_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(data);
    }
    let checksum = xxh64(&buf, 0);
    buf.extend_from_slice(&checksum.to_le_bytes());
    Ok(buf)
}

/// Parse and validate a checkpoint image.
pub fn decode(bytes: &[u8]) -> Result<CheckpointContents, StorageError> {
    if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
        return Err(StorageError::InvalidMagic);
    }
    if bytes.len() < MAGIC.len() + 4 + TRAILER_LEN {
        return Err(StorageError::CorruptedCheckpoint("file is truncated".to_string()));
    }

    let (body, trailer) = bytes.split_at(bytes.len() - TRAILER_LEN);
    let mut reader = Reader { rest: &body[MAGIC.len()..] };

    let version = reader.u32()?;
    if version != VERSION {
        return Err(StorageError::UnsupportedVersion(version));
    }

    let stored = u64::from_le_bytes(fixed(trailer)?);
    let computed = xxh64(body, 0);
    if stored != computed {
        return Err(StorageError::CorruptedCheckpoint(format!(
            "checksum mismatch: stored={stored:#018x}, computed={computed:#018x}"
        )));
    }

    let next_id = reader.u64()?;
    let count = reader.u64()?;
    let ident_len = reader.u32()? as usize;
    let ident = String::from_utf8(reader.take(ident_len)?.to_vec())
        .map_err(|e| StorageError::CorruptedCheckpoint(format!("ident is not UTF-8: {e}")))?;

    let mut records = Vec::new();
    for _ in 0..count {
        let id = RecordId(reader.u64()?);
        let len = reader.u32()? as usize;
        records.push((id, reader.take(len)?.to_vec()));
    }
    if !reader.rest.is_empty() {
        return Err(StorageError::CorruptedCheckpoint(format!(
            "{} trailing bytes after {count} records",
            reader.rest.len()
        )));
    }

    Ok(CheckpointContents {
        ident,
        next_id,
        records,
    })
}

/// Atomically replace the checkpoint at `path`.
pub fn write_checkpoint(path: &Path, contents: &CheckpointContents) -> Result<(), StorageError> {
    let bytes = encode(contents)?;
    let _lock = FileLock::exclusive(path)?;

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;

    debug!(
        path = %path.display(),
        records = contents.records.len(),
        bytes = bytes.len(),
        "wrote checkpoint"
    );
    Ok(())
}

/// Read and validate the checkpoint at `path`.
pub fn read_checkpoint(path: &Path) -> Result<CheckpointContents, StorageError> {
    let _lock = FileLock::shared(path)?;
    let bytes = fs::read(path)?;
    decode(&bytes)
}

struct Reader<'b> {
    rest: &'b [u8],
}

impl<'b> Reader<'b> {
    fn take(&mut self, n: usize) -> Result<&'b [u8], StorageError> {
        if self.rest.len() < n {
            return Err(StorageError::CorruptedCheckpoint(format!(
                "needed {n} bytes, {} left",
                self.rest.len()
            )));
        }
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Ok(head)
    }

    fn u32(&mut self) -> Result<u32, StorageError> {
        Ok(u32::from_le_bytes(fixed(self.take(4)?)?))
    }

    fn u64(&mut self) -> Result<u64, StorageError> {
        Ok(u64::from_le_bytes(fixed(self.take(8)?)?))
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], StorageError> {
    bytes
        .try_into()
        .map_err(|_| StorageError::CorruptedCheckpoint(format!("expected {N} bytes")))
}
