//! Core types: record ids, stamps, namespaces, and the document alias.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Transaction identifier (monotonically increasing, shares the clock with
/// commit timestamps).
pub type TxnId = u64;

/// Commit / read timestamp.
pub type Timestamp = u64;

/// A structured catalog document. Field order is preserved.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Identifier of a record inside a record store.
///
/// Assigned by the store on insert, totally ordered, and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    pub const MIN: RecordId = RecordId(u64::MIN);

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        RecordId(value)
    }
}

/// A record as returned by a cursor or point lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub data: Vec<u8>,
}

/// Characters that may never appear in a database name.
const INVALID_DB_CHARS: &[char] = &['/', '\\', '.', ' ', '"', '$', '\0'];

/// A qualified `db.collection` name.
///
/// A namespace with an empty collection part names the database itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamespaceString {
    db: String,
    coll: String,
}

impl NamespaceString {
    /// Build a namespace from its parts, validating the database name.
    pub fn new(db: impl Into<String>, coll: impl Into<String>) -> Result<Self, CatalogError> {
        let db = db.into();
        let coll = coll.into();
        if db.is_empty() {
            return Err(CatalogError::BadValue("database name is empty".to_string()));
        }
        if let Some(c) = db.chars().find(|c| INVALID_DB_CHARS.contains(c)) {
            return Err(CatalogError::BadValue(format!(
                "database name '{db}' contains invalid character {c:?}"
            )));
        }
        if coll.contains('\0') {
            return Err(CatalogError::BadValue(format!(
                "collection name in '{db}' contains a null byte"
            )));
        }
        Ok(Self { db, coll })
    }

    /// Parse the catalog serialization (`db.coll`, or just `db`).
    pub fn parse(ns: &str) -> Result<Self, CatalogError> {
        match ns.split_once('.') {
            Some((db, coll)) => Self::new(db, coll),
            None => Self::new(ns, ""),
        }
    }

    pub fn db(&self) -> &str {
        &self.db
    }

    pub fn coll(&self) -> &str {
        &self.coll
    }

    /// True when the namespace names only a database.
    pub fn is_db_only(&self) -> bool {
        self.coll.is_empty()
    }
}

impl fmt::Display for NamespaceString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.coll.is_empty() {
            f.write_str(&self.db)
        } else {
            write!(f, "{}.{}", self.db, self.coll)
        }
    }
}

impl TryFrom<String> for NamespaceString {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NamespaceString> for String {
    fn from(value: NamespaceString) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_db_and_collection() {
        let nss = NamespaceString::parse("db.foo").unwrap();
        assert_eq!(nss.db(), "db");
        assert_eq!(nss.coll(), "foo");
        assert_eq!(nss.to_string(), "db.foo");
    }

    #[test]
    fn test_parse_keeps_dots_in_collection() {
        let nss = NamespaceString::parse("app.system.buckets.metrics").unwrap();
        assert_eq!(nss.db(), "app");
        assert_eq!(nss.coll(), "system.buckets.metrics");
    }

    #[test]
    fn test_parse_db_only() {
        let nss = NamespaceString::parse("admin").unwrap();
        assert!(nss.is_db_only());
        assert_eq!(nss.to_string(), "admin");
    }

    #[test]
    fn test_parse_rejects_bad_db_names() {
        assert!(NamespaceString::parse("").is_err());
        assert!(NamespaceString::parse(".foo").is_err());
        assert!(NamespaceString::parse("my db.foo").is_err());
        assert!(NamespaceString::parse("a$b.foo").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let nss = NamespaceString::parse("db.foo").unwrap();
        let value = serde_json::to_value(&nss).unwrap();
        assert_eq!(value, serde_json::json!("db.foo"));
        let back: NamespaceString = serde_json::from_value(value).unwrap();
        assert_eq!(back, nss);
        assert!(serde_json::from_value::<NamespaceString>(serde_json::json!("")).is_err());
    }

    #[test]
    fn test_record_id_ordering() {
        assert!(RecordId(1) < RecordId(2));
        assert_eq!(RecordId::from(7).as_u64(), 7);
        assert_eq!(RecordId(3).to_string(), "RecordId(3)");
    }
}
