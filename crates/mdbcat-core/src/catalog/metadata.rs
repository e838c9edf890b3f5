//! Collection metadata stored under a catalog record's `md` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::engine::RecordStoreOptions;
use crate::error::CodecError;
use crate::types::{Document, NamespaceString};

/// User-facing options a collection was created with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capped: Option<bool>,
    #[serde(default, rename = "size", skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeseries: Option<Document>,
    /// Options this crate does not interpret, kept as stored.
    #[serde(flatten)]
    pub extra: Document,
}

impl CollectionOptions {
    pub fn with_new_uuid() -> Self {
        Self {
            uuid: Some(Uuid::new_v4()),
            ..Self::default()
        }
    }

    pub fn is_capped(&self) -> bool {
        self.capped.unwrap_or(false)
    }

    pub fn record_store_options(&self) -> RecordStoreOptions {
        RecordStoreOptions {
            capped: self.is_capped(),
            max_size_bytes: self.max_size_bytes,
        }
    }
}

/// Catalog state of one index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMetaData {
    pub spec: Document,
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multikey: Option<bool>,
    #[serde(default, rename = "buildUUID", skip_serializing_if = "Option::is_none")]
    pub build_uuid: Option<Uuid>,
    #[serde(flatten)]
    pub extra: Document,
}

impl IndexMetaData {
    /// Metadata for an index whose build has not started.
    pub fn new(spec: Document) -> Self {
        Self {
            spec,
            ..Self::default()
        }
    }

    /// The index name from `spec.name`, or `""` when the spec has none.
    pub fn name(&self) -> &str {
        self.spec.get("name").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn is_multikey(&self) -> bool {
        self.multikey.unwrap_or(false)
    }

    /// Slots with an empty spec are placeholders and are skipped.
    pub fn is_present(&self) -> bool {
        !self.spec.is_empty()
    }
}

/// Everything the catalog persists about a collection besides its idents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntryMetaData {
    pub ns: NamespaceString,
    #[serde(default)]
    pub options: CollectionOptions,
    #[serde(default)]
    pub indexes: Vec<IndexMetaData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeseries_buckets_may_have_mixed_schema_data: Option<bool>,
    #[serde(flatten)]
    pub extra: Document,
}

impl CatalogEntryMetaData {
    /// Metadata for a collection about to be created.
    pub fn for_new_collection(nss: &NamespaceString, options: &CollectionOptions) -> Self {
        // New time-series buckets never hold mixed-schema data.
        let mixed_schema = options.timeseries.as_ref().map(|_| false);
        Self {
            ns: nss.clone(),
            options: options.clone(),
            indexes: Vec::new(),
            timeseries_buckets_may_have_mixed_schema_data: mixed_schema,
            extra: Document::new(),
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, CodecError> {
        if !value.is_object() {
            return Err(CodecError::WrongType {
                field: "md",
                expected: "an object",
            });
        }
        serde_json::from_value(value.clone()).map_err(|e| CodecError::Decode(e.to_string()))
    }

    pub fn to_value(&self) -> Result<Value, CodecError> {
        serde_json::to_value(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Position of the index named `name`.
    pub fn find_index_offset(&self, name: &str) -> Option<usize> {
        self.indexes
            .iter()
            .position(|index| index.is_present() && index.name() == name)
    }

    pub fn total_index_count(&self) -> usize {
        self.indexes.iter().filter(|index| index.is_present()).count()
    }

    /// Names of the indexes whose build has finished.
    pub fn ready_index_names(&self) -> Vec<String> {
        self.indexes
            .iter()
            .filter(|index| index.is_present() && index.ready)
            .map(|index| index.name().to_string())
            .collect()
    }
}
