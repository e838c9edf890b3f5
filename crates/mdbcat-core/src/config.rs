//! Construction-time options.

use serde::{Deserialize, Serialize};

/// Layout flags steering how the catalog names new idents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CatalogOptions {
    /// Place every database's idents in a directory named after it.
    pub directory_per_db: bool,
    /// Place collection and index idents in separate directories.
    pub directory_for_indexes: bool,
}

/// Default free-space floor below which spill tables refuse writes: 100 MiB.
pub const DEFAULT_SPILL_THRESHOLD_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpillTableOptions {
    pub threshold_bytes: u64,
}

impl Default for SpillTableOptions {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_SPILL_THRESHOLD_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_options_fill_defaults() {
        let options: CatalogOptions =
            serde_json::from_str(r#"{"directoryPerDb": true}"#).unwrap();
        assert!(options.directory_per_db);
        assert!(!options.directory_for_indexes);

        let spill: SpillTableOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(spill.threshold_bytes, DEFAULT_SPILL_THRESHOLD_BYTES);
    }
}
