//! The feature document: a reserved record in the catalog's store that
//! tracks on-disk format features. It names no collection and every
//! enumeration skips it.

use serde_json::Value;

use crate::types::Document;

pub const IS_FEATURE_DOC_FIELD: &str = "isFeatureDoc";
pub const NON_REPAIRABLE_FIELD: &str = "nonRepairable";
pub const REPAIRABLE_FIELD: &str = "repairable";

/// True if `doc` is the feature document: its first field is
/// `isFeatureDoc` holding a truthy value.
pub fn is_feature_document(doc: &Document) -> bool {
    match doc.iter().next() {
        Some((name, value)) if name == IS_FEATURE_DOC_FIELD => is_truthy(value),
        _ => false,
    }
}

/// Build a feature document carrying the two feature bitsets.
pub fn build_feature_document(non_repairable: u64, repairable: u64) -> Document {
    let mut doc = Document::new();
    doc.insert(IS_FEATURE_DOC_FIELD.to_string(), Value::Bool(true));
    doc.insert("ns".to_string(), Value::Null);
    doc.insert(NON_REPAIRABLE_FIELD.to_string(), Value::from(non_repairable));
    doc.insert(REPAIRABLE_FIELD.to_string(), Value::from(repairable));
    doc
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}
