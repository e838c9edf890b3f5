//! Encoding and decoding of raw catalog records.
//!
//! A record is a [`Document`] serialized with MessagePack. Field names are
//! exact and case-sensitive. Rewrites replace a field's value where it
//! already sits, so every other field keeps its position and bytes.

use serde_json::Value;

use crate::error::{CodecError, Error};
use crate::types::{Document, NamespaceString, RecordId};

use super::EntryIdentifier;

pub const IDENT_FIELD: &str = "ident";
pub const NS_FIELD: &str = "ns";
pub const IDX_IDENT_FIELD: &str = "idxIdent";
pub const MD_FIELD: &str = "md";

pub fn encode_document(doc: &Document) -> Result<Vec<u8>, CodecError> {
    rmp_serde::to_vec(doc).map_err(|e| CodecError::Encode(e.to_string()))
}

pub fn decode_document(bytes: &[u8]) -> Result<Document, CodecError> {
    rmp_serde::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

fn string_field<'d>(doc: &'d Document, field: &'static str) -> Result<&'d str, CodecError> {
    match doc.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(CodecError::WrongType {
            field,
            expected: "a string",
        }),
        None => Err(CodecError::MissingField(field)),
    }
}

pub fn ident(doc: &Document) -> Result<&str, CodecError> {
    string_field(doc, IDENT_FIELD)
}

pub fn namespace(doc: &Document) -> Result<NamespaceString, Error> {
    Ok(NamespaceString::parse(string_field(doc, NS_FIELD)?)?)
}

/// Decode the `{ident, ns}` binding of a record.
pub fn decode_entry(catalog_id: RecordId, doc: &Document) -> Result<EntryIdentifier, Error> {
    Ok(EntryIdentifier::new(catalog_id, ident(doc)?, namespace(doc)?))
}

fn index_ident_map(doc: &Document) -> Result<Option<&Document>, CodecError> {
    match doc.get(IDX_IDENT_FIELD) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(CodecError::WrongType {
            field: IDX_IDENT_FIELD,
            expected: "an object",
        }),
    }
}

/// Index idents in document order. A record without `idxIdent` has none.
pub fn index_idents(doc: &Document) -> Result<Vec<String>, CodecError> {
    let Some(map) = index_ident_map(doc)? else {
        return Ok(Vec::new());
    };
    map.values()
        .map(|v| match v {
            Value::String(s) => Ok(s.clone()),
            _ => Err(CodecError::WrongType {
                field: IDX_IDENT_FIELD,
                expected: "an object of strings",
            }),
        })
        .collect()
}

/// The ident of index `index_name`, or an empty string if it has none.
pub fn index_ident(doc: &Document, index_name: &str) -> Result<String, CodecError> {
    let Some(map) = index_ident_map(doc)? else {
        return Ok(String::new());
    };
    match map.get(index_name) {
        None => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(CodecError::WrongType {
            field: IDX_IDENT_FIELD,
            expected: "an object of strings",
        }),
    }
}

/// Set `field` to `value`, in place if it exists, appended otherwise.
pub fn with_field(mut doc: Document, field: &str, value: Value) -> Document {
    doc.insert(field.to_string(), value);
    doc
}

pub fn with_namespace(doc: Document, nss: &NamespaceString) -> Document {
    with_field(doc, NS_FIELD, Value::String(nss.to_string()))
}

pub fn with_index_idents(doc: Document, idx_ident: Document) -> Document {
    with_field(doc, IDX_IDENT_FIELD, Value::Object(idx_ident))
}

/// Replace `md`. Keys already stored keep their position at every level.
pub fn with_metadata(doc: Document, md: Value) -> Document {
    let md = match doc.get(MD_FIELD) {
        Some(old) => in_stored_order(old, &md),
        None => md,
    };
    with_field(doc, MD_FIELD, md)
}

/// `new`, with object keys ordered as in `old` and new keys appended.
fn in_stored_order(old: &Value, new: &Value) -> Value {
    match (old, new) {
        (Value::Object(old), Value::Object(new)) => {
            let mut merged = Document::new();
            for (key, old_value) in old {
                if let Some(value) = new.get(key) {
                    merged.insert(key.clone(), in_stored_order(old_value, value));
                }
            }
            for (key, value) in new {
                if !merged.contains_key(key) {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Value::Object(merged)
        }
        (Value::Array(old), Value::Array(new)) => Value::Array(
            new.iter()
                .enumerate()
                .map(|(i, value)| match old.get(i) {
                    Some(old_value) => in_stored_order(old_value, value),
                    None => value.clone(),
                })
                .collect(),
        ),
        _ => new.clone(),
    }
}

/// Assemble a fresh record in the canonical field order.
pub fn build_entry(ident: &str, idx_ident: Document, md: Value, nss: &NamespaceString) -> Document {
    let mut doc = Document::new();
    doc.insert(IDENT_FIELD.to_string(), Value::String(ident.to_string()));
    doc.insert(IDX_IDENT_FIELD.to_string(), Value::Object(idx_ident));
    doc.insert(MD_FIELD.to_string(), md);
    doc.insert(NS_FIELD.to_string(), Value::String(nss.to_string()));
    doc
}

/// A minimal record holding just an ident and a namespace.
pub fn simple_entry(ident: &str, nss: &NamespaceString) -> Document {
    let mut doc = Document::new();
    doc.insert(IDENT_FIELD.to_string(), Value::String(ident.to_string()));
    doc.insert(NS_FIELD.to_string(), Value::String(nss.to_string()));
    doc
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_decode_entry() {
        let raw = doc(json!({"ident": "coll-1", "ns": "db.foo", "extra": 1}));
        let entry = decode_entry(RecordId(3), &raw).unwrap();
        assert_eq!(entry.ident, "coll-1");
        assert_eq!(entry.nss.to_string(), "db.foo");
        assert_eq!(entry.catalog_id, RecordId(3));
    }

    #[test]
    fn test_field_names_are_case_sensitive() {
        let raw = doc(json!({"Ident": "coll-1", "ns": "db.foo"}));
        assert!(matches!(
            decode_entry(RecordId(1), &raw),
            Err(Error::Codec(CodecError::MissingField("ident")))
        ));
    }

    #[test]
    fn test_index_idents_in_document_order() {
        let raw = doc(json!({
            "ident": "coll-1",
            "idxIdent": {"_id_": "index-9", "b_1": "index-2", "a_1": "index-5"},
            "ns": "db.foo"
        }));
        assert_eq!(index_idents(&raw).unwrap(), vec!["index-9", "index-2", "index-5"]);
        assert_eq!(index_ident(&raw, "a_1").unwrap(), "index-5");
        assert_eq!(index_ident(&raw, "missing").unwrap(), "");
    }

    #[test]
    fn test_absent_index_idents() {
        let raw = doc(json!({"ident": "coll-1", "ns": "db.foo"}));
        assert!(index_idents(&raw).unwrap().is_empty());
        assert_eq!(index_ident(&raw, "_id_").unwrap(), "");
    }

    #[test]
    fn test_malformed_index_idents() {
        let raw = doc(json!({"ident": "coll-1", "idxIdent": ["x"], "ns": "db.foo"}));
        assert!(index_idents(&raw).is_err());
        let raw = doc(json!({"ident": "coll-1", "idxIdent": {"a_1": 4}, "ns": "db.foo"}));
        assert!(index_ident(&raw, "a_1").is_err());
    }

    #[test]
    fn test_rewrite_keeps_field_order_and_unknown_fields() {
        let raw = doc(json!({"ident": "coll-1", "ns": "db.foo", "engine": {"k": [1, 2]}}));
        let renamed = with_namespace(raw.clone(), &NamespaceString::parse("db.bar").unwrap());
        let keys: Vec<&str> = renamed.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["ident", "ns", "engine"]);
        assert_eq!(renamed["engine"], raw["engine"]);

        let back = with_namespace(renamed, &NamespaceString::parse("db.foo").unwrap());
        assert_eq!(encode_document(&back).unwrap(), encode_document(&raw).unwrap());
    }

    #[test]
    fn test_metadata_rewrite_keeps_stored_key_order() {
        let raw = doc(json!({
            "ident": "coll-1",
            "md": {"options": {"collation": {"locale": "fr"}, "uuid": "u"}, "ns": "db.foo", "indexes": [{"ready": true, "spec": {"name": "a_1"}}]},
            "ns": "db.foo"
        }));
        let md = json!({
            "ns": "db.bar",
            "options": {"uuid": "u", "collation": {"locale": "fr"}},
            "indexes": [{"spec": {"name": "a_1"}, "ready": false}, {"spec": {"name": "b_1"}, "ready": false}],
            "added": 1
        });
        let rewritten = with_metadata(raw, md.clone());
        let stored = rewritten["md"].as_object().unwrap();
        let keys: Vec<&str> = stored.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["options", "ns", "indexes", "added"]);
        let option_keys: Vec<&str> = stored["options"].as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(option_keys, vec!["collation", "uuid"]);
        let index_keys: Vec<&str> = stored["indexes"][0].as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(index_keys, vec!["ready", "spec"]);
        assert_eq!(rewritten["md"], md);
    }

    #[test]
    fn test_build_entry_field_order() {
        let nss = NamespaceString::parse("db.foo").unwrap();
        let built = build_entry("coll-1", Document::new(), json!({"ns": "db.foo"}), &nss);
        let keys: Vec<&str> = built.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["ident", "idxIdent", "md", "ns"]);
    }

    #[test]
    fn test_encoded_bytes_decode_to_same_document() {
        let raw = doc(json!({"ident": "coll-1", "ns": "db.foo", "n": 1.5, "z": null}));
        let bytes = encode_document(&raw).unwrap();
        assert_eq!(decode_document(&bytes).unwrap(), raw);
        assert!(decode_document(b"\xc1").is_err());
    }
}
