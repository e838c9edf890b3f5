//! Generation of fresh idents for collections and indexes.
//!
//! An ident looks like `[<db>/]collection-<uuid>`; with directory-for-indexes
//! the separator after the kind becomes `/` so that collections and indexes
//! land in separate directories.

use uuid::Uuid;

const COLLECTION: &str = "collection";
const INDEX: &str = "index";

fn generate(kind: &str, db: &str, directory_per_db: bool, directory_for_indexes: bool) -> String {
    let mut ident = String::new();
    if directory_per_db {
        ident.push_str(db);
        ident.push('/');
    }
    ident.push_str(kind);
    ident.push(if directory_for_indexes { '/' } else { '-' });
    ident.push_str(&Uuid::new_v4().to_string());
    ident
}

pub fn generate_new_collection_ident(
    db: &str,
    directory_per_db: bool,
    directory_for_indexes: bool,
) -> String {
    generate(COLLECTION, db, directory_per_db, directory_for_indexes)
}

pub fn generate_new_index_ident(
    db: &str,
    directory_per_db: bool,
    directory_for_indexes: bool,
) -> String {
    generate(INDEX, db, directory_per_db, directory_for_indexes)
}

fn has_kind(ident: &str, kind: &str) -> bool {
    let base = ident.rsplit_once('/').map_or(ident, |(dir, tail)| {
        // `db/index/<uuid>` keeps the kind in the directory part.
        if dir.strip_suffix(kind).is_some_and(|d| d.is_empty() || d.ends_with('/')) {
            kind
        } else {
            tail
        }
    });
    base.strip_prefix(kind)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('-'))
}

pub fn is_collection_ident(ident: &str) -> bool {
    has_kind(ident, COLLECTION)
}

pub fn is_index_ident(ident: &str) -> bool {
    has_kind(ident, INDEX)
}
