use mdbcat_core::EntryIdentifier;
use mdbcat_core::types::{Document, RecordId};
use serde_json::json;

use crate::executor::{CommandResult, VerifyReport};

/// Output mode for rendering command results.
pub enum OutputMode {
    /// Human-readable output.
    Pretty,
    /// Machine-parseable JSON (one JSON object per result on stdout).
    Json,
}

/// Render a command result to stdout in the given mode.
///
/// Returns `false` when the result describes a problem (a failed verify).
pub fn render(result: &CommandResult, mode: &OutputMode) -> bool {
    match result {
        CommandResult::Ok(msg) => match mode {
            OutputMode::Pretty => print_ok(msg),
            OutputMode::Json => println!("{}", json!({"ok": true, "message": msg})),
        },
        CommandResult::Entries(entries) => match mode {
            OutputMode::Pretty => print_entries(entries),
            OutputMode::Json => println!("{}", json!({"entries": entries})),
        },
        CommandResult::Idents(idents) => match mode {
            OutputMode::Pretty => print_idents(idents),
            OutputMode::Json => println!("{}", json!({"idents": idents})),
        },
        CommandResult::Document(id, doc) => match mode {
            OutputMode::Pretty => match doc {
                Some(doc) => print_document(doc),
                None => print_not_found(id),
            },
            OutputMode::Json => match doc {
                Some(doc) => println!(
                    "{}",
                    json!({"found": true, "catalog_id": id.as_u64(), "document": doc})
                ),
                None => println!("{}", json!({"found": false, "catalog_id": id.as_u64()})),
            },
        },
        CommandResult::IndexIdents(id, idents) => match mode {
            OutputMode::Pretty => print_idents(idents),
            OutputMode::Json => println!(
                "{}",
                json!({"catalog_id": id.as_u64(), "index_idents": idents})
            ),
        },
        CommandResult::Verify(report) => {
            match mode {
                OutputMode::Pretty => print_verify_report(report),
                OutputMode::Json => println!(
                    "{}",
                    json!({"clean": report.is_clean(), "report": report})
                ),
            }
            return report.is_clean();
        }
    }
    true
}

pub fn render_error(err: &dyn std::fmt::Display, mode: &OutputMode) {
    match mode {
        OutputMode::Pretty => print_error(err),
        OutputMode::Json => {
            eprintln!("{}", json!({"error": err.to_string()}));
        }
    }
}

/// Print catalog entries as an aligned table.
pub fn print_entries(entries: &[EntryIdentifier]) {
    if entries.is_empty() {
        println!("No catalog entries.");
        return;
    }
    let ns_width = entries
        .iter()
        .map(|e| e.nss.to_string().len())
        .max()
        .unwrap_or(0)
        .max("NAMESPACE".len());
    println!("{:>6}  {:<ns_width$}  IDENT", "ID", "NAMESPACE");
    for entry in entries {
        println!(
            "{:>6}  {:<ns_width$}  {}",
            entry.catalog_id.as_u64(),
            entry.nss.to_string(),
            entry.ident
        );
    }
    let n = entries.len();
    println!("({n} entr{})", if n == 1 { "y" } else { "ies" });
}

pub fn print_idents(idents: &[String]) {
    if idents.is_empty() {
        println!("No idents.");
    } else {
        for ident in idents {
            println!("  {ident}");
        }
        let n = idents.len();
        println!("({n} ident(s))");
    }
}

pub fn print_document(doc: &Document) {
    match serde_json::to_string_pretty(doc) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Error formatting document: {e}"),
    }
}

pub fn print_not_found(id: &RecordId) {
    println!("No catalog record at {id}.");
}

fn print_verify_report(report: &VerifyReport) {
    println!("Records:           {}", report.records);
    println!("Entries:           {}", report.entries);
    println!("Feature documents: {}", report.feature_documents);
    println!("Idents:            {}", report.idents);
    for id in &report.undecodable {
        println!("  undecodable record {id}");
    }
    for ns in &report.duplicate_namespaces {
        println!("  duplicate namespace {ns}");
    }
    for ident in &report.duplicate_idents {
        println!("  duplicate ident {ident}");
    }
    if report.feature_documents > 1 {
        println!("  more than one feature document");
    }
    println!("{}", if report.is_clean() { "OK" } else { "PROBLEMS FOUND" });
}

/// Print a success message.
pub fn print_ok(msg: &str) {
    println!("{msg}");
}

/// Print an error message to stderr.
pub fn print_error(err: &dyn std::fmt::Display) {
    eprintln!("Error: {err}");
}
