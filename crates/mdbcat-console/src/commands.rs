use clap::Subcommand;

/// A console command. Every command opens the catalog checkpoint, runs in
/// its own recovery unit and, for mutations, writes the checkpoint back.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty catalog checkpoint holding only the feature document.
    Init {
        /// Overwrite an existing checkpoint.
        #[arg(long)]
        force: bool,
    },
    /// List every catalog entry.
    List,
    /// List every collection and index ident.
    Idents,
    /// Print the raw catalog document stored at a catalog id.
    Show {
        /// Catalog id of the entry.
        id: u64,
    },
    /// List the index idents of an entry.
    IndexIdents {
        /// Catalog id of the entry.
        id: u64,
    },
    /// Add a collection entry.
    Add {
        /// Namespace, as `<db>.<collection>`.
        #[arg(long)]
        ns: String,
        /// Ident to record. Generated when omitted.
        #[arg(long)]
        ident: Option<String>,
    },
    /// Point an entry at a new namespace.
    Rename {
        /// Catalog id of the entry.
        id: u64,
        /// New namespace, as `<db>.<collection>`.
        ns: String,
    },
    /// Remove an entry.
    Remove {
        /// Catalog id of the entry.
        id: u64,
    },
    /// Check the checkpoint's integrity and the catalog's invariants.
    Verify,
}

impl Command {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Command::Init { .. } | Command::Add { .. } | Command::Rename { .. } | Command::Remove { .. }
        )
    }
}
