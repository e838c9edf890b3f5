//! mdbcat console: inspect and edit a catalog checkpoint from the command line.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use mdbcat_core::config::CatalogOptions;

mod commands;
mod display;
mod executor;

use commands::Command;
use display::OutputMode;

/// Inspect and edit durable ident catalog checkpoints.
#[derive(Parser, Debug)]
#[command(name = "mdbcat", version)]
struct Cli {
    /// Catalog checkpoint file.
    #[arg(short, long, default_value = "catalog.mdbc")]
    catalog: PathBuf,

    /// Output results as machine-parseable JSON.
    #[arg(short, long)]
    json: bool,

    /// Prefix generated idents with the database name.
    #[arg(long)]
    directory_per_db: bool,

    /// Place generated collection and index idents in separate directories.
    #[arg(long)]
    directory_for_indexes: bool,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Pretty
    };
    let options = CatalogOptions {
        directory_per_db: cli.directory_per_db,
        directory_for_indexes: cli.directory_for_indexes,
    };

    match executor::execute(&cli.catalog, options, cli.command) {
        Ok(result) => {
            if !display::render(&result, &mode) {
                process::exit(1);
            }
        }
        Err(e) => {
            display::render_error(&e, &mode);
            process::exit(executor::exit_code(&e));
        }
    }
}
