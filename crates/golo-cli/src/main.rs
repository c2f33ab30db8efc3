//! golo - build Go-style projects straight from their repository

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use golo_pkg::CacheKey;
use std::path::PathBuf;

mod build_cmd;
mod cache_cmd;
mod config;
mod toolchain;
mod vcs;

use config::{GlobalArgs, Settings};

#[derive(Parser)]
#[command(name = "golo")]
#[command(version)]
#[command(about = "Discover, resolve and build Go-style packages", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the project and build every package (default)
    Build,

    /// List the project's packages followed by their dependencies
    List {
        /// Print full package descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage pinned package snapshots
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Print the snapshot directory for a pin
    Path {
        /// Module identifier prefix served by the snapshot
        prefix: String,
        /// Kind of pin, e.g. rev
        kind: String,
        /// Pin argument, e.g. a revision
        arg: String,
    },

    /// Copy a source tree into the snapshot for a pin
    Import {
        /// Module identifier prefix served by the snapshot
        prefix: String,
        /// Kind of pin, e.g. rev
        kind: String,
        /// Pin argument, e.g. a revision
        arg: String,
        /// Directory holding the sources for the prefix
        source: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let settings = Settings::load(&cwd, &cli.global)?;

    match cli.command.unwrap_or(Commands::Build) {
        Commands::Build => build_cmd::build(&settings)?,

        Commands::List { json } => build_cmd::list(&settings, json)?,

        Commands::Cache { command } => match command {
            CacheCommands::Path { prefix, kind, arg } => {
                cache_cmd::path(settings.root(), &CacheKey::new(prefix, kind, arg));
            }
            CacheCommands::Import {
                prefix,
                kind,
                arg,
                source,
            } => {
                let source = if source.is_absolute() {
                    source
                } else {
                    cwd.join(source)
                };
                cache_cmd::import(settings.root(), &CacheKey::new(prefix, kind, arg), &source)?;
            }
        },
    }

    Ok(())
}
