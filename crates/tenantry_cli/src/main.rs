//! Tenantry CLI
//!
//! Command-line tools for inspecting the offline store of a tenantry client.
//!
//! # Commands
//!
//! - `pending` - List queued changes in replay order
//! - `collections` - Show record counts per collection
//! - `clear` - Discard every queued change (requires `--yes`)

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tenantry offline store tools.
#[derive(Parser)]
#[command(name = "tenantry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the offline store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List queued changes in the order the next sync sends them
    Pending {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show record counts per collection
    Collections {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Discard every queued change without delivering it
    Clear {
        /// Confirm that undelivered changes will be lost
        #[arg(long)]
        yes: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Pending { format } => {
            let path = cli.path.ok_or("Store path required for pending")?;
            commands::pending::run(&path, &format)?;
        }
        Commands::Collections { format } => {
            let path = cli.path.ok_or("Store path required for collections")?;
            commands::collections::run(&path, &format)?;
        }
        Commands::Clear { yes } => {
            let path = cli.path.ok_or("Store path required for clear")?;
            commands::clear::run(&path, yes)?;
        }
        Commands::Version => {
            println!("Tenantry CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
