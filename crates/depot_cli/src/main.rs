//! depot CLI
//!
//! Command-line tools for inspecting a depot server's data directory.
//!
//! # Commands
//!
//! - `log` - List the commit history of a project
//! - `diff` - Show the net change of a range of commits
//! - `verify` - Check ledger integrity and tree consistency
//! - `projects` - List projects configured in a settings file
//!
//! The ledger is opened with an exclusive lock, so these commands are meant
//! for a stopped server.

mod commands;
mod error;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// depot server administration tools.
#[derive(Parser)]
#[command(name = "depot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the server data directory
    #[arg(global = true, short, long, default_value = "data")]
    data: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for listing commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable lines
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List the commits of a project
    Log {
        /// Project name
        #[arg(short, long)]
        project: String,

        /// Only list commits after this id
        #[arg(short, long, default_value = "0")]
        since: u32,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Show what a client at a given commit would receive
    Diff {
        /// Project name
        #[arg(short, long)]
        project: String,

        /// Client's last known commit id
        #[arg(short, long, default_value = "0")]
        since: u32,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Verify commit ids, file versions and project trees
    Verify {
        /// Only check this project (default: every project in the ledger)
        #[arg(short, long)]
        project: Option<String>,
    },

    /// List configured projects
    Projects {
        /// Settings file to read
        #[arg(short, long, default_value = "serversettings.json")]
        config: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Log {
            project,
            since,
            format,
        } => {
            commands::log::run(&cli.data, &project, since, format)?;
        }
        Commands::Diff {
            project,
            since,
            format,
        } => {
            commands::diff::run(&cli.data, &project, since, format)?;
        }
        Commands::Verify { project } => {
            commands::verify::run(&cli.data, project.as_deref())?;
        }
        Commands::Projects { config } => {
            commands::projects::run(&config)?;
        }
        Commands::Version => {
            println!("depot CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
