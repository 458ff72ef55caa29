//! CLI command definitions
//!
//! Uses `clap` derive API for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// wxbuild - build tool for mini-program projects
#[derive(Parser, Debug)]
#[command(name = "wxbuild")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to wxbuild.toml config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Build mode; `development` keeps watching after the build
    #[arg(long, global = true, env = "NODE_ENV", default_value = "production")]
    pub mode: String,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress progress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Working directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compile scripts and stylesheets and copy assets into the output directory
    Build {
        /// Show the build plan without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Build, then watch for changes regardless of --mode
    Watch,

    /// Validate configuration and check sources for output collisions
    Check {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: CheckFormat,
    },

    /// Initialize a new wxbuild.toml
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(ValueEnum, Clone, Debug, Default)]
pub enum CheckFormat {
    #[default]
    Table,
    Json,
}

impl Cli {
    /// Get the effective command; a bare `wxbuild` is `wxbuild build`
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Build { dry_run: false })
    }
}
