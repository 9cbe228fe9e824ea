use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "idsync")]
#[command(author, version, about = "Declarative reconciliation for identity-service tenants")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (default: ~/.config/idsync/config.toml)
    #[arg(long, global = true, env = "IDSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    // ========================================================================
    // Reconciliation
    // ========================================================================
    /// Check a declaration without contacting the tenant
    Validate {
        /// Declaration file
        #[arg(default_value = "idsync.toml")]
        file: PathBuf,
    },

    /// Show what apply would change
    Plan {
        /// Declaration file
        #[arg(default_value = "idsync.toml")]
        file: PathBuf,

        /// Limit to a kind or resource (e.g. 'role', 'role.reader')
        #[arg(short, long)]
        target: Option<String>,

        /// Plan against recorded state without re-reading the tenant
        #[arg(long)]
        no_refresh: bool,
    },

    /// Converge the tenant to the declaration
    Apply {
        /// Declaration file
        #[arg(default_value = "idsync.toml")]
        file: PathBuf,

        /// Limit to a kind or resource (e.g. 'role', 'role.reader')
        #[arg(short, long)]
        target: Option<String>,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,

        /// Parallel jobs per stage (overrides settings)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Cancel after this many seconds (overrides settings)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Delete managed resources and forget them
    Destroy {
        /// Limit to a kind or resource (e.g. 'role', 'role.reader')
        #[arg(short, long)]
        target: Option<String>,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Re-read managed resources and record drift
    Refresh {
        /// Limit to a kind or resource (e.g. 'role', 'role.reader')
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Bring an existing remote entity under management
    Import {
        /// Address to track it under (e.g. 'role.reader')
        address: String,

        /// Remote id of the entity
        #[arg(long, conflicts_with = "filter")]
        id: Option<String>,

        /// Find the entity by field instead (key=value, repeatable)
        #[arg(long, value_name = "KEY=VALUE")]
        filter: Vec<String>,
    },

    // ========================================================================
    // State
    // ========================================================================
    /// Inspect or edit reconciliation records
    #[command(subcommand)]
    State(StateCommand),

    // ========================================================================
    // Utilities
    // ========================================================================
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum StateCommand {
    /// List recorded resources
    List,

    /// Show one record in full
    Show {
        /// Resource address (e.g. 'role.reader')
        address: String,
    },

    /// Forget a resource without touching the tenant
    Rm {
        /// Resource address (e.g. 'role.reader')
        address: String,
    },
}
