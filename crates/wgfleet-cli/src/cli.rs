//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use wgfleet_ipam::{Cidr, PoolCategory};

/// wgfleet - IP address management for a WireGuard router fleet.
#[derive(Parser, Debug, Clone)]
#[command(name = "wgfleet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the IPAM snapshot (overrides the config file).
    #[arg(short, long, env = "WGFLEET_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(short, long, env = "WGFLEET_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table, global = true)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Write a fresh snapshot with the configured pools.
    Init {
        /// Overwrite an existing snapshot, dropping its allocations.
        #[arg(long)]
        force: bool,
    },

    /// Show the address pools.
    Pools,

    /// Allocate a block for a requester.
    ///
    /// Asking again for the same requester returns the block it already
    /// holds.
    Allocate(AllocateArgs),

    /// Show the block a requester holds.
    Lookup {
        /// Pool category.
        category: PoolCategory,
        /// Requester type, e.g. `router_device`.
        requester_type: String,
        /// Requester id.
        requester_id: String,
    },

    /// Record an operator-chosen block.
    Reserve(ReserveArgs),

    /// Free the block a requester holds in one pool.
    Release {
        /// Pool id.
        pool_id: String,
        /// Requester type.
        requester_type: String,
        /// Requester id.
        requester_id: String,
    },

    /// Free every block a requester holds, in all pools.
    ReleaseRequester {
        /// Requester type.
        requester_type: String,
        /// Requester id.
        requester_id: String,
    },

    /// List allocations.
    List(ListArgs),

    /// Show pool usage.
    Stats,
}

/// Arguments for the allocate command.
#[derive(Args, Debug, Clone)]
pub struct AllocateArgs {
    /// Pool category: router, engineer, site or infrastructure.
    pub category: PoolCategory,

    /// Requester type, e.g. `router_device`, `engineer_profile`, `site`.
    pub requester_type: String,

    /// Requester id.
    pub requester_id: String,

    /// Prefix length. Defaults to /24 for sites and /32 otherwise.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=32))]
    pub prefix: Option<u8>,

    /// Allocate from this pool (of the same category) instead of the category's first pool.
    #[arg(long)]
    pub pool: Option<String>,
}

/// Arguments for the reserve command.
#[derive(Args, Debug, Clone)]
pub struct ReserveArgs {
    /// Pool id.
    pub pool_id: String,

    /// Block to reserve, e.g. `10.16.50.0/24`.
    pub cidr: Cidr,

    /// Requester type.
    #[arg(long, default_value = "reserved")]
    pub requester_type: String,

    /// Requester id. Defaults to the block itself.
    #[arg(long)]
    pub requester_id: Option<String>,
}

/// Arguments for the list command.
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only pools of this category.
    #[arg(long)]
    pub category: Option<PoolCategory>,

    /// Only this pool.
    #[arg(long)]
    pub pool: Option<String>,

    /// Only this requester type.
    #[arg(long)]
    pub requester_type: Option<String>,

    /// Substring of the block, allocation id or requester id.
    #[arg(short = 'q', long)]
    pub search: Option<String>,
}
