//! # wgfleet-cli
//!
//! Operator command line for the wgfleet IPAM allocator.
//!
//! Provides commands for:
//! - Listing pools and their usage
//! - Allocating blocks for routers, sites and engineer profiles
//! - Reserving and releasing blocks by hand
//!
//! Every mutating command locks the state directory, loads the JSON
//! snapshot, works on it, and writes it back when something changed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod context;
pub mod error;
pub mod output;

pub use cli::{AllocateArgs, Cli, Commands, Format, ListArgs, ReserveArgs};
pub use context::StateContext;
pub use error::CliError;
pub use output::OutputFormat;
