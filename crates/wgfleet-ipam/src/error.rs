//! Error types for the IPAM crate.

use thiserror::Error;

use crate::allocator::{AllocationFailure, ReserveError};
use crate::cidr::AddressError;
use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::pool::PoolError;
use crate::store::StoreError;

/// Result type alias for IPAM operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Any error the IPAM crate can report.
#[derive(Debug, Error)]
pub enum Error {
    /// An address or CIDR failed to parse.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Pool configuration is invalid.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A persisted ledger breaks its invariants.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// No block could be allocated.
    #[error(transparent)]
    Allocation(#[from] AllocationFailure),

    /// A manual reservation was refused.
    #[error(transparent)]
    Reserve(#[from] ReserveError),

    /// Reading or writing the snapshot failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
