//! CLI error types.

use std::fmt;
use std::path::PathBuf;

use wgfleet_ipam::{AllocationFailure, ConfigError, PoolSelector, ReserveError, StoreError};

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// No pool serves the requested category or id.
    NoPool(PoolSelector),
    /// The pool has no free block of the requested size.
    PoolFull {
        /// The full pool.
        pool_id: String,
        /// Requested prefix length.
        prefix_len: u8,
    },
    /// The requester holds no block.
    NotAllocated(String),
    /// A manual reservation was refused.
    Reserve(ReserveError),
    /// A snapshot already exists.
    AlreadyInitialized(PathBuf),
    /// Invalid configuration.
    Config(String),
    /// The IPAM state could not be loaded or saved.
    State(wgfleet_ipam::Error),
    /// Invalid argument.
    InvalidArgument(String),
    /// Output formatting error.
    Format(String),
    /// IO error.
    Io(std::io::Error),
}

impl CliError {
    /// Follow-up advice shown under the error, if any.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NoPool(_) | Self::PoolFull { .. } => {
                Some("enter an address manually with `wgfleet reserve <pool-id> <cidr>`")
            }
            Self::AlreadyInitialized(_) => Some("pass --force to start over"),
            Self::State(wgfleet_ipam::Error::Store(StoreError::Conflict { .. })) => {
                Some("another wgfleet command changed the state meanwhile; run this one again")
            }
            _ => None,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPool(selector) => write!(f, "no pool configured for {selector}"),
            Self::PoolFull {
                pool_id,
                prefix_len,
            } => write!(f, "pool {pool_id} is full: no free /{prefix_len} block"),
            Self::NotAllocated(what) => write!(f, "no allocation for {what}"),
            Self::Reserve(e) => write!(f, "cannot reserve: {e}"),
            Self::AlreadyInitialized(path) => {
                write!(f, "IPAM state already exists at {}", path.display())
            }
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::State(e) => write!(f, "state error: {e}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Reserve(e) => Some(e),
            Self::State(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AllocationFailure> for CliError {
    fn from(err: AllocationFailure) -> Self {
        match err {
            AllocationFailure::PoolNotFound { selector } => Self::NoPool(selector),
            AllocationFailure::PoolExhausted {
                pool_id,
                prefix_len,
            } => Self::PoolFull {
                pool_id: pool_id.to_string(),
                prefix_len,
            },
            other @ (AllocationFailure::InvalidPrefixLength { .. }
            | AllocationFailure::EmptyRequester) => Self::InvalidArgument(other.to_string()),
        }
    }
}

impl From<ReserveError> for CliError {
    fn from(err: ReserveError) -> Self {
        match err {
            ReserveError::EmptyRequester => Self::InvalidArgument(err.to_string()),
            other => Self::Reserve(other),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<wgfleet_ipam::Error> for CliError {
    fn from(err: wgfleet_ipam::Error) -> Self {
        match err {
            wgfleet_ipam::Error::Config(e) => e.into(),
            other => Self::State(other),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
