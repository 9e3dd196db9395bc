//! IP address management for the wgfleet WireGuard console.
//!
//! Carves permanent, non-overlapping CIDR blocks out of configured address
//! pools for routers, engineer VPN profiles and site NAT subnets, keeping
//! clear of reserved ranges and of every block handed out before.
//!
//! # Example
//!
//! ```
//! use wgfleet_ipam::{Ipam, IpamConfig, PoolCategory};
//!
//! let ipam = Ipam::new(IpamConfig::default().registry()?);
//! let subnet = ipam.allocate(PoolCategory::Site, "site", "site-001", 24)?;
//! assert_eq!(subnet.to_string(), "10.0.0.0/24");
//!
//! // Asking again returns the same block.
//! assert_eq!(ipam.allocate(PoolCategory::Site, "site", "site-001", 24)?, subnet);
//! # Ok::<(), wgfleet_ipam::Error>(())
//! ```

#![forbid(unsafe_code)]

pub mod allocator;
pub mod cidr;
pub mod config;
pub mod error;
pub mod ledger;
pub mod pool;
pub mod search;
pub mod store;

pub use allocator::{
    AllocationFailure, AllocationFilter, Ipam, PoolSelector, PoolStats, ReserveError,
};
pub use cidr::{AddrRange, AddressError, Cidr, address_to_int, cidr_to_range, int_to_address};
pub use config::{ConfigError, IpamConfig, RequesterKind, default_pools, default_prefix_len};
pub use error::{Error, Result};
pub use ledger::{Allocation, AllocationId, AllocationLedger, LedgerError, PoolLedger};
pub use pool::{AddressPool, PoolCategory, PoolError, PoolId, PoolRegistry};
pub use search::find_free_block;
pub use store::{IpamState, IpamStore, StoreError, StoreLock};
