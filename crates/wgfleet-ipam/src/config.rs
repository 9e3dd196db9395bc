//! Allocator configuration.
//!
//! Configuration includes:
//! - Where the IPAM snapshot lives
//! - The pools to seed a fresh state with
//!
//! It also names the requester kinds the console allocates for and the
//! prefix lengths they use.

use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::cidr::Cidr;
use crate::pool::{AddressPool, PoolCategory, PoolError, PoolRegistry};

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The JSON is invalid.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    /// The pools fail validation.
    #[error("invalid pool configuration: {0}")]
    Pool(#[from] PoolError),
}

/// Default directory for the IPAM snapshot.
pub const DEFAULT_STATE_DIR: &str = ".wgfleet";

/// Allocator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IpamConfig {
    /// Directory holding `ipam.json`.
    pub state_dir: PathBuf,
    /// Pools used when no snapshot exists yet.
    pub pools: Vec<AddressPool>,
}

impl Default for IpamConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            pools: default_pools(),
        }
    }
}

impl IpamConfig {
    /// Loads configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parses and validates configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configured pools.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.registry().map(|_| ())
    }

    /// Builds the pool registry from the configured pools.
    pub fn registry(&self) -> Result<PoolRegistry, ConfigError> {
        Ok(PoolRegistry::new(self.pools.clone())?)
    }
}

const fn block(a: u8, b: u8, c: u8, d: u8, prefix_len: u8) -> Cidr {
    Cidr::from_ipnet(Ipv4Net::new_assert(Ipv4Addr::new(a, b, c, d), prefix_len))
}

/// The console's stock pools.
#[must_use]
pub fn default_pools() -> Vec<AddressPool> {
    vec![
        AddressPool::new(
            "pool-routers",
            "Router Tunnel IPs",
            PoolCategory::Router,
            vec![block(10, 240, 0, 0, 12)],
        ),
        AddressPool::new(
            "pool-engineers",
            "Engineer VPN IPs",
            PoolCategory::Engineer,
            vec![block(10, 128, 0, 0, 13)],
        ),
        AddressPool::new(
            "pool-sites",
            "Site Camera NAT Ranges",
            PoolCategory::Site,
            vec![
                block(10, 0, 0, 0, 12),
                block(10, 16, 0, 0, 12),
                block(10, 32, 0, 0, 11),
            ],
        )
        .with_reserved(vec![block(10, 18, 0, 0, 16)]),
        AddressPool::new(
            "pool-infra",
            "Infrastructure Services",
            PoolCategory::Infrastructure,
            vec![block(10, 200, 0, 0, 16)],
        ),
    ]
}

/// Kinds of object the console allocates addresses for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequesterKind {
    /// A router's permanent tunnel address.
    RouterDevice,
    /// An engineer's VPN profile address.
    EngineerProfile,
    /// A site's camera NAT subnet.
    Site,
}

impl RequesterKind {
    /// Requester type string recorded in the ledger.
    #[must_use]
    pub const fn requester_type(&self) -> &'static str {
        match self {
            RequesterKind::RouterDevice => "router_device",
            RequesterKind::EngineerProfile => "engineer_profile",
            RequesterKind::Site => "site",
        }
    }

    /// Pool category the kind draws from.
    #[must_use]
    pub const fn category(&self) -> PoolCategory {
        match self {
            RequesterKind::RouterDevice => PoolCategory::Router,
            RequesterKind::EngineerProfile => PoolCategory::Engineer,
            RequesterKind::Site => PoolCategory::Site,
        }
    }

    /// Prefix length requested for this kind.
    #[must_use]
    pub const fn default_prefix_len(&self) -> u8 {
        match self {
            RequesterKind::RouterDevice | RequesterKind::EngineerProfile => 32,
            RequesterKind::Site => 24,
        }
    }

    /// Looks up a kind by its requester type string.
    #[must_use]
    pub fn from_requester_type(requester_type: &str) -> Option<Self> {
        [
            RequesterKind::RouterDevice,
            RequesterKind::EngineerProfile,
            RequesterKind::Site,
        ]
        .into_iter()
        .find(|k| k.requester_type() == requester_type)
    }
}

impl fmt::Display for RequesterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.requester_type())
    }
}

/// Prefix length used when a caller does not name one.
///
/// Known requester types use their own length; otherwise site pools hand
/// out /24 subnets and every other category single addresses.
#[must_use]
pub fn default_prefix_len(category: PoolCategory, requester_type: &str) -> u8 {
    if let Some(kind) = RequesterKind::from_requester_type(requester_type) {
        return kind.default_prefix_len();
    }
    match category {
        PoolCategory::Site => 24,
        PoolCategory::Router | PoolCategory::Engineer | PoolCategory::Infrastructure => 32,
    }
}
