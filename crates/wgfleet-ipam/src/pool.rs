//! Address pools and the registry the allocator searches.
//!
//! Pools come from configuration. The allocator only reads them; an
//! administrative edit replaces the whole registry.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cidr::{Cidr, covered_len};

/// Errors raised while validating pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// A pool has an empty identifier.
    #[error("pool identifier cannot be empty")]
    EmptyId,
    /// Two pools share an identifier.
    #[error("duplicate pool id {pool_id}")]
    DuplicatePoolId {
        /// The repeated identifier.
        pool_id: PoolId,
    },
    /// A pool declares no parent blocks.
    #[error("pool {pool_id} has no parent blocks")]
    NoParentBlocks {
        /// The offending pool.
        pool_id: PoolId,
    },
    /// A reserved block lies outside every parent block of its pool.
    #[error("reserved block {reserved} of pool {pool_id} is not inside any parent block")]
    InvalidReservedConfiguration {
        /// The offending pool.
        pool_id: PoolId,
        /// The reserved block.
        reserved: Cidr,
    },
    /// An unknown category name.
    #[error("unknown pool category '{0}'")]
    UnknownCategory(String),
}

/// Requester category a pool serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolCategory {
    /// Router tunnel addresses.
    Router,
    /// Engineer VPN profile addresses.
    Engineer,
    /// Site NAT subnets.
    Site,
    /// Infrastructure services.
    #[serde(alias = "infra")]
    Infrastructure,
}

impl PoolCategory {
    /// All categories in declaration order.
    #[must_use]
    pub const fn all() -> &'static [PoolCategory] {
        &[
            PoolCategory::Router,
            PoolCategory::Engineer,
            PoolCategory::Site,
            PoolCategory::Infrastructure,
        ]
    }

    /// The lowercase name used in configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            PoolCategory::Router => "router",
            PoolCategory::Engineer => "engineer",
            PoolCategory::Site => "site",
            PoolCategory::Infrastructure => "infrastructure",
        }
    }
}

impl fmt::Display for PoolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolCategory {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "router" => Ok(PoolCategory::Router),
            "engineer" => Ok(PoolCategory::Engineer),
            "site" => Ok(PoolCategory::Site),
            "infrastructure" | "infra" => Ok(PoolCategory::Infrastructure),
            _ => Err(PoolError::UnknownCategory(s.to_string())),
        }
    }
}

/// Stable pool identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(String);

impl PoolId {
    /// Creates a pool identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PoolId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A named address space for one requester category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressPool {
    /// Unique identifier.
    pub id: PoolId,
    /// Human label.
    pub name: String,
    /// Category served by this pool.
    pub category: PoolCategory,
    /// Parent blocks, searched in order.
    pub parent_blocks: Vec<Cidr>,
    /// Blocks never handed out.
    #[serde(default)]
    pub reserved_blocks: Vec<Cidr>,
}

impl AddressPool {
    /// Creates a pool with no reserved blocks.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: PoolCategory,
        parent_blocks: Vec<Cidr>,
    ) -> Self {
        Self {
            id: PoolId::new(id),
            name: name.into(),
            category,
            parent_blocks,
            reserved_blocks: Vec::new(),
        }
    }

    /// Adds reserved blocks.
    #[must_use]
    pub fn with_reserved(mut self, reserved: Vec<Cidr>) -> Self {
        self.reserved_blocks = reserved;
        self
    }

    /// Checks the pool's structural invariants.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.id.as_str().trim().is_empty() {
            return Err(PoolError::EmptyId);
        }
        if self.parent_blocks.is_empty() {
            return Err(PoolError::NoParentBlocks {
                pool_id: self.id.clone(),
            });
        }

        for reserved in &self.reserved_blocks {
            let range = reserved.range();
            if !self.parent_blocks.iter().any(|p| p.range().contains(&range)) {
                return Err(PoolError::InvalidReservedConfiguration {
                    pool_id: self.id.clone(),
                    reserved: *reserved,
                });
            }
        }

        Ok(())
    }

    /// Returns true if `cidr` lies entirely inside one parent block.
    #[must_use]
    pub fn contains_block(&self, cidr: &Cidr) -> bool {
        let range = cidr.range();
        self.parent_blocks.iter().any(|p| p.range().contains(&range))
    }

    /// Distinct addresses across all parent blocks.
    #[must_use]
    pub fn total_addresses(&self) -> u64 {
        covered_len(self.parent_blocks.iter().map(Cidr::range))
    }

    /// Distinct addresses excluded by reserved blocks.
    #[must_use]
    pub fn reserved_addresses(&self) -> u64 {
        covered_len(self.reserved_blocks.iter().map(Cidr::range))
    }

    /// Addresses the allocator may hand out.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.total_addresses()
            .saturating_sub(self.reserved_addresses())
    }
}

/// Read-only set of pools in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolRegistry {
    pools: Vec<AddressPool>,
}

impl PoolRegistry {
    /// Validates the pools and builds the registry.
    ///
    /// A malformed pool is refused here rather than discovered during a
    /// search.
    pub fn new(pools: Vec<AddressPool>) -> Result<Self, PoolError> {
        let mut seen = HashSet::new();
        for pool in &pools {
            pool.validate()?;
            if !seen.insert(pool.id.clone()) {
                return Err(PoolError::DuplicatePoolId {
                    pool_id: pool.id.clone(),
                });
            }
        }
        Ok(Self { pools })
    }

    /// First pool serving `category`, in declaration order.
    #[must_use]
    pub fn find_by_category(&self, category: PoolCategory) -> Option<&AddressPool> {
        self.pools.iter().find(|p| p.category == category)
    }

    /// Pool with the given id.
    #[must_use]
    pub fn find_by_id(&self, id: &PoolId) -> Option<&AddressPool> {
        self.pools.iter().find(|p| &p.id == id)
    }

    /// Iterates pools in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &AddressPool> {
        self.pools.iter()
    }

    /// Number of pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Returns true if no pools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn cidr(s: &str) -> Cidr {
        s.parse().expect("valid CIDR")
    }

    fn site_pool() -> AddressPool {
        AddressPool::new(
            "pool-sites",
            "Site Camera NAT Ranges",
            PoolCategory::Site,
            vec![cidr("10.0.0.0/12"), cidr("10.16.0.0/12")],
        )
        .with_reserved(vec![cidr("10.18.0.0/16")])
    }

    #[test]
    fn test_valid_pool_passes() {
        assert!(site_pool().validate().is_ok());
    }

    #[test]
    fn test_reserved_outside_parent_rejected() {
        let pool = site_pool().with_reserved(vec![cidr("10.110.0.0/20")]);
        assert!(matches!(
            pool.validate(),
            Err(PoolError::InvalidReservedConfiguration { .. })
        ));
    }

    #[test]
    fn test_reserved_straddling_parents_rejected() {
        // Covers the tail of one parent and the head of the next.
        let pool = AddressPool::new(
            "p",
            "p",
            PoolCategory::Router,
            vec![cidr("10.0.0.0/25"), cidr("10.0.0.128/25")],
        )
        .with_reserved(vec![cidr("10.0.0.0/24")]);
        assert!(pool.validate().is_err());
    }

    #[test]
    fn test_pool_without_parents_rejected() {
        let pool = AddressPool::new("p", "p", PoolCategory::Router, Vec::new());
        assert!(matches!(
            pool.validate(),
            Err(PoolError::NoParentBlocks { .. })
        ));
    }

    #[test]
    fn test_registry_rejects_duplicate_ids() {
        let result = PoolRegistry::new(vec![site_pool(), site_pool()]);
        assert!(matches!(result, Err(PoolError::DuplicatePoolId { .. })));
    }

    #[test]
    fn test_find_by_category_first_match_wins() {
        let first = AddressPool::new("a", "A", PoolCategory::Router, vec![cidr("10.0.0.0/24")]);
        let second = AddressPool::new("b", "B", PoolCategory::Router, vec![cidr("10.1.0.0/24")]);
        let registry = PoolRegistry::new(vec![site_pool(), first, second]).expect("valid");

        let found = registry
            .find_by_category(PoolCategory::Router)
            .expect("router pool");
        assert_eq!(found.id.as_str(), "a");
        assert!(registry.find_by_category(PoolCategory::Engineer).is_none());
    }

    #[test]
    fn test_find_by_id() {
        let registry = PoolRegistry::new(vec![site_pool()]).expect("valid");
        assert!(registry.find_by_id(&PoolId::from("pool-sites")).is_some());
        assert!(registry.find_by_id(&PoolId::from("missing")).is_none());
    }

    #[test]
    fn test_capacity_excludes_reserved() {
        let pool = AddressPool::new("p", "p", PoolCategory::Site, vec![cidr("10.0.0.0/24")])
            .with_reserved(vec![cidr("10.0.0.0/28"), cidr("10.0.0.8/29")]);
        assert_eq!(pool.total_addresses(), 256);
        assert_eq!(pool.reserved_addresses(), 16);
        assert_eq!(pool.capacity(), 240);
    }

    #[test_case("router", PoolCategory::Router)]
    #[test_case("Engineer", PoolCategory::Engineer)]
    #[test_case("site", PoolCategory::Site)]
    #[test_case("infra", PoolCategory::Infrastructure)]
    #[test_case("infrastructure", PoolCategory::Infrastructure)]
    fn test_category_from_str(input: &str, expected: PoolCategory) {
        assert_eq!(input.parse::<PoolCategory>(), Ok(expected));
    }

    #[test]
    fn test_category_from_str_unknown() {
        assert!("camera".parse::<PoolCategory>().is_err());
    }

    #[test]
    fn test_pool_serializes_flat_record() {
        let json = serde_json::to_value(site_pool()).expect("serialize");
        assert_eq!(json["id"], "pool-sites");
        assert_eq!(json["category"], "site");
        assert_eq!(json["parentBlocks"][1], "10.16.0.0/12");
        assert_eq!(json["reservedBlocks"][0], "10.18.0.0/16");

        let back: AddressPool = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, site_pool());
    }
}
