//! The allocator's public API.
//!
//! [`Ipam`] ties the pool registry, the allocation ledger and the block
//! search together. Callers that create routers, sites and engineer
//! profiles go through [`Ipam::allocate`]; reporting goes through
//! [`Ipam::list_allocations`], [`Ipam::query`] and [`Ipam::stats`].
//!
//! All methods take `&self`. Each pool's search-and-record runs under that
//! pool's lock, so an `Ipam` can be shared between threads.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cidr::{AddrRange, Cidr, MAX_PREFIX_LEN, covered_len};
use crate::config::IpamConfig;
use crate::error::Result;
use crate::ledger::{Allocation, AllocationId, AllocationLedger};
use crate::pool::{AddressPool, PoolCategory, PoolId, PoolRegistry};
use crate::search::find_free_block;
use crate::store::{IpamState, IpamStore};

/// How a caller named the pool it wanted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolSelector {
    /// First pool serving a category.
    Category(PoolCategory),
    /// A specific pool.
    Id(PoolId),
}

impl fmt::Display for PoolSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category(category) => write!(f, "category {category}"),
            Self::Id(id) => write!(f, "id {id}"),
        }
    }
}

/// Reasons an automatic allocation did not produce a block.
///
/// `PoolNotFound` and `PoolExhausted` are ordinary outcomes: the caller
/// decides whether to continue without an address, try another prefix
/// length, or ask the operator for one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationFailure {
    /// No pool matches the selector.
    #[error("no pool configured for {selector}")]
    PoolNotFound {
        /// What the caller asked for.
        selector: PoolSelector,
    },
    /// Every candidate block in the pool is taken or reserved.
    #[error("pool {pool_id} has no free /{prefix_len} block")]
    PoolExhausted {
        /// The full pool.
        pool_id: PoolId,
        /// The requested prefix length.
        prefix_len: u8,
    },
    /// The prefix length is outside 0..=32.
    #[error("invalid prefix length {prefix_len}: must be between 0 and 32")]
    InvalidPrefixLength {
        /// The rejected prefix length.
        prefix_len: u8,
    },
    /// The requester type or id is blank.
    #[error("requester type and id must not be empty")]
    EmptyRequester,
}

/// Reasons a manual reservation was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReserveError {
    /// The pool does not exist.
    #[error("pool {pool_id} not found")]
    PoolNotFound {
        /// The missing pool.
        pool_id: PoolId,
    },
    /// The block is not inside any parent block of the pool.
    #[error("{cidr} is outside every parent block of pool {pool_id}")]
    OutsidePool {
        /// The pool.
        pool_id: PoolId,
        /// The requested block.
        cidr: Cidr,
    },
    /// The block overlaps one of the pool's reserved blocks.
    #[error("{cidr} overlaps reserved block {reserved} of pool {pool_id}")]
    ReservedRange {
        /// The pool.
        pool_id: PoolId,
        /// The requested block.
        cidr: Cidr,
        /// The reserved block it collides with.
        reserved: Cidr,
    },
    /// The block overlaps an existing allocation.
    #[error("{cidr} overlaps {existing} held by {requester_type} {requester_id}")]
    Overlap {
        /// The requested block.
        cidr: Cidr,
        /// The allocation already there.
        allocation_id: AllocationId,
        /// Its block.
        existing: Cidr,
        /// Its requester type.
        requester_type: String,
        /// Its requester id.
        requester_id: String,
    },
    /// The requester already holds a different block in this pool.
    #[error("{requester_type} {requester_id} already holds {existing} in pool {pool_id}")]
    RequesterHasBlock {
        /// The pool.
        pool_id: PoolId,
        /// Requester type.
        requester_type: String,
        /// Requester id.
        requester_id: String,
        /// The block it holds.
        existing: Cidr,
    },
    /// The requester type or id is blank.
    #[error("requester type and id must not be empty")]
    EmptyRequester,
}

/// Filter for [`Ipam::query`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationFilter {
    /// Only pools of this category.
    pub category: Option<PoolCategory>,
    /// Only this pool.
    pub pool_id: Option<PoolId>,
    /// Only this requester type.
    pub requester_type: Option<String>,
    /// Case-insensitive substring of the block, allocation id or requester id.
    pub search: Option<String>,
}

impl AllocationFilter {
    fn matches_pool(&self, pool: &AddressPool) -> bool {
        self.category.is_none_or(|c| c == pool.category)
            && self.pool_id.as_ref().is_none_or(|id| id == &pool.id)
    }

    fn matches(&self, allocation: &Allocation) -> bool {
        if let Some(requester_type) = &self.requester_type {
            if &allocation.requester_type != requester_type {
                return false;
            }
        }
        let Some(search) = self.search.as_deref().map(str::trim) else {
            return true;
        };
        if search.is_empty() {
            return true;
        }
        let needle = search.to_lowercase();
        allocation.cidr.to_string().contains(&needle)
            || allocation.id.as_str().to_lowercase().contains(&needle)
            || allocation.requester_id.to_lowercase().contains(&needle)
    }
}

/// Usage summary for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Pool id.
    pub pool_id: PoolId,
    /// Pool name.
    pub name: String,
    /// Pool category.
    pub category: PoolCategory,
    /// Number of allocations.
    pub allocations: usize,
    /// Addresses across the parent blocks.
    pub total_addresses: u64,
    /// Addresses excluded by reserved blocks.
    pub reserved_addresses: u64,
    /// Addresses covered by allocations.
    pub allocated_addresses: u64,
    /// Addresses still available.
    pub available_addresses: u64,
}

/// The IPAM allocator.
#[derive(Debug)]
pub struct Ipam {
    registry: PoolRegistry,
    ledger: AllocationLedger,
    /// Snapshot revision this state was loaded from or last saved as.
    revision: Mutex<u64>,
}

impl Ipam {
    /// Creates an allocator with an empty ledger.
    #[must_use]
    pub fn new(registry: PoolRegistry) -> Self {
        let ledger = AllocationLedger::new(&registry);
        Self {
            registry,
            ledger,
            revision: Mutex::new(0),
        }
    }

    /// Rebuilds an allocator from a persisted snapshot.
    pub fn from_state(state: IpamState) -> Result<Self> {
        let registry = PoolRegistry::new(state.pools)?;
        let ledger = AllocationLedger::from_allocations(&registry, state.allocations)?;
        Ok(Self {
            registry,
            ledger,
            revision: Mutex::new(state.revision),
        })
    }

    /// Loads the snapshot from `store`, or starts empty with the
    /// configured pools when there is none.
    pub fn load(store: &IpamStore, config: &IpamConfig) -> Result<Self> {
        match store.load()? {
            Some(state) => Self::from_state(state),
            None => {
                info!(pools = config.pools.len(), "Starting with configured pools");
                Ok(Self::new(config.registry()?))
            }
        }
    }

    /// Writes the current state to `store`.
    ///
    /// Fails with [`StoreError::Conflict`](crate::StoreError::Conflict) when
    /// the snapshot was saved by someone else since this state was loaded;
    /// reload and redo the change in that case.
    pub fn persist(&self, store: &IpamStore) -> Result<()> {
        let mut revision = self.revision.lock();
        *revision = store.save(&self.state_at(*revision))?;
        Ok(())
    }

    /// Writes the current state over whatever `store` holds.
    pub fn persist_replacing(&self, store: &IpamStore) -> Result<()> {
        let mut revision = self.revision.lock();
        *revision = store.replace(&self.state_at(*revision))?;
        Ok(())
    }

    /// The pools this allocator searches.
    #[must_use]
    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    /// Allocates a block from the first pool serving `category`.
    ///
    /// Asking again for the same requester returns the block it already
    /// holds, whatever prefix length is passed.
    pub fn allocate(
        &self,
        category: PoolCategory,
        requester_type: &str,
        requester_id: &str,
        prefix_len: u8,
    ) -> std::result::Result<Cidr, AllocationFailure> {
        check_request(requester_type, requester_id, prefix_len)?;
        let Some(pool) = self.registry.find_by_category(category) else {
            warn!(%category, requester_type, requester_id, "No pool configured for category");
            return Err(AllocationFailure::PoolNotFound {
                selector: PoolSelector::Category(category),
            });
        };
        self.allocate_from(pool, requester_type, requester_id, prefix_len)
    }

    /// Allocates a block from a specific pool.
    pub fn allocate_in_pool(
        &self,
        pool_id: &PoolId,
        requester_type: &str,
        requester_id: &str,
        prefix_len: u8,
    ) -> std::result::Result<Cidr, AllocationFailure> {
        check_request(requester_type, requester_id, prefix_len)?;
        let Some(pool) = self.registry.find_by_id(pool_id) else {
            warn!(%pool_id, requester_type, requester_id, "Pool not found");
            return Err(AllocationFailure::PoolNotFound {
                selector: PoolSelector::Id(pool_id.clone()),
            });
        };
        self.allocate_from(pool, requester_type, requester_id, prefix_len)
    }

    fn allocate_from(
        &self,
        pool: &AddressPool,
        requester_type: &str,
        requester_id: &str,
        prefix_len: u8,
    ) -> std::result::Result<Cidr, AllocationFailure> {
        let mut ledger = self
            .ledger
            .lock(&pool.id)
            .ok_or_else(|| AllocationFailure::PoolNotFound {
                selector: PoolSelector::Id(pool.id.clone()),
            })?;

        if let Some(existing) = ledger.find_existing(requester_type, requester_id) {
            debug!(
                pool_id = %pool.id,
                requester_type,
                requester_id,
                cidr = %existing.cidr,
                "Requester already holds a block"
            );
            return Ok(existing.cidr);
        }

        let taken: Vec<AddrRange> = ledger.ranges().collect();
        let Some(cidr) = find_free_block(pool, &taken, prefix_len) else {
            warn!(
                pool_id = %pool.id,
                requester_type,
                requester_id,
                prefix_len,
                "Pool exhausted"
            );
            return Err(AllocationFailure::PoolExhausted {
                pool_id: pool.id.clone(),
                prefix_len,
            });
        };

        let allocation = ledger.record(Allocation::new(
            pool.id.clone(),
            requester_type,
            requester_id,
            cidr,
        ));
        info!(
            pool_id = %pool.id,
            requester_type,
            requester_id,
            cidr = %allocation.cidr,
            allocation_id = %allocation.id,
            "Allocated block"
        );
        Ok(allocation.cidr)
    }

    /// The block a requester holds in the first pool serving `category`.
    #[must_use]
    pub fn lookup(
        &self,
        category: PoolCategory,
        requester_type: &str,
        requester_id: &str,
    ) -> Option<Allocation> {
        let pool = self.registry.find_by_category(category)?;
        self.ledger
            .find_existing(&pool.id, requester_type, requester_id)
    }

    /// Records an operator-chosen block.
    ///
    /// The block is stored normalized. Reserving the block a requester
    /// already holds returns that allocation unchanged.
    pub fn reserve(
        &self,
        pool_id: &PoolId,
        requester_type: &str,
        requester_id: &str,
        cidr: Cidr,
    ) -> std::result::Result<Allocation, ReserveError> {
        if requester_type.trim().is_empty() || requester_id.trim().is_empty() {
            return Err(ReserveError::EmptyRequester);
        }
        let pool = self
            .registry
            .find_by_id(pool_id)
            .ok_or_else(|| ReserveError::PoolNotFound {
                pool_id: pool_id.clone(),
            })?;

        let cidr = cidr.normalized();
        if !pool.contains_block(&cidr) {
            return Err(ReserveError::OutsidePool {
                pool_id: pool.id.clone(),
                cidr,
            });
        }
        let range = cidr.range();
        if let Some(reserved) = pool
            .reserved_blocks
            .iter()
            .find(|r| r.range().overlaps(&range))
        {
            return Err(ReserveError::ReservedRange {
                pool_id: pool.id.clone(),
                cidr,
                reserved: *reserved,
            });
        }

        let mut ledger = self
            .ledger
            .lock(&pool.id)
            .ok_or_else(|| ReserveError::PoolNotFound {
                pool_id: pool.id.clone(),
            })?;

        if let Some(existing) = ledger.find_existing(requester_type, requester_id) {
            if existing.range() == range && existing.cidr.prefix_len() == cidr.prefix_len() {
                debug!(pool_id = %pool.id, requester_type, requester_id, %cidr, "Block already reserved");
                return Ok(existing.clone());
            }
            return Err(ReserveError::RequesterHasBlock {
                pool_id: pool.id.clone(),
                requester_type: requester_type.to_string(),
                requester_id: requester_id.to_string(),
                existing: existing.cidr,
            });
        }
        if let Some(conflict) = ledger.overlapping(&range) {
            return Err(ReserveError::Overlap {
                cidr,
                allocation_id: conflict.id.clone(),
                existing: conflict.cidr,
                requester_type: conflict.requester_type.clone(),
                requester_id: conflict.requester_id.clone(),
            });
        }

        let allocation = ledger
            .record(Allocation::new(
                pool.id.clone(),
                requester_type,
                requester_id,
                cidr,
            ))
            .clone();
        info!(
            pool_id = %pool.id,
            requester_type,
            requester_id,
            %cidr,
            allocation_id = %allocation.id,
            "Reserved block"
        );
        Ok(allocation)
    }

    /// Removes a requester's allocation from one pool.
    pub fn release(
        &self,
        pool_id: &PoolId,
        requester_type: &str,
        requester_id: &str,
    ) -> Option<Allocation> {
        let removed = self
            .ledger
            .lock(pool_id)?
            .remove(requester_type, requester_id)?;
        info!(
            %pool_id,
            requester_type,
            requester_id,
            cidr = %removed.cidr,
            "Released block"
        );
        Some(removed)
    }

    /// Removes a requester's allocations from every pool.
    ///
    /// Called when the owning router, site or profile is deleted.
    pub fn release_requester(&self, requester_type: &str, requester_id: &str) -> Vec<Allocation> {
        self.registry
            .iter()
            .filter_map(|pool| self.release(&pool.id, requester_type, requester_id))
            .collect()
    }

    /// Allocations, optionally limited to one category.
    #[must_use]
    pub fn list_allocations(&self, category: Option<PoolCategory>) -> Vec<Allocation> {
        self.query(&AllocationFilter {
            category,
            ..AllocationFilter::default()
        })
    }

    /// Allocations matching `filter`, ordered by pool then address.
    #[must_use]
    pub fn query(&self, filter: &AllocationFilter) -> Vec<Allocation> {
        let mut result = Vec::new();
        for pool in self.registry.iter().filter(|p| filter.matches_pool(p)) {
            let mut allocations: Vec<Allocation> = self
                .ledger
                .allocations_for_pool(&pool.id)
                .into_iter()
                .filter(|a| filter.matches(a))
                .collect();
            allocations.sort_by_key(|a| (a.range().start, a.cidr.prefix_len()));
            result.extend(allocations);
        }
        result
    }

    /// Usage summary for every pool, in declaration order.
    #[must_use]
    pub fn stats(&self) -> Vec<PoolStats> {
        self.registry
            .iter()
            .map(|pool| {
                let allocations = self.ledger.allocations_for_pool(&pool.id);
                // Blocks reloaded from outside every parent don't use up capacity.
                let allocated_addresses = covered_len(allocations.iter().flat_map(|a| {
                    let range = a.range();
                    pool.parent_blocks
                        .iter()
                        .filter_map(move |parent| parent.range().intersection(&range))
                }));
                PoolStats {
                    pool_id: pool.id.clone(),
                    name: pool.name.clone(),
                    category: pool.category,
                    allocations: allocations.len(),
                    total_addresses: pool.total_addresses(),
                    reserved_addresses: pool.reserved_addresses(),
                    allocated_addresses,
                    available_addresses: pool.capacity().saturating_sub(allocated_addresses),
                }
            })
            .collect()
    }

    /// The full state, ready to persist.
    #[must_use]
    pub fn snapshot(&self) -> IpamState {
        let revision = *self.revision.lock();
        self.state_at(revision)
    }

    fn state_at(&self, revision: u64) -> IpamState {
        let allocations = self
            .registry
            .iter()
            .flat_map(|pool| self.ledger.allocations_for_pool(&pool.id))
            .collect();
        IpamState {
            revision,
            pools: self.registry.iter().cloned().collect(),
            allocations,
        }
    }
}

fn check_request(
    requester_type: &str,
    requester_id: &str,
    prefix_len: u8,
) -> std::result::Result<(), AllocationFailure> {
    if prefix_len > MAX_PREFIX_LEN {
        return Err(AllocationFailure::InvalidPrefixLength { prefix_len });
    }
    if requester_type.trim().is_empty() || requester_id.trim().is_empty() {
        return Err(AllocationFailure::EmptyRequester);
    }
    Ok(())
}
