//! The allocation ledger: every block ever handed out, per pool.
//!
//! Each pool's allocations sit behind their own mutex. The map of mutexes
//! is fixed when the ledger is built from the registry, so holding one
//! pool's lock makes search-and-record atomic for that pool while other
//! pools proceed independently.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::cidr::{AddrRange, Cidr};
use crate::pool::{PoolId, PoolRegistry};

/// Errors raised while rebuilding a ledger from persisted allocations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// An allocation refers to a pool that is not registered.
    #[error("allocation {allocation_id} refers to unknown pool {pool_id}")]
    UnknownPool {
        /// The allocation.
        allocation_id: AllocationId,
        /// The missing pool.
        pool_id: PoolId,
    },
    /// Two allocations share an id.
    #[error("duplicate allocation id {allocation_id}")]
    DuplicateId {
        /// The repeated id.
        allocation_id: AllocationId,
    },
    /// Two allocations serve the same requester in one pool.
    #[error("pool {pool_id} holds more than one allocation for {requester_type} {requester_id}")]
    DuplicateRequester {
        /// The pool.
        pool_id: PoolId,
        /// Requester type.
        requester_type: String,
        /// Requester id.
        requester_id: String,
    },
    /// An allocation overlaps another allocation or a reserved block.
    #[error("allocation {allocation_id} ({cidr}) overlaps {conflict} in pool {pool_id}")]
    Overlap {
        /// The pool.
        pool_id: PoolId,
        /// The allocation.
        allocation_id: AllocationId,
        /// Its block.
        cidr: Cidr,
        /// The block it collides with.
        conflict: Cidr,
    },
}

/// Unique allocation identifier, `ipa-<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(String);

impl AllocationId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("ipa-{}", Uuid::new_v4()))
    }

    /// Wraps an existing identifier.
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

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A permanent assignment of one block to one requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    /// Unique identifier.
    pub id: AllocationId,
    /// Owning pool.
    pub pool_id: PoolId,
    /// Descriptive requester category, e.g. `router_device`.
    pub requester_type: String,
    /// Identity of the requester.
    pub requester_id: String,
    /// The allocated block.
    pub cidr: Cidr,
    /// When the block was first allocated.
    pub allocated_at: DateTime<Utc>,
}

impl Allocation {
    /// Creates an allocation with a fresh id, stamped now.
    #[must_use]
    pub fn new(
        pool_id: PoolId,
        requester_type: impl Into<String>,
        requester_id: impl Into<String>,
        cidr: Cidr,
    ) -> Self {
        Self {
            id: AllocationId::generate(),
            pool_id,
            requester_type: requester_type.into(),
            requester_id: requester_id.into(),
            cidr,
            allocated_at: Utc::now(),
        }
    }

    /// The block's integer range.
    #[must_use]
    pub fn range(&self) -> AddrRange {
        self.cidr.range()
    }
}

type RequesterKey = (String, String);

fn requester_key(requester_type: &str, requester_id: &str) -> RequesterKey {
    (requester_type.to_string(), requester_id.to_string())
}

/// Allocations of a single pool, indexed by requester.
#[derive(Debug, Default)]
pub struct PoolLedger {
    allocations: Vec<Allocation>,
    index: HashMap<RequesterKey, usize>,
}

impl PoolLedger {
    /// The allocation held by a requester, if any.
    #[must_use]
    pub fn find_existing(&self, requester_type: &str, requester_id: &str) -> Option<&Allocation> {
        self.index
            .get(&requester_key(requester_type, requester_id))
            .and_then(|&i| self.allocations.get(i))
    }

    /// Appends an allocation.
    ///
    /// Does not check for overlap; the caller searched for a free block
    /// under the same lock.
    pub fn record(&mut self, allocation: Allocation) -> &Allocation {
        let key = requester_key(&allocation.requester_type, &allocation.requester_id);
        let position = self.allocations.len();
        self.allocations.push(allocation);
        self.index.insert(key, position);
        &self.allocations[position]
    }

    /// Removes a requester's allocation.
    pub fn remove(&mut self, requester_type: &str, requester_id: &str) -> Option<Allocation> {
        let position = self
            .index
            .remove(&requester_key(requester_type, requester_id))?;
        let removed = self.allocations.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    /// Allocations in the order they were recorded.
    #[must_use]
    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    /// Ranges already taken in this pool.
    pub fn ranges(&self) -> impl Iterator<Item = AddrRange> + '_ {
        self.allocations.iter().map(Allocation::range)
    }

    /// First allocation whose block overlaps `range`.
    #[must_use]
    pub fn overlapping(&self, range: &AddrRange) -> Option<&Allocation> {
        self.allocations.iter().find(|a| a.range().overlaps(range))
    }

    /// Number of allocations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    /// Returns true if nothing has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

/// Every allocation, grouped by pool.
#[derive(Debug, Default)]
pub struct AllocationLedger {
    pools: HashMap<PoolId, Mutex<PoolLedger>>,
}

impl AllocationLedger {
    /// Creates an empty ledger with one slot per registered pool.
    #[must_use]
    pub fn new(registry: &PoolRegistry) -> Self {
        let pools = registry
            .iter()
            .map(|pool| (pool.id.clone(), Mutex::new(PoolLedger::default())))
            .collect();
        Self { pools }
    }

    /// Rebuilds a ledger from persisted allocations.
    ///
    /// Refuses input that breaks the ledger's invariants: unknown pools,
    /// repeated ids, two blocks for one requester, or blocks overlapping
    /// each other or a reserved range.
    pub fn from_allocations(
        registry: &PoolRegistry,
        allocations: Vec<Allocation>,
    ) -> Result<Self, LedgerError> {
        let mut grouped: HashMap<PoolId, PoolLedger> = registry
            .iter()
            .map(|pool| (pool.id.clone(), PoolLedger::default()))
            .collect();
        let mut ids = HashSet::new();

        for allocation in allocations {
            let Some(pool) = registry.find_by_id(&allocation.pool_id) else {
                return Err(LedgerError::UnknownPool {
                    allocation_id: allocation.id,
                    pool_id: allocation.pool_id,
                });
            };
            if !ids.insert(allocation.id.clone()) {
                return Err(LedgerError::DuplicateId {
                    allocation_id: allocation.id,
                });
            }

            let range = allocation.range();
            if let Some(reserved) = pool
                .reserved_blocks
                .iter()
                .find(|r| r.range().overlaps(&range))
            {
                return Err(LedgerError::Overlap {
                    pool_id: pool.id.clone(),
                    allocation_id: allocation.id,
                    cidr: allocation.cidr,
                    conflict: *reserved,
                });
            }
            if !pool.contains_block(&allocation.cidr) {
                warn!(
                    pool_id = %pool.id,
                    allocation_id = %allocation.id,
                    cidr = %allocation.cidr,
                    "Allocation lies outside the pool's parent blocks"
                );
            }

            let ledger = grouped.entry(pool.id.clone()).or_default();
            if ledger
                .find_existing(&allocation.requester_type, &allocation.requester_id)
                .is_some()
            {
                return Err(LedgerError::DuplicateRequester {
                    pool_id: pool.id.clone(),
                    requester_type: allocation.requester_type,
                    requester_id: allocation.requester_id,
                });
            }
            ledger.record(allocation);
        }

        for (pool_id, ledger) in &grouped {
            check_disjoint(pool_id, ledger)?;
        }

        Ok(Self {
            pools: grouped
                .into_iter()
                .map(|(id, ledger)| (id, Mutex::new(ledger)))
                .collect(),
        })
    }

    /// Locks one pool's allocations.
    #[must_use]
    pub fn lock(&self, pool_id: &PoolId) -> Option<MutexGuard<'_, PoolLedger>> {
        self.pools.get(pool_id).map(|ledger| ledger.lock())
    }

    /// The allocation held by a requester in a pool, if any.
    #[must_use]
    pub fn find_existing(
        &self,
        pool_id: &PoolId,
        requester_type: &str,
        requester_id: &str,
    ) -> Option<Allocation> {
        self.lock(pool_id)?
            .find_existing(requester_type, requester_id)
            .cloned()
    }

    /// Appends a new allocation stamped now. Returns `None` for an
    /// unregistered pool.
    pub fn record_allocation(
        &self,
        pool_id: &PoolId,
        requester_type: &str,
        requester_id: &str,
        cidr: Cidr,
    ) -> Option<Allocation> {
        let mut ledger = self.lock(pool_id)?;
        let allocation = Allocation::new(pool_id.clone(), requester_type, requester_id, cidr);
        Some(ledger.record(allocation).clone())
    }

    /// Snapshot of one pool's allocations.
    #[must_use]
    pub fn allocations_for_pool(&self, pool_id: &PoolId) -> Vec<Allocation> {
        self.lock(pool_id)
            .map(|ledger| ledger.allocations().to_vec())
            .unwrap_or_default()
    }

    /// Total number of allocations across pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.values().map(|l| l.lock().len()).sum()
    }

    /// Returns true if no pool holds an allocation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.values().all(|l| l.lock().is_empty())
    }
}

fn check_disjoint(pool_id: &PoolId, ledger: &PoolLedger) -> Result<(), LedgerError> {
    let mut sorted: Vec<&Allocation> = ledger.allocations().iter().collect();
    sorted.sort_by_key(|a| a.range());

    let mut previous: Option<&Allocation> = None;
    for allocation in sorted {
        if let Some(prev) = previous {
            if allocation.range().start <= prev.range().end {
                return Err(LedgerError::Overlap {
                    pool_id: pool_id.clone(),
                    allocation_id: allocation.id.clone(),
                    cidr: allocation.cidr,
                    conflict: prev.cidr,
                });
            }
        }
        previous = Some(allocation);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{AddressPool, PoolCategory};

    fn cidr(s: &str) -> Cidr {
        s.parse().expect("valid CIDR")
    }

    fn registry() -> PoolRegistry {
        PoolRegistry::new(vec![
            AddressPool::new("routers", "Routers", PoolCategory::Router, vec![cidr("10.240.0.0/12")]),
            AddressPool::new("sites", "Sites", PoolCategory::Site, vec![cidr("10.0.0.0/12")])
                .with_reserved(vec![cidr("10.0.0.0/16")]),
        ])
        .expect("valid registry")
    }

    #[test]
    fn test_record_and_find_existing() {
        let ledger = AllocationLedger::new(&registry());
        let pool = PoolId::from("routers");

        let recorded = ledger
            .record_allocation(&pool, "router_device", "r1", cidr("10.240.0.0/32"))
            .expect("registered pool");
        assert!(recorded.id.as_str().starts_with("ipa-"));

        let found = ledger
            .find_existing(&pool, "router_device", "r1")
            .expect("should find");
        assert_eq!(found, recorded);
        assert!(ledger.find_existing(&pool, "site", "r1").is_none());
        assert!(ledger
            .find_existing(&PoolId::from("sites"), "router_device", "r1")
            .is_none());
    }

    #[test]
    fn test_record_unknown_pool() {
        let ledger = AllocationLedger::new(&registry());
        assert!(ledger
            .record_allocation(&PoolId::from("nope"), "t", "i", cidr("10.0.0.0/32"))
            .is_none());
    }

    #[test]
    fn test_allocations_for_pool_in_record_order() {
        let ledger = AllocationLedger::new(&registry());
        let pool = PoolId::from("routers");
        ledger.record_allocation(&pool, "router_device", "r2", cidr("10.240.0.1/32"));
        ledger.record_allocation(&pool, "router_device", "r1", cidr("10.240.0.0/32"));

        let list = ledger.allocations_for_pool(&pool);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].requester_id, "r2");
        assert_eq!(ledger.len(), 2);
        assert!(ledger.allocations_for_pool(&PoolId::from("sites")).is_empty());
    }

    #[test]
    fn test_pool_ledger_remove_keeps_index_consistent() {
        let mut ledger = PoolLedger::default();
        let pool = PoolId::from("routers");
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            ledger.record(Allocation::new(
                pool.clone(),
                "router_device",
                *id,
                cidr(&format!("10.240.0.{i}/32")),
            ));
        }

        let removed = ledger.remove("router_device", "a").expect("present");
        assert_eq!(removed.requester_id, "a");
        assert!(ledger.remove("router_device", "a").is_none());

        let c = ledger.find_existing("router_device", "c").expect("still indexed");
        assert_eq!(c.cidr, cidr("10.240.0.2/32"));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_from_allocations_round_trip() {
        let registry = registry();
        let allocations = vec![
            Allocation::new("routers".into(), "router_device", "r1", cidr("10.240.0.0/32")),
            Allocation::new("sites".into(), "site", "s1", cidr("10.1.0.0/24")),
        ];
        let ledger =
            AllocationLedger::from_allocations(&registry, allocations.clone()).expect("valid");
        assert_eq!(ledger.allocations_for_pool(&"routers".into()), vec![allocations[0].clone()]);
        assert_eq!(ledger.allocations_for_pool(&"sites".into()), vec![allocations[1].clone()]);
    }

    #[test]
    fn test_from_allocations_rejects_unknown_pool() {
        let allocations = vec![Allocation::new(
            "cameras".into(),
            "site",
            "s1",
            cidr("10.1.0.0/24"),
        )];
        assert!(matches!(
            AllocationLedger::from_allocations(&registry(), allocations),
            Err(LedgerError::UnknownPool { .. })
        ));
    }

    #[test]
    fn test_from_allocations_rejects_duplicate_requester() {
        let allocations = vec![
            Allocation::new("sites".into(), "site", "s1", cidr("10.1.0.0/24")),
            Allocation::new("sites".into(), "site", "s1", cidr("10.1.1.0/24")),
        ];
        assert!(matches!(
            AllocationLedger::from_allocations(&registry(), allocations),
            Err(LedgerError::DuplicateRequester { .. })
        ));
    }

    #[test]
    fn test_from_allocations_rejects_duplicate_id() {
        let first = Allocation::new("sites".into(), "site", "s1", cidr("10.1.0.0/24"));
        let mut second = Allocation::new("sites".into(), "site", "s2", cidr("10.1.1.0/24"));
        second.id = first.id.clone();
        assert!(matches!(
            AllocationLedger::from_allocations(&registry(), vec![first, second]),
            Err(LedgerError::DuplicateId { .. })
        ));
    }

    #[test]
    fn test_from_allocations_rejects_overlap() {
        let allocations = vec![
            Allocation::new("sites".into(), "site", "s1", cidr("10.1.0.0/16")),
            Allocation::new("sites".into(), "site", "s2", cidr("10.1.4.0/24")),
        ];
        assert!(matches!(
            AllocationLedger::from_allocations(&registry(), allocations),
            Err(LedgerError::Overlap { .. })
        ));
    }

    #[test]
    fn test_from_allocations_rejects_reserved_overlap() {
        let allocations = vec![Allocation::new(
            "sites".into(),
            "site",
            "s1",
            cidr("10.0.5.0/24"),
        )];
        let err = AllocationLedger::from_allocations(&registry(), allocations)
            .expect_err("reserved");
        assert!(matches!(err, LedgerError::Overlap { conflict, .. } if conflict == cidr("10.0.0.0/16")));
    }

    #[test]
    fn test_allocation_serializes_flat_record() {
        let allocation = Allocation::new("sites".into(), "site", "site001", cidr("10.16.50.0/24"));
        let json = serde_json::to_value(&allocation).expect("serialize");
        for field in ["id", "poolId", "requesterType", "requesterId", "cidr", "allocatedAt"] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["cidr"], "10.16.50.0/24");

        let back: Allocation = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, allocation);
    }
}
